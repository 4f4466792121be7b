use crate::config::CategoryMappingConfig;
use crate::diagnostics::Diagnostics;
use crate::normalize::Slug;
use std::collections::BTreeMap;

/// App category slug <-> official division code.
#[derive(Debug, Clone, Default)]
pub struct CategoryMapping {
    app_to_division: BTreeMap<Slug, Option<Slug>>,
}

impl CategoryMapping {
    pub fn from_config(cfg: &CategoryMappingConfig, diagnostics: &mut Diagnostics) -> Self {
        let raw = match (&cfg.app_to_indec_division, &cfg.map) {
            (Some(explicit), _) => explicit,
            (None, Some(legacy)) => {
                diagnostics.warn_once(
                    "category_mapping.map",
                    "category_mapping.map is deprecated; use category_mapping.app_to_indec_division",
                );
                legacy
            }
            (None, None) => return Self::default(),
        };

        let app_to_division = raw
            .iter()
            .filter_map(|(app, division)| {
                let app = Slug::normalize(app)?;
                let division = division.as_deref().and_then(Slug::normalize);
                Some((app, division))
            })
            .collect();
        Self { app_to_division }
    }

    pub fn is_empty(&self) -> bool {
        self.app_to_division.is_empty()
    }

    pub fn contains_app(&self, category: &Slug) -> bool {
        self.app_to_division.contains_key(category)
    }

    pub fn division_for(&self, category: &Slug) -> Option<&Slug> {
        self.app_to_division.get(category).and_then(Option::as_ref)
    }

    pub fn division_for_label(&self, category: &str) -> Option<&Slug> {
        Slug::normalize(category).and_then(|c| self.division_for(&c))
    }

    pub fn is_division(&self, code: &Slug) -> bool {
        self.app_to_division
            .values()
            .any(|d| d.as_ref() == Some(code))
    }
}
