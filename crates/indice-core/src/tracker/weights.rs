use crate::config::AppConfig;
use crate::model::{BasketType, BasketWeight};
use std::collections::BTreeMap;

pub const UNCATEGORIZED: &str = "sin_categoria";

/// Fixed basket weights keyed by canonical product id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasketWeights {
    by_product: BTreeMap<String, BasketWeight>,
}

impl BasketWeights {
    /// Items of every basket in the selection. Items with a non-positive
    /// weight or a blank id are left out; categories resolve through the
    /// canonical aliases and are lowercased.
    pub fn from_config(cfg: &AppConfig, basket: BasketType) -> Self {
        let mut by_product = BTreeMap::new();
        for (_, item) in cfg.basket_items(basket) {
            let id = item.id.trim();
            let weight = item.effective_weight();
            if id.is_empty() || weight <= 0.0 {
                continue;
            }
            let raw = item
                .category
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(UNCATEGORIZED);
            let category = cfg
                .canonical_categories
                .resolve(raw)
                .unwrap_or_else(|| raw.to_string())
                .to_lowercase();
            by_product.insert(id.to_string(), BasketWeight { weight, category });
        }
        Self { by_product }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64, S)>,
        S: Into<String>,
    {
        Self {
            by_product: pairs
                .into_iter()
                .map(|(id, weight, category)| {
                    (
                        id.into(),
                        BasketWeight {
                            weight,
                            category: category.into(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn get(&self, canonical_id: &str) -> Option<&BasketWeight> {
        self.by_product.get(canonical_id)
    }

    pub fn contains(&self, canonical_id: &str) -> bool {
        self.by_product.contains_key(canonical_id)
    }

    pub fn len(&self) -> usize {
        self.by_product.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.by_product.values().map(|w| w.weight).sum()
    }

    /// Subset belonging to one category.
    pub fn for_category(&self, category: &str) -> Self {
        Self {
            by_product: self
                .by_product
                .iter()
                .filter(|(_, w)| w.category == category)
                .map(|(id, w)| (id.clone(), w.clone()))
                .collect(),
        }
    }
}
