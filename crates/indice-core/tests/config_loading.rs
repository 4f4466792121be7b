use indice_core::config::{load_config, write_sample_config, SourceMode};
use indice_core::diagnostics::Diagnostics;
use indice_core::mapping::CategoryMapping;
use indice_core::model::BasketType;
use indice_core::normalize::Slug;
use indice_core::tracker::BasketWeights;

#[test]
fn sample_config_round_trips_through_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("indice.yaml");
    write_sample_config(&path)?;

    let cfg = load_config(&path)?;
    assert_eq!(cfg.official.source_mode, SourceMode::XlsPdfHybrid);
    assert_eq!(cfg.official.region_scope, vec!["nacional", "patagonia"]);
    assert_eq!(BasketWeights::from_config(&cfg, BasketType::All).len(), 4);

    let mut diagnostics = Diagnostics::new();
    let mapping = CategoryMapping::from_config(&cfg.category_mapping, &mut diagnostics);
    assert!(diagnostics.messages().is_empty());
    assert_eq!(
        mapping.division_for_label("Lácteos").map(Slug::as_str),
        Some("alimentos_y_bebidas_no_alcoholicas")
    );
    Ok(())
}

#[test]
fn legacy_mapping_and_unknown_keys_still_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("legacy.yaml");
    std::fs::write(
        &path,
        r#"
version: 1
report:
  output_dir: site/
official:
  source_mode: fallback
category_mapping:
  map:
    almacen: Alimentos y bebidas no alcohólicas
    bazar: null
"#,
    )?;
    let cfg = load_config(&path)?;
    assert_eq!(cfg.official.source_mode, SourceMode::Fallback);

    let mut diagnostics = Diagnostics::new();
    let mapping = CategoryMapping::from_config(&cfg.category_mapping, &mut diagnostics);
    CategoryMapping::from_config(&cfg.category_mapping, &mut diagnostics);
    assert_eq!(diagnostics.messages().len(), 1);
    assert!(diagnostics.messages()[0].contains("deprecated"));

    let almacen = Slug::normalize("almacen").expect("slug");
    assert_eq!(
        mapping.division_for(&almacen).map(Slug::as_str),
        Some("alimentos_y_bebidas_no_alcoholicas")
    );
    assert!(mapping.division_for_label("bazar").is_none());
    Ok(())
}

#[test]
fn broken_files_are_config_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(load_config(&dir.path().join("absent.yaml")).is_err());

    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "version: 3\n")?;
    let err = load_config(&path).unwrap_err();
    assert!(err.0.contains("unsupported config version 3"));

    std::fs::write(&path, "version: 1\ntracker:\n  coverage_min_weight_pct: 70\n")?;
    assert!(load_config(&path).is_err());
    Ok(())
}
