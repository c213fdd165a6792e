mod common;

use ad_diagnostics::{
    config::AnalysisConfig,
    data::RawTable,
    diagnosis::{Objective, Verdict},
    fields::{CanonicalField, KeywordTable},
    pipeline::analyze,
};
use common::TestWorkspace;

#[test]
fn saved_default_config_loads_back_unchanged() {
    let workspace = TestWorkspace::new();
    let path = workspace.join("analysis.yml");
    AnalysisConfig::default().save(&path).expect("save config");
    let loaded = AnalysisConfig::load(&path).expect("load config");
    assert_eq!(loaded, AnalysisConfig::default());
}

#[test]
fn custom_keywords_resolve_new_export_headers() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "de.yml",
        r#"
fields:
  campaign_name: ["Kampagnenname"]
  impressions: ["Impressionen"]
  spend: ["Ausgegebener Betrag"]
"#,
    );
    let config = AnalysisConfig::load(&path).expect("load config");
    let table = RawTable::from_rows(
        &["Kampagnenname", "Impressionen", "Ausgegebener Betrag (EUR)"],
        &[&["Herbst", "1000", "0"]],
    );
    let analysis = analyze(&table, &config).expect("analysis");
    assert_eq!(analysis.campaigns[0].name, "Herbst");
    assert_eq!(analysis.rows[0].diagnosis.verdict, Verdict::NoData);
    assert_eq!(
        config.fields.variants(CanonicalField::Purchases),
        KeywordTable::default().variants(CanonicalField::Purchases)
    );
}

#[test]
fn campaign_thresholds_are_independent_of_ad_thresholds() {
    let config = AnalysisConfig::from_yaml_str(
        r#"
thresholds:
  campaign:
    ctr_min: 3.0
"#,
    )
    .expect("config");
    let table = RawTable::from_rows(
        &["Campaign name", "Ad name", "Impressions", "Link clicks", "Amount spent"],
        &[&["Evergreen", "E1", "1000", "20", "40"]],
    );
    let analysis = analyze(&table, &config).expect("analysis");
    let campaign = &analysis.campaigns[0];
    assert_eq!(
        campaign.diagnosis.as_ref().map(|d| d.verdict),
        Some(Verdict::LowClickAppeal)
    );
    assert_eq!(
        campaign.children[0].diagnosis.as_ref().map(|d| d.verdict),
        Some(Verdict::Stable)
    );
}

#[test]
fn objective_keywords_are_configurable() {
    let config = AnalysisConfig::from_yaml_str("objectives:\n  traffic: [\"visits\"]\n")
        .expect("config");
    assert_eq!(config.objectives.infer("Site visits Q3"), Objective::Traffic);
    assert_eq!(config.objectives.infer("Brand lift"), Objective::Awareness);
    assert_eq!(config.objectives.infer("Click bait"), Objective::Unspecified);
}

#[test]
fn malformed_yaml_reports_the_file() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("broken.yml", "thresholds: [1, 2\n");
    let err = AnalysisConfig::load_or_default(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("broken.yml"));
}
