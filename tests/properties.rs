use ad_diagnostics::{
    config::AnalysisConfig,
    data::{RawTable, group_thousands},
    fields::{CanonicalField, normalize_header, resolve_field},
    normalize::normalize_cell,
    pipeline::analyze,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn grouped_integers_normalize_to_their_value(n in 0u64..10_000_000_000) {
        let grouped = group_thousands(n as f64);
        prop_assert_eq!(normalize_cell(Some(&grouped)), n as f64);
    }

    #[test]
    fn percent_suffix_is_stripped(v in 0.0f64..1000.0) {
        let cell = format!("{v}%");
        prop_assert_eq!(normalize_cell(Some(&cell)), v);
    }

    #[test]
    fn normalization_is_idempotent(cell in ".{0,24}") {
        let value = normalize_cell(Some(&cell));
        prop_assert_eq!(normalize_cell(Some(&value.to_string())), value);
    }

    #[test]
    fn arbitrary_cells_never_yield_non_finite_values(cell in ".{0,24}") {
        prop_assert!(normalize_cell(Some(&cell)).is_finite());
    }

    #[test]
    fn resolution_picks_first_matching_header(
        headers in proptest::collection::vec("[a-z]{1,6}", 1..8),
        variant in "[a-z]{1,2}"
    ) {
        let expected = headers.iter().position(|header| header.contains(variant.as_str()));
        let normalized = headers.iter().map(|h| normalize_header(h)).collect::<Vec<_>>();
        prop_assert_eq!(resolve_field(&normalized, &[variant.clone()]), expected);
    }

    #[test]
    fn campaign_spend_is_the_sum_of_its_rows(
        rows in proptest::collection::vec((0usize..3, 0u32..100_000), 1..40)
    ) {
        let names = ["North", "South", "West"];
        let table = RawTable::new(
            vec!["Campaign name".into(), "Impressions".into(), "Amount spent".into()],
            rows.iter()
                .map(|(campaign, spend)| {
                    vec![names[*campaign].to_string(), "100".to_string(), spend.to_string()]
                })
                .collect(),
        );
        let analysis = analyze(&table, &AnalysisConfig::default()).expect("analysis");
        for node in &analysis.campaigns {
            let expected: u64 = rows
                .iter()
                .filter(|(campaign, _)| names[*campaign] == node.name)
                .map(|(_, spend)| u64::from(*spend))
                .sum();
            prop_assert_eq!(node.metric(CanonicalField::Spend), expected as f64);
        }
        let total_rows: usize = analysis.campaigns.iter().map(|node| node.row_count).sum();
        prop_assert_eq!(total_rows, rows.len());
    }
}
