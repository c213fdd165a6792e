//! Cell-to-number normalization.
//!
//! Every numeric cell becomes an `f64`. Missing cells, sentinel tokens and
//! anything that fails to parse become `0.0`: a malformed value is treated as
//! "no data" and never aborts the run.
//!
//! Percentage fields that an export stores as fractions (every value in the
//! dataset ≤ 1.0) are rescaled ×100 once, dataset-wide, so that comparisons
//! against percentage-scale thresholds hold. A dataset whose true percentages
//! are all ≤ 1 is indistinguishable from a fractional export and will be
//! rescaled too; [`Normalized::rescaled`] reports which fields were touched.

use log::warn;

use crate::{
    data::RawTable,
    fields::{CanonicalField, FieldKind, FieldMap, MetricSet},
};

/// Tokens that mean "no value", compared case-insensitively after trimming.
pub const SENTINEL_TOKENS: &[&str] = &["none", "nan", "null", "n/a", "-", "--"];

pub fn is_missing(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None => true,
        Some(value) => {
            value.is_empty()
                || SENTINEL_TOKENS
                    .iter()
                    .any(|token| value.eq_ignore_ascii_case(token))
        }
    }
}

/// Parses a raw cell such as `"1,234"` or `"12.34%"` into a float.
pub fn normalize_cell(raw: Option<&str>) -> f64 {
    if is_missing(raw) {
        return 0.0;
    }
    let cleaned = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '%' | '％' | ','))
        .collect::<String>();
    match cleaned.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Name cells of one row, kept verbatim for exact-match grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowNames {
    pub campaign: String,
    pub ad_set: Option<String>,
    pub ad: Option<String>,
}

/// One ad-level record after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub ordinal: usize,
    pub raw: Vec<String>,
    pub names: RowNames,
    pub values: MetricSet,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub rows: Vec<NormalizedRow>,
    pub rescaled: Vec<CanonicalField>,
}

pub fn normalize_table(table: &RawTable, fields: &FieldMap) -> Normalized {
    let numeric = fields
        .resolved()
        .filter(|(field, _)| !field.is_dimension())
        .map(|(field, column)| (field, column.index))
        .collect::<Vec<_>>();

    let parsed = (0..table.len())
        .map(|row| {
            numeric
                .iter()
                .map(|(field, column)| (*field, normalize_cell(table.cell(row, *column))))
                .collect::<MetricSet>()
        })
        .collect::<Vec<_>>();

    let rescaled = if parsed.is_empty() {
        Vec::new()
    } else {
        numeric
            .iter()
            .map(|(field, _)| *field)
            .filter(|field| field.kind() == FieldKind::Percentage)
            .filter(|field| {
                parsed
                    .iter()
                    .map(|values| values.value(*field))
                    .fold(f64::NEG_INFINITY, f64::max)
                    <= 1.0
            })
            .collect::<Vec<_>>()
    };
    for field in &rescaled {
        warn!(
            "Every {} value is <= 1.0; treating the column as fractions and rescaling x100",
            field.label()
        );
    }

    let rows = parsed
        .into_iter()
        .enumerate()
        .map(|(ordinal, values)| NormalizedRow {
            ordinal,
            raw: table.rows[ordinal].clone(),
            names: row_names(table, fields, ordinal),
            values: values
                .iter()
                .map(|(field, value)| {
                    if rescaled.contains(&field) {
                        (field, value * 100.0)
                    } else {
                        (field, value)
                    }
                })
                .collect(),
        })
        .collect();

    Normalized { rows, rescaled }
}

fn row_names(table: &RawTable, fields: &FieldMap, row: usize) -> RowNames {
    let name = |field: CanonicalField| {
        fields
            .column(field)
            .map(|column| table.cell(row, column).unwrap_or_default().to_string())
    };
    RowNames {
        campaign: name(CanonicalField::CampaignName).unwrap_or_default(),
        ad_set: name(CanonicalField::AdSetName),
        ad: name(CanonicalField::AdName),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::KeywordTable;

    #[test]
    fn normalize_cell_strips_percent_and_thousands_separators() {
        assert_eq!(normalize_cell(Some("12.34%")), 12.34);
        assert_eq!(normalize_cell(Some("1,234")), 1234.0);
        assert_eq!(normalize_cell(Some(" 2,500.5 ")), 2500.5);
        assert_eq!(normalize_cell(Some("7 %")), 7.0);
    }

    #[test]
    fn normalize_cell_degrades_to_zero() {
        for raw in ["", "   ", "None", "nan", "NaN", "N/A", "-", "abc", "inf", "1.2.3"] {
            assert_eq!(normalize_cell(Some(raw)), 0.0, "input {raw:?}");
        }
        assert_eq!(normalize_cell(None), 0.0);
    }

    fn analyze_table(table: &RawTable) -> Normalized {
        let fields = FieldMap::resolve(&table.headers, &KeywordTable::default());
        normalize_table(table, &fields)
    }

    #[test]
    fn fractional_rate_columns_are_rescaled_once() {
        let table = RawTable::from_rows(
            &["Campaign name", "Impressions", "CTR"],
            &[&["A", "100", "0.012"], &["B", "200", "0.5"]],
        );
        let normalized = analyze_table(&table);
        assert_eq!(normalized.rescaled, vec![CanonicalField::Ctr]);
        assert!((normalized.rows[0].values.value(CanonicalField::Ctr) - 1.2).abs() < 1e-9);
        assert_eq!(normalized.rows[1].values.value(CanonicalField::Ctr), 50.0);
        // Counts are never rescaled.
        assert_eq!(normalized.rows[0].values.value(CanonicalField::Impressions), 100.0);

        let again = analyze_table(&table);
        assert_eq!(again.rows[1].values.value(CanonicalField::Ctr), 50.0);
    }

    #[test]
    fn percentage_columns_above_one_are_left_alone() {
        let table = RawTable::from_rows(
            &["Campaign name", "Impressions", "CTR"],
            &[&["A", "100", "0.4%"], &["B", "200", "1.8%"]],
        );
        let normalized = analyze_table(&table);
        assert!(normalized.rescaled.is_empty());
        assert_eq!(normalized.rows[0].values.value(CanonicalField::Ctr), 0.4);
    }

    #[test]
    fn names_are_kept_verbatim() {
        let table = RawTable::from_rows(
            &["Campaign name", "Ad name", "Impressions"],
            &[&[" Spring ", "Video A", "10"]],
        );
        let normalized = analyze_table(&table);
        let names = &normalized.rows[0].names;
        assert_eq!(names.campaign, " Spring ");
        assert_eq!(names.ad.as_deref(), Some("Video A"));
        assert_eq!(names.ad_set, None);
        assert_eq!(normalized.rows[0].raw[1], "Video A");
    }
}
