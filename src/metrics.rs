//! Derived metric computation.
//!
//! Derivations are ratios of two primary fields. A derived value is only
//! produced when both inputs were resolved and the target was not itself
//! resolved from a column; a zero denominator yields `0.0` ("no data").
//! Derived values live beside the normalized row in a separate set and never
//! overwrite primary values.

use std::collections::BTreeSet;

use crate::{
    fields::{CanonicalField, FieldMap, MetricSet},
    normalize::NormalizedRow,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivation {
    pub target: CanonicalField,
    pub numerator: CanonicalField,
    pub denominator: CanonicalField,
    pub scale: f64,
}

impl Derivation {
    const fn new(
        target: CanonicalField,
        numerator: CanonicalField,
        denominator: CanonicalField,
        scale: f64,
    ) -> Self {
        Derivation {
            target,
            numerator,
            denominator,
            scale,
        }
    }

    pub fn apply(&self, values: &MetricSet) -> f64 {
        ratio(values.value(self.numerator), values.value(self.denominator)) * self.scale
    }
}

pub const DERIVATIONS: &[Derivation] = &[
    Derivation::new(
        CanonicalField::HookRate,
        CanonicalField::VideoPlaysHook,
        CanonicalField::Impressions,
        100.0,
    ),
    Derivation::new(
        CanonicalField::Ctr,
        CanonicalField::LinkClicks,
        CanonicalField::Impressions,
        100.0,
    ),
    Derivation::new(
        CanonicalField::Cpc,
        CanonicalField::Spend,
        CanonicalField::LinkClicks,
        1.0,
    ),
    Derivation::new(
        CanonicalField::Cpa,
        CanonicalField::Spend,
        CanonicalField::Purchases,
        1.0,
    ),
    Derivation::new(
        CanonicalField::Roas,
        CanonicalField::PurchaseValue,
        CanonicalField::Spend,
        1.0,
    ),
    Derivation::new(
        CanonicalField::PurchaseRate,
        CanonicalField::Purchases,
        CanonicalField::LinkClicks,
        100.0,
    ),
    Derivation::new(
        CanonicalField::Drop25To50,
        CanonicalField::VideoPlays50,
        CanonicalField::VideoPlays25,
        1.0,
    ),
    Derivation::new(
        CanonicalField::Drop50To75,
        CanonicalField::VideoPlays75,
        CanonicalField::VideoPlays50,
        1.0,
    ),
];

pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() { value } else { 0.0 }
}

/// A normalized row together with the metrics derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub base: NormalizedRow,
    pub derived: MetricSet,
}

impl MetricRow {
    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        self.base
            .values
            .get(field)
            .or_else(|| self.derived.get(field))
    }

    pub fn value(&self, field: CanonicalField) -> f64 {
        self.get(field).unwrap_or(0.0)
    }

    /// Primary and derived values merged into one set.
    pub fn metrics(&self) -> MetricSet {
        self.base
            .values
            .iter()
            .chain(self.derived.iter())
            .collect()
    }
}

/// Derivations applicable to one dataset, fixed by its field map.
#[derive(Debug, Clone)]
pub struct MetricComputer {
    active: Vec<Derivation>,
}

impl MetricComputer {
    pub fn new(fields: &FieldMap) -> Self {
        let active = DERIVATIONS
            .iter()
            .filter(|derivation| {
                !fields.contains(derivation.target)
                    && fields.contains(derivation.numerator)
                    && fields.contains(derivation.denominator)
            })
            .copied()
            .collect();
        MetricComputer { active }
    }

    pub fn derivations(&self) -> &[Derivation] {
        &self.active
    }

    pub fn compute(&self, row: NormalizedRow) -> MetricRow {
        let derived = self
            .active
            .iter()
            .map(|derivation| (derivation.target, derivation.apply(&row.values)))
            .collect();
        MetricRow { base: row, derived }
    }

    pub fn compute_all(&self, rows: Vec<NormalizedRow>) -> Vec<MetricRow> {
        rows.into_iter().map(|row| self.compute(row)).collect()
    }
}

/// Every numeric field that will carry data for a dataset: resolved columns
/// plus the derivations whose inputs resolved.
pub fn available_metrics(fields: &FieldMap) -> BTreeSet<CanonicalField> {
    let mut available = fields
        .resolved_fields()
        .into_iter()
        .filter(|field| !field.is_dimension())
        .collect::<BTreeSet<_>>();
    available.extend(
        MetricComputer::new(fields)
            .derivations()
            .iter()
            .map(|derivation| derivation.target),
    );
    available
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::RawTable, fields::KeywordTable, normalize::normalize_table};

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    fn metric_rows(table: &RawTable) -> (FieldMap, Vec<MetricRow>) {
        let fields = FieldMap::resolve(&table.headers, &KeywordTable::default());
        let normalized = normalize_table(table, &fields);
        let rows = MetricComputer::new(&fields).compute_all(normalized.rows);
        (fields, rows)
    }

    #[test]
    fn derives_funnel_ratios() {
        let table = RawTable::from_rows(
            &[
                "Campaign name",
                "Impressions",
                "Hook plays",
                "Link clicks",
                "Amount spent",
                "Purchases",
                "Video plays at 25%",
                "Video plays at 50%",
                "Video plays at 75%",
            ],
            &[&["A", "1,000", "100", "5", "50", "2", "80", "40", "10"]],
        );
        let (_, rows) = metric_rows(&table);
        let row = &rows[0];
        assert_close(row.value(CanonicalField::HookRate), 10.0);
        assert_close(row.value(CanonicalField::Ctr), 0.5);
        assert_close(row.value(CanonicalField::Cpc), 10.0);
        assert_close(row.value(CanonicalField::Cpa), 25.0);
        assert_close(row.value(CanonicalField::PurchaseRate), 40.0);
        assert_eq!(row.value(CanonicalField::Drop25To50), 0.5);
        assert_eq!(row.value(CanonicalField::Drop50To75), 0.25);
        assert_eq!(row.get(CanonicalField::Roas), None);
    }

    #[test]
    fn zero_denominators_yield_zero() {
        let table = RawTable::from_rows(
            &["Campaign name", "Impressions", "Hook plays", "Link clicks", "Amount spent"],
            &[&["A", "0", "0", "0", "0"]],
        );
        let (_, rows) = metric_rows(&table);
        let row = &rows[0];
        assert_eq!(row.value(CanonicalField::HookRate), 0.0);
        assert_eq!(row.value(CanonicalField::Ctr), 0.0);
        assert_eq!(row.value(CanonicalField::Cpc), 0.0);
    }

    #[test]
    fn direct_columns_take_precedence_over_derivations() {
        let table = RawTable::from_rows(
            &["Campaign name", "Impressions", "Link clicks", "CTR"],
            &[&["A", "1000", "5", "2.5%"]],
        );
        let (fields, rows) = metric_rows(&table);
        assert!(
            MetricComputer::new(&fields)
                .derivations()
                .iter()
                .all(|d| d.target != CanonicalField::Ctr)
        );
        assert_eq!(rows[0].value(CanonicalField::Ctr), 2.5);
        assert!(!rows[0].derived.contains(CanonicalField::Ctr));
    }

    #[test]
    fn availability_tracks_resolved_inputs() {
        let table = RawTable::from_rows(&["Campaign name", "Impressions", "Link clicks"], &[]);
        let fields = FieldMap::resolve(&table.headers, &KeywordTable::default());
        let available = available_metrics(&fields);
        assert!(available.contains(&CanonicalField::Ctr));
        assert!(!available.contains(&CanonicalField::HookRate));
        assert!(!available.contains(&CanonicalField::Roas));
        assert!(!available.contains(&CanonicalField::CampaignName));
    }
}
