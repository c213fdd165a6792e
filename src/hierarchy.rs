//! Campaign → Ad set → Ad tree construction with metric rollups.
//!
//! Rows are grouped by exact equality of their name cells, in order of first
//! appearance. Missing name fields produce a shallower tree rather than an
//! error. Counts and currency totals are summed over the rows below a node;
//! rate-like metrics are an unweighted mean over the same rows.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::{
    diagnosis::DiagnosisResult,
    fields::{CanonicalField, FieldMap, MetricSet, RollupKind},
    metrics::MetricRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Campaign,
    AdSet,
    Ad,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Campaign => "campaign",
            Level::AdSet => "ad_set",
            Level::Ad => "ad",
        }
    }

    /// Levels present for a dataset, outermost first.
    pub fn available(fields: &FieldMap) -> Vec<Level> {
        let mut levels = vec![Level::Campaign];
        if fields.contains(CanonicalField::AdSetName) {
            levels.push(Level::AdSet);
        }
        if fields.contains(CanonicalField::AdName) {
            levels.push(Level::Ad);
        }
        levels
    }
}

/// Partial aggregate over a set of rows. Merging is associative and
/// commutative, so rollups can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rollup {
    totals: MetricSet,
    rows: usize,
}

impl Rollup {
    pub fn from_row(row: &MetricRow, available: &BTreeSet<CanonicalField>) -> Self {
        let mut rollup = Rollup::default();
        rollup.ingest(row, available);
        rollup
    }

    pub fn ingest(&mut self, row: &MetricRow, available: &BTreeSet<CanonicalField>) {
        for field in available {
            let current = self.totals.value(*field);
            self.totals.insert(*field, current + row.value(*field));
        }
        self.rows += 1;
    }

    pub fn merge(&mut self, other: &Rollup) {
        for (field, value) in other.totals.iter() {
            let current = self.totals.value(field);
            self.totals.insert(field, current + value);
        }
        self.rows += other.rows;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(&self) -> MetricSet {
        self.totals
            .iter()
            .filter_map(|(field, total)| match field.rollup()? {
                RollupKind::Sum => Some((field, total)),
                RollupKind::Mean if self.rows > 0 => Some((field, total / self.rows as f64)),
                RollupKind::Mean => Some((field, 0.0)),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyNode {
    pub level: Level,
    pub name: String,
    pub children: Vec<HierarchyNode>,
    pub metrics: MetricSet,
    pub row_count: usize,
    pub diagnosis: Option<DiagnosisResult>,
    #[serde(skip)]
    rollup: Rollup,
}

impl HierarchyNode {
    fn new(level: Level, name: String, children: Vec<HierarchyNode>, rollup: Rollup) -> Self {
        HierarchyNode {
            level,
            name,
            children,
            metrics: rollup.finish(),
            row_count: rollup.rows(),
            diagnosis: None,
            rollup,
        }
    }

    pub fn rollup(&self) -> &Rollup {
        &self.rollup
    }

    pub fn metric(&self, field: CanonicalField) -> f64 {
        self.metrics.value(field)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Visits this node and every descendant depth-first, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a HierarchyNode, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: usize, visit: &mut impl FnMut(&'a HierarchyNode, usize)) {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut HierarchyNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

pub struct HierarchyAggregator<'a> {
    levels: Vec<Level>,
    available: &'a BTreeSet<CanonicalField>,
}

impl<'a> HierarchyAggregator<'a> {
    pub fn new(fields: &FieldMap, available: &'a BTreeSet<CanonicalField>) -> Self {
        HierarchyAggregator {
            levels: Level::available(fields),
            available,
        }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn build(&self, rows: &[MetricRow]) -> Vec<HierarchyNode> {
        let rows = rows.iter().collect::<Vec<_>>();
        self.build_level(&rows, &self.levels)
    }

    fn build_level(&self, rows: &[&MetricRow], levels: &[Level]) -> Vec<HierarchyNode> {
        let Some((&level, deeper)) = levels.split_first() else {
            return Vec::new();
        };
        if level == Level::Ad {
            return rows
                .iter()
                .map(|row| {
                    HierarchyNode::new(
                        Level::Ad,
                        group_name(row, Level::Ad).to_string(),
                        Vec::new(),
                        Rollup::from_row(row, self.available),
                    )
                })
                .collect();
        }
        group_in_order(rows, level)
            .into_iter()
            .map(|(name, members)| {
                let children = self.build_level(&members, deeper);
                let mut rollup = Rollup::default();
                if children.is_empty() {
                    for row in &members {
                        rollup.ingest(row, self.available);
                    }
                } else {
                    for child in &children {
                        rollup.merge(child.rollup());
                    }
                }
                HierarchyNode::new(level, name.to_string(), children, rollup)
            })
            .collect()
    }
}

fn group_name(row: &MetricRow, level: Level) -> &str {
    let names = &row.base.names;
    match level {
        Level::Campaign => &names.campaign,
        Level::AdSet => names.ad_set.as_deref().unwrap_or_default(),
        Level::Ad => names.ad.as_deref().unwrap_or_default(),
    }
}

fn group_in_order<'r>(
    rows: &[&'r MetricRow],
    level: Level,
) -> Vec<(&'r str, Vec<&'r MetricRow>)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&MetricRow>)> = Vec::new();
    for &row in rows {
        let name = group_name(row, level);
        match positions.get(name) {
            Some(&idx) => groups[idx].1.push(row),
            None => {
                positions.insert(name, groups.len());
                groups.push((name, vec![row]));
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::RawTable,
        fields::KeywordTable,
        metrics::{MetricComputer, available_metrics},
        normalize::normalize_table,
    };

    fn build(table: &RawTable) -> Vec<HierarchyNode> {
        let fields = FieldMap::resolve(&table.headers, &KeywordTable::default());
        let available = available_metrics(&fields);
        let rows = MetricComputer::new(&fields).compute_all(normalize_table(table, &fields).rows);
        HierarchyAggregator::new(&fields, &available).build(&rows)
    }

    fn sample() -> RawTable {
        RawTable::from_rows(
            &["Campaign name", "Ad set name", "Ad name", "Amount spent", "Impressions", "CTR"],
            &[
                &["Spring", "Broad", "A1", "100", "1000", "1.0%"],
                &["Summer", "Lookalike", "B1", "40", "400", "3.0%"],
                &["Spring", "Retarget", "A2", "50", "500", "2.0%"],
                &["Spring", "Broad", "A3", "25", "250", "4.0%"],
            ],
        )
    }

    #[test]
    fn groups_follow_first_appearance_order() {
        let tree = build(&sample());
        let campaigns = tree.iter().map(|n| n.name.as_str()).collect::<Vec<_>>();
        assert_eq!(campaigns, ["Spring", "Summer"]);
        let spring_sets = tree[0]
            .children
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(spring_sets, ["Broad", "Retarget"]);
        let broad_ads = tree[0].children[0]
            .children
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(broad_ads, ["A1", "A3"]);
        assert!(tree[0].children[0].children[0].is_leaf());
    }

    #[test]
    fn sums_and_means_roll_up() {
        let tree = build(&sample());
        let spring = &tree[0];
        assert_eq!(spring.row_count, 3);
        assert_eq!(spring.metric(CanonicalField::Spend), 175.0);
        assert_eq!(spring.metric(CanonicalField::Impressions), 1750.0);
        assert!((spring.metric(CanonicalField::Ctr) - 7.0 / 3.0).abs() < 1e-9);

        let child_spend: f64 = spring
            .children
            .iter()
            .map(|child| child.metric(CanonicalField::Spend))
            .sum();
        assert_eq!(child_spend, spring.metric(CanonicalField::Spend));

        let broad = &spring.children[0];
        assert_eq!(broad.metric(CanonicalField::Ctr), 2.5);
    }

    #[test]
    fn missing_name_fields_produce_shallower_trees() {
        let table = RawTable::from_rows(
            &["Campaign name", "Impressions"],
            &[&["Spring", "10"], &["Spring", "20"], &["Fall", "5"]],
        );
        let tree = build(&table);
        assert_eq!(tree.len(), 2);
        assert!(tree.iter().all(HierarchyNode::is_leaf));
        assert_eq!(tree[0].metric(CanonicalField::Impressions), 30.0);
        assert_eq!(tree[0].row_count, 2);

        let table = RawTable::from_rows(
            &["Campaign name", "Ad name", "Impressions"],
            &[&["Spring", "A1", "10"], &["Spring", "A1", "20"]],
        );
        let tree = build(&table);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].level, Level::Ad);
    }

    #[test]
    fn unavailable_metrics_are_absent_from_rollups() {
        let tree = build(&sample());
        assert!(tree[0].metrics.get(CanonicalField::Roas).is_none());
        assert!(tree[0].metrics.get(CanonicalField::HookRate).is_none());
    }

    #[test]
    fn rollup_merge_is_order_independent() {
        let tree = build(&sample());
        let spring = &tree[0];
        let mut forward = Rollup::default();
        for child in &spring.children {
            forward.merge(child.rollup());
        }
        let mut backward = Rollup::default();
        for child in spring.children.iter().rev() {
            backward.merge(child.rollup());
        }
        assert_eq!(forward.rows(), backward.rows());
        assert_eq!(
            forward.finish().value(CanonicalField::Spend),
            backward.finish().value(CanonicalField::Spend)
        );
    }
}
