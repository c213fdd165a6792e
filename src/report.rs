//! Presentation of an [`Analysis`]: ordering, flattening and rendering as a
//! text table, CSV or JSON.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    data::{format_currency, format_percent, format_ratio, format_unit_price, group_thousands},
    diagnosis::DiagnosisResult,
    fields::{CanonicalField, FieldKind, FieldMap, MetricSet},
    hierarchy::{HierarchyNode, Level},
    metrics::available_metrics,
    pipeline::{Analysis, Coverage, DiagnosedRow, REQUIRED_FIELDS},
    table::{self, Align},
};

/// Metric columns shown in reports, in display order.
pub const REPORT_METRICS: &[CanonicalField] = &[
    CanonicalField::Spend,
    CanonicalField::Impressions,
    CanonicalField::HookRate,
    CanonicalField::VideoPlays25,
    CanonicalField::Ctr,
    CanonicalField::Purchases,
    CanonicalField::Cpa,
    CanonicalField::Roas,
];

const UNAVAILABLE: &str = "-";

/// Orders every sibling group by descending spend. Ties keep input order.
pub fn sort_by_spend(nodes: &mut [HierarchyNode]) {
    nodes.sort_by(|a, b| {
        b.metric(CanonicalField::Spend)
            .total_cmp(&a.metric(CanonicalField::Spend))
    });
    for node in nodes {
        sort_by_spend(&mut node.children);
    }
}

pub fn sort_rows_by_spend(rows: &mut [DiagnosedRow]) {
    rows.sort_by(|a, b| {
        b.metrics
            .value(CanonicalField::Spend)
            .total_cmp(&a.metrics.value(CanonicalField::Spend))
    });
}

fn column_title(field: CanonicalField) -> &'static str {
    match field {
        CanonicalField::HookRate => "Hook %",
        CanonicalField::VideoPlays25 => "Video 25%",
        CanonicalField::Ctr => "CTR %",
        other => other.label(),
    }
}

/// Formats a metric for display; `None` renders as `-`.
pub fn format_metric(field: CanonicalField, value: Option<f64>) -> String {
    let Some(value) = value else {
        return UNAVAILABLE.to_string();
    };
    match field.kind() {
        FieldKind::Currency if matches!(field, CanonicalField::Cpc | CanonicalField::Cpa) => {
            format_unit_price(value)
        }
        FieldKind::Currency => format_currency(value),
        FieldKind::Count => group_thousands(value),
        FieldKind::Percentage => format_percent(value),
        FieldKind::Ratio => format_ratio(value),
        FieldKind::Dimension => UNAVAILABLE.to_string(),
    }
}

fn metric_cells(metrics: &MetricSet) -> impl Iterator<Item = String> + '_ {
    REPORT_METRICS
        .iter()
        .map(|field| format_metric(*field, metrics.get(*field)))
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

fn diagnosis_label(diagnosis: Option<&DiagnosisResult>) -> String {
    diagnosis
        .map(|result| result.label.clone())
        .unwrap_or_else(|| UNAVAILABLE.to_string())
}

fn tree_headers() -> Vec<String> {
    std::iter::once("Name".to_string())
        .chain(REPORT_METRICS.iter().map(|f| column_title(*f).to_string()))
        .chain(std::iter::once("Diagnosis".to_string()))
        .collect()
}

fn flat_headers() -> Vec<String> {
    ["Campaign", "Ad set", "Ad"]
        .into_iter()
        .map(str::to_string)
        .chain(REPORT_METRICS.iter().map(|f| column_title(*f).to_string()))
        .chain(std::iter::once("Diagnosis".to_string()))
        .collect()
}

/// One display row per node, parents first, names indented by depth.
pub fn tree_rows(nodes: &[HierarchyNode]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for root in nodes {
        root.walk(&mut |node, depth| {
            let mut row = vec![format!("{}{}", "  ".repeat(depth), display_name(&node.name))];
            row.extend(metric_cells(&node.metrics));
            row.push(diagnosis_label(node.diagnosis.as_ref()));
            rows.push(row);
        });
    }
    rows
}

pub fn flat_rows(rows: &[DiagnosedRow]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            let mut cells = vec![
                display_name(&row.campaign).to_string(),
                row.ad_set.clone().unwrap_or_else(|| UNAVAILABLE.to_string()),
                row.ad.clone().unwrap_or_else(|| UNAVAILABLE.to_string()),
            ];
            cells.extend(metric_cells(&row.metrics));
            cells.push(row.diagnosis.label.clone());
            cells
        })
        .collect()
}

fn alignment(leading: usize) -> Vec<Align> {
    std::iter::repeat_n(Align::Left, leading)
        .chain(std::iter::repeat_n(Align::Right, REPORT_METRICS.len()))
        .collect()
}

fn coverage_notes(coverage: &Coverage) -> Vec<String> {
    let labels = |fields: &[CanonicalField]| fields.iter().map(|f| f.label()).join(", ");
    let mut notes = Vec::new();
    if !coverage.missing_optional.is_empty() {
        notes.push(format!(
            "note: export has no column for {}",
            labels(&coverage.missing_optional)
        ));
    }
    if !coverage.rescaled.is_empty() {
        notes.push(format!(
            "note: rescaled from fractions to percentages: {}",
            labels(&coverage.rescaled)
        ));
    }
    if !coverage.skipped_rules.is_empty() {
        notes.push(format!(
            "note: rules skipped for lack of inputs: {}",
            coverage.skipped_rules.iter().map(|v| v.label()).join(", ")
        ));
    }
    notes
}

pub fn render_table(analysis: &Analysis, flat: bool) -> String {
    let mut output = if flat {
        table::render_aligned(&flat_headers(), &flat_rows(&analysis.rows), &alignment(3))
    } else {
        table::render_aligned(&tree_headers(), &tree_rows(&analysis.campaigns), &alignment(1))
    };
    for note in coverage_notes(&analysis.coverage) {
        output.push_str(&note);
        output.push('\n');
    }
    output
}

fn raw_metric(metrics: &MetricSet, field: CanonicalField) -> String {
    metrics
        .get(field)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// CSV keeps raw numbers; unavailable metrics are empty cells.
pub fn render_csv(analysis: &Analysis, flat: bool) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let metric_headers = REPORT_METRICS.iter().map(|f| f.as_str());
    if flat {
        let header = ["row", "campaign", "ad_set", "ad"]
            .into_iter()
            .chain(metric_headers)
            .chain(["verdict", "diagnosis"]);
        writer.write_record(header).context("Writing CSV header")?;
        for row in &analysis.rows {
            let mut record = vec![
                (row.ordinal + 1).to_string(),
                row.campaign.clone(),
                row.ad_set.clone().unwrap_or_default(),
                row.ad.clone().unwrap_or_default(),
            ];
            record.extend(REPORT_METRICS.iter().map(|f| raw_metric(&row.metrics, *f)));
            record.push(row.diagnosis.verdict.as_str().to_string());
            record.push(row.diagnosis.label.clone());
            writer
                .write_record(&record)
                .with_context(|| format!("Writing CSV row {}", row.ordinal + 1))?;
        }
    } else {
        let header = ["level", "campaign", "ad_set", "ad", "rows"]
            .into_iter()
            .chain(metric_headers)
            .chain(["verdict", "diagnosis"]);
        writer.write_record(header).context("Writing CSV header")?;
        for root in &analysis.campaigns {
            let mut records = Vec::new();
            let mut names: [String; 3] = Default::default();
            root.walk(&mut |node, _| {
                let slot = level_slot(node.level);
                names[slot] = node.name.clone();
                for deeper in &mut names[slot + 1..] {
                    deeper.clear();
                }
                let mut record = vec![node.level.as_str().to_string()];
                record.extend(names.iter().cloned());
                record.push(node.row_count.to_string());
                record.extend(REPORT_METRICS.iter().map(|f| raw_metric(&node.metrics, *f)));
                match &node.diagnosis {
                    Some(diagnosis) => {
                        record.push(diagnosis.verdict.as_str().to_string());
                        record.push(diagnosis.label.clone());
                    }
                    None => record.extend([String::new(), String::new()]),
                }
                records.push(record);
            });
            for record in records {
                writer.write_record(&record).context("Writing CSV row")?;
            }
        }
    }
    let bytes = writer.into_inner().context("Flushing CSV output")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

fn level_slot(level: Level) -> usize {
    match level {
        Level::Campaign => 0,
        Level::AdSet => 1,
        Level::Ad => 2,
    }
}

#[derive(Serialize)]
struct FlatReport<'a> {
    coverage: &'a Coverage,
    rows: &'a [DiagnosedRow],
}

pub fn render_json(analysis: &Analysis, flat: bool) -> Result<String> {
    let mut rendered = if flat {
        serde_json::to_string_pretty(&FlatReport {
            coverage: &analysis.coverage,
            rows: &analysis.rows,
        })
    } else {
        serde_json::to_string_pretty(analysis)
    }
    .context("Serializing analysis to JSON")?;
    rendered.push('\n');
    Ok(rendered)
}

/// Field resolution report: one row per canonical field.
pub fn field_report(fields: &FieldMap) -> Vec<Vec<String>> {
    let available = available_metrics(fields);
    CanonicalField::ALL
        .iter()
        .map(|field| {
            let (header, column) = match (fields.header(*field), fields.column(*field)) {
                (Some(header), Some(column)) => (header.to_string(), (column + 1).to_string()),
                _ => (UNAVAILABLE.to_string(), UNAVAILABLE.to_string()),
            };
            vec![
                field.as_str().to_string(),
                header,
                column,
                field_status(*field, fields, &available).to_string(),
            ]
        })
        .collect()
}

fn field_status(
    field: CanonicalField,
    fields: &FieldMap,
    available: &BTreeSet<CanonicalField>,
) -> &'static str {
    if fields.contains(field) {
        "resolved"
    } else if available.contains(&field) {
        "derived"
    } else if REQUIRED_FIELDS.contains(&field) {
        "missing (required)"
    } else {
        "missing"
    }
}

pub fn field_report_headers() -> Vec<String> {
    ["field", "header", "column", "status"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AnalysisConfig, data::RawTable, pipeline::analyze};

    fn sample() -> Analysis {
        let table = RawTable::from_rows(
            &["Campaign name", "Ad name", "Amount spent", "Impressions", "Link clicks"],
            &[
                &["Small", "S1", "10", "1000", "5"],
                &["Big", "B1", "1500", "50000", "900"],
                &["Big", "B2", "2500", "10000", "10"],
            ],
        );
        analyze(&table, &AnalysisConfig::default()).expect("analysis")
    }

    #[test]
    fn metric_formats_follow_field_kind() {
        assert_eq!(format_metric(CanonicalField::Spend, Some(1234.4)), "$1,234");
        assert_eq!(format_metric(CanonicalField::Cpa, Some(12.5)), "$12.50");
        assert_eq!(format_metric(CanonicalField::Impressions, Some(12000.0)), "12,000");
        assert_eq!(format_metric(CanonicalField::Ctr, Some(1.5)), "1.50%");
        assert_eq!(format_metric(CanonicalField::Roas, Some(2.5)), "2.50");
        assert_eq!(format_metric(CanonicalField::Roas, None), "-");
    }

    #[test]
    fn spend_sort_is_recursive_and_descending() {
        let mut analysis = sample();
        sort_by_spend(&mut analysis.campaigns);
        assert_eq!(analysis.campaigns[0].name, "Big");
        let ads = analysis.campaigns[0]
            .children
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ads, ["B2", "B1"]);
    }

    #[test]
    fn tree_rows_indent_children() {
        let rows = tree_rows(&sample().campaigns);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0][0], "Small");
        assert_eq!(rows[1][0], "  S1");
        assert_eq!(rows[2][1], "$4,000");
        assert_eq!(rows[2][3], "-");
    }

    #[test]
    fn csv_tree_carries_paths_and_raw_numbers() {
        let csv = render_csv(&sample(), false).expect("csv");
        let lines = csv.lines().collect::<Vec<_>>();
        assert!(lines[0].starts_with("level,campaign,ad_set,ad,rows,spend"));
        assert_eq!(lines.len(), 6);
        assert!(lines[3].starts_with("campaign,Big,,,2,4000,60000,"));
        assert!(lines[5].starts_with("ad,Big,,B2,1,2500,10000,"));
    }

    #[test]
    fn field_report_marks_derived_and_missing() {
        let analysis = sample();
        let rows = field_report(&analysis.fields);
        let status = |name: &str| {
            rows.iter()
                .find(|row| row[0] == name)
                .map(|row| row[3].clone())
                .unwrap_or_default()
        };
        assert_eq!(status("campaign_name"), "resolved");
        assert_eq!(status("ctr"), "derived");
        assert_eq!(status("roas"), "missing");
    }
}
