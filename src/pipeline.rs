//! End-to-end analysis of one decoded export.
//!
//! raw table → field map → normalized rows → metric rows → hierarchy →
//! diagnoses. Each stage consumes the previous stage's output; nothing is
//! shared between runs.

use std::collections::BTreeSet;

use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    data::RawTable,
    diagnosis::{DiagnosisResult, RuleEngine, Verdict},
    error::AnalysisError,
    fields::{CanonicalField, FieldMap, MetricSet},
    hierarchy::{HierarchyAggregator, HierarchyNode, Level},
    metrics::{MetricComputer, available_metrics},
    normalize::normalize_table,
};

/// Fields without which no analysis is attempted.
pub const REQUIRED_FIELDS: &[CanonicalField] =
    &[CanonicalField::CampaignName, CanonicalField::Impressions];

/// What the dataset could and could not support.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Coverage {
    pub resolved: Vec<CanonicalField>,
    pub missing_optional: Vec<CanonicalField>,
    pub unavailable_metrics: Vec<CanonicalField>,
    pub skipped_rules: Vec<Verdict>,
    pub rescaled: Vec<CanonicalField>,
    pub levels: Vec<Level>,
}

impl Coverage {
    fn new(fields: &FieldMap, config: &AnalysisConfig, available: &BTreeSet<CanonicalField>) -> Self {
        let resolved = fields.resolved_fields();
        Coverage {
            resolved: resolved.iter().copied().collect(),
            missing_optional: config
                .fields
                .fields()
                .filter(|field| {
                    !resolved.contains(field)
                        && !available.contains(field)
                        && !REQUIRED_FIELDS.contains(field)
                })
                .collect(),
            unavailable_metrics: CanonicalField::metrics()
                .filter(|field| !available.contains(field))
                .collect(),
            skipped_rules: RuleEngine::new(&config.thresholds, &config.objectives, available)
                .skipped_verdicts(),
            rescaled: Vec::new(),
            levels: Level::available(fields),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_optional.is_empty() && self.unavailable_metrics.is_empty()
    }
}

/// One input row with its metrics and ad-level diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosedRow {
    pub ordinal: usize,
    pub campaign: String,
    pub ad_set: Option<String>,
    pub ad: Option<String>,
    pub metrics: MetricSet,
    pub diagnosis: DiagnosisResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub fields: FieldMap,
    pub coverage: Coverage,
    pub campaigns: Vec<HierarchyNode>,
    pub rows: Vec<DiagnosedRow>,
}

impl Analysis {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        for campaign in &self.campaigns {
            campaign.walk(&mut |_, _| count += 1);
        }
        count
    }
}

pub fn analyze(table: &RawTable, config: &AnalysisConfig) -> Result<Analysis, AnalysisError> {
    if table.headers.is_empty() && !table.is_empty() {
        return Err(AnalysisError::EmptyHeader { rows: table.len() });
    }

    let fields = FieldMap::resolve(&table.headers, &config.fields);
    let available = available_metrics(&fields);
    let mut coverage = Coverage::new(&fields, config, &available);

    if table.is_empty() {
        info!("Dataset has no rows; nothing to analyze");
        return Ok(Analysis {
            fields,
            coverage,
            campaigns: Vec::new(),
            rows: Vec::new(),
        });
    }

    let missing = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !fields.contains(*field))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(AnalysisError::MissingRequiredFields { missing });
    }

    if !coverage.missing_optional.is_empty() {
        warn!(
            "Export is missing {} optional field(s): {}",
            coverage.missing_optional.len(),
            join_labels(&coverage.missing_optional)
        );
    }
    if !coverage.unavailable_metrics.is_empty() {
        warn!(
            "Metrics unavailable for this export: {}",
            join_labels(&coverage.unavailable_metrics)
        );
    }

    let normalized = normalize_table(table, &fields);
    coverage.rescaled = normalized.rescaled;
    let rows = MetricComputer::new(&fields).compute_all(normalized.rows);

    let aggregator = HierarchyAggregator::new(&fields, &available);
    let mut campaigns = aggregator.build(&rows);
    let engine = RuleEngine::new(&config.thresholds, &config.objectives, &available);
    engine.annotate(&mut campaigns);

    let diagnosed = rows
        .iter()
        .map(|row| {
            let metrics = row.metrics();
            DiagnosedRow {
                ordinal: row.base.ordinal,
                campaign: row.base.names.campaign.clone(),
                ad_set: row.base.names.ad_set.clone(),
                ad: row.base.names.ad.clone(),
                diagnosis: engine.diagnose(Level::Ad, "", &metrics),
                metrics,
            }
        })
        .collect::<Vec<_>>();

    let analysis = Analysis {
        fields,
        coverage,
        campaigns,
        rows: diagnosed,
    };
    info!(
        "Analyzed {} row(s) into {} campaign(s) and {} node(s)",
        analysis.rows.len(),
        analysis.campaigns.len(),
        analysis.node_count()
    );
    Ok(analysis)
}

fn join_labels(fields: &[CanonicalField]) -> String {
    fields.iter().map(|field| field.label()).join(", ")
}
