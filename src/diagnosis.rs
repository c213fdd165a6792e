//! Rule-based performance diagnosis.
//!
//! Each hierarchy level has an ordered rule list evaluated top to bottom; the
//! first matching rule produces the [`DiagnosisResult`] and a node that matches
//! nothing is reported as stable. Profitability rules precede attention-funnel
//! rules so that a profitable ad is never flagged as a creative problem.
//!
//! Campaigns are additionally classified by the [`Objective`] inferred from
//! their name and judged with a smaller rule list for that objective.
//!
//! Rules whose input metrics are unavailable for a dataset are dropped before
//! evaluation: a missing column reads as zero and would otherwise trip every
//! "below minimum" rule.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    fields::{CanonicalField, MetricSet, normalize_header},
    hierarchy::{HierarchyNode, Level},
};

/// Thresholds applied at one hierarchy level. Percentages are on the 0–100
/// scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    /// Hook rate (3-second plays / impressions) below this is a weak opening.
    pub hook_rate_min: f64,
    /// Link CTR below this is low click appeal.
    pub ctr_min: f64,
    /// ROAS at or above this recommends scaling.
    pub roas_scale: f64,
    /// ROAS below this with purchases present is unprofitable.
    pub roas_floor: f64,
    /// Spend above this without a purchase is a conversion gap.
    pub conversion_gap_spend: f64,
    /// Cost per purchase above this is flagged; disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpa_ceiling: Option<f64>,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        LevelThresholds {
            hook_rate_min: 20.0,
            ctr_min: 0.8,
            roas_scale: 2.5,
            roas_floor: 1.2,
            conversion_gap_spend: 500.0,
            cpa_ceiling: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub campaign: LevelThresholds,
    pub ad_set: LevelThresholds,
    pub ad: LevelThresholds,
}

impl Thresholds {
    pub fn for_level(&self, level: Level) -> &LevelThresholds {
        match level {
            Level::Campaign => &self.campaign,
            Level::AdSet => &self.ad_set,
            Level::Ad => &self.ad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Awareness,
    Traffic,
    Conversion,
    Unspecified,
}

/// Campaign-name keywords that declare a marketing objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveKeywords {
    pub awareness: Vec<String>,
    pub traffic: Vec<String>,
    pub conversion: Vec<String>,
}

impl Default for ObjectiveKeywords {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        ObjectiveKeywords {
            awareness: owned(&["awareness", "reach", "brand", "知名度", "觸及", "品牌"]),
            traffic: owned(&["traffic", "click", "流量", "點擊"]),
            conversion: owned(&["conversion", "sales", "purchase", "轉換", "銷售", "購買"]),
        }
    }
}

impl ObjectiveKeywords {
    /// Conversion keywords are checked first, then traffic, then awareness.
    pub fn infer(&self, campaign_name: &str) -> Objective {
        let name = normalize_header(campaign_name);
        let hit = |words: &[String]| {
            words
                .iter()
                .map(|word| normalize_header(word))
                .any(|word| !word.is_empty() && name.contains(&word))
        };
        if hit(&self.conversion) {
            Objective::Conversion
        } else if hit(&self.traffic) {
            Objective::Traffic
        } else if hit(&self.awareness) {
            Objective::Awareness
        } else {
            Objective::Unspecified
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NoData,
    Scale,
    Unprofitable,
    HighCpa,
    ConversionGap,
    LowClickAppeal,
    WeakHook,
    Stable,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::NoData => "no_data",
            Verdict::Scale => "scale",
            Verdict::Unprofitable => "unprofitable",
            Verdict::HighCpa => "high_cpa",
            Verdict::ConversionGap => "conversion_gap",
            Verdict::LowClickAppeal => "low_click_appeal",
            Verdict::WeakHook => "weak_hook",
            Verdict::Stable => "stable",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::NoData => "no data yet",
            Verdict::Scale => "strong profitability",
            Verdict::Unprofitable => "orders exist but unprofitable",
            Verdict::HighCpa => "high acquisition cost",
            Verdict::ConversionGap => "conversion gap",
            Verdict::LowClickAppeal => "low click appeal",
            Verdict::WeakHook => "weak opening",
            Verdict::Stable => "stable",
        }
    }

    pub fn advice(self) -> &'static str {
        match self {
            Verdict::NoData => "No spend recorded yet; wait for delivery before judging.",
            Verdict::Scale => "ROAS clears the scaling tier; recommend scaling budget.",
            Verdict::Unprofitable => "Purchases are below the ROAS floor; reduce cost per result.",
            Verdict::HighCpa => "Cost per purchase exceeds the ceiling; tighten targeting or bids.",
            Verdict::ConversionGap => "Spend is accumulating without purchases; inspect the landing page.",
            Verdict::LowClickAppeal => "CTR is below the minimum; revise creative and copy.",
            Verdict::WeakHook => "Hook rate is below the minimum; revise the first seconds of the video.",
            Verdict::Stable => "No rule triggered; keep monitoring.",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosisResult {
    pub verdict: Verdict,
    pub label: String,
    pub advice: String,
}

impl From<Verdict> for DiagnosisResult {
    fn from(verdict: Verdict) -> Self {
        DiagnosisResult {
            verdict,
            label: verdict.label().to_string(),
            advice: verdict.advice().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    NoSpend,
    RoasAtLeast(f64),
    /// Purchases > 0 and ROAS below the floor.
    UnprofitableOrders(f64),
    /// Purchases > 0 and CPA above the ceiling.
    CpaAbove(f64),
    /// No purchases and spend above the limit.
    ConversionGap(f64),
    CtrBelow(f64),
    HookRateBelow(f64),
}

impl Condition {
    pub fn inputs(&self) -> &'static [CanonicalField] {
        use CanonicalField::*;
        match self {
            Condition::NoSpend => &[Spend],
            Condition::RoasAtLeast(_) => &[Roas],
            Condition::UnprofitableOrders(_) => &[Purchases, Roas],
            Condition::CpaAbove(_) => &[Purchases, Cpa],
            Condition::ConversionGap(_) => &[Purchases, Spend],
            Condition::CtrBelow(_) => &[Ctr],
            Condition::HookRateBelow(_) => &[HookRate],
        }
    }

    pub fn matches(&self, metrics: &MetricSet) -> bool {
        use CanonicalField::*;
        let value = |field| metrics.value(field);
        match *self {
            Condition::NoSpend => value(Spend) == 0.0,
            Condition::RoasAtLeast(tier) => value(Roas) >= tier,
            Condition::UnprofitableOrders(floor) => value(Purchases) > 0.0 && value(Roas) < floor,
            Condition::CpaAbove(ceiling) => value(Purchases) > 0.0 && value(Cpa) > ceiling,
            Condition::ConversionGap(limit) => value(Purchases) == 0.0 && value(Spend) > limit,
            Condition::CtrBelow(min) => value(Ctr) < min,
            Condition::HookRateBelow(min) => value(HookRate) < min,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub condition: Condition,
    pub verdict: Verdict,
}

impl Rule {
    const fn new(condition: Condition, verdict: Verdict) -> Self {
        Rule { condition, verdict }
    }
}

/// The full ordered list used for ads, ad sets and campaigns without a
/// recognizable objective.
pub fn performance_rules(thresholds: &LevelThresholds) -> Vec<Rule> {
    let mut rules = vec![
        Rule::new(Condition::NoSpend, Verdict::NoData),
        Rule::new(Condition::RoasAtLeast(thresholds.roas_scale), Verdict::Scale),
        Rule::new(
            Condition::UnprofitableOrders(thresholds.roas_floor),
            Verdict::Unprofitable,
        ),
    ];
    if let Some(ceiling) = thresholds.cpa_ceiling {
        rules.push(Rule::new(Condition::CpaAbove(ceiling), Verdict::HighCpa));
    }
    rules.extend([
        Rule::new(
            Condition::ConversionGap(thresholds.conversion_gap_spend),
            Verdict::ConversionGap,
        ),
        Rule::new(Condition::CtrBelow(thresholds.ctr_min), Verdict::LowClickAppeal),
        Rule::new(Condition::HookRateBelow(thresholds.hook_rate_min), Verdict::WeakHook),
    ]);
    rules
}

pub fn campaign_rules(objective: Objective, thresholds: &LevelThresholds) -> Vec<Rule> {
    let no_spend = Rule::new(Condition::NoSpend, Verdict::NoData);
    match objective {
        Objective::Awareness => vec![
            no_spend,
            Rule::new(Condition::HookRateBelow(thresholds.hook_rate_min), Verdict::WeakHook),
        ],
        Objective::Traffic => vec![
            no_spend,
            Rule::new(Condition::CtrBelow(thresholds.ctr_min), Verdict::LowClickAppeal),
        ],
        Objective::Conversion => vec![
            no_spend,
            Rule::new(Condition::RoasAtLeast(thresholds.roas_scale), Verdict::Scale),
            Rule::new(
                Condition::UnprofitableOrders(thresholds.roas_floor),
                Verdict::Unprofitable,
            ),
            Rule::new(Condition::CtrBelow(thresholds.ctr_min), Verdict::LowClickAppeal),
        ],
        Objective::Unspecified => performance_rules(thresholds),
    }
}

/// Returns the verdict of the first matching rule, or stable.
pub fn evaluate(rules: &[Rule], metrics: &MetricSet) -> DiagnosisResult {
    rules
        .iter()
        .find(|rule| rule.condition.matches(metrics))
        .map(|rule| rule.verdict)
        .unwrap_or(Verdict::Stable)
        .into()
}

pub struct RuleEngine<'a> {
    thresholds: &'a Thresholds,
    objectives: &'a ObjectiveKeywords,
    available: &'a BTreeSet<CanonicalField>,
}

impl<'a> RuleEngine<'a> {
    pub fn new(
        thresholds: &'a Thresholds,
        objectives: &'a ObjectiveKeywords,
        available: &'a BTreeSet<CanonicalField>,
    ) -> Self {
        RuleEngine {
            thresholds,
            objectives,
            available,
        }
    }

    fn is_evaluable(&self, rule: &Rule) -> bool {
        rule.condition
            .inputs()
            .iter()
            .all(|field| self.available.contains(field))
    }

    /// Rules in evaluation order for a node, minus those lacking inputs.
    pub fn rules_for(&self, level: Level, name: &str) -> Vec<Rule> {
        let thresholds = self.thresholds.for_level(level);
        let rules = match level {
            Level::Campaign => campaign_rules(self.objectives.infer(name), thresholds),
            Level::AdSet | Level::Ad => performance_rules(thresholds),
        };
        rules
            .into_iter()
            .filter(|rule| self.is_evaluable(rule))
            .collect()
    }

    /// Verdicts of ad-level rules that cannot run for this dataset.
    pub fn skipped_verdicts(&self) -> Vec<Verdict> {
        performance_rules(&self.thresholds.ad)
            .iter()
            .filter(|rule| !self.is_evaluable(rule))
            .map(|rule| rule.verdict)
            .collect()
    }

    pub fn diagnose(&self, level: Level, name: &str, metrics: &MetricSet) -> DiagnosisResult {
        evaluate(&self.rules_for(level, name), metrics)
    }

    pub fn annotate(&self, nodes: &mut [HierarchyNode]) {
        for node in nodes {
            node.walk_mut(&mut |node| {
                node.diagnosis = Some(self.diagnose(node.level, &node.name, &node.metrics));
            });
        }
    }
}
