//! Canonical field identifiers and header resolution.
//!
//! Ad platform exports name the same metric differently depending on locale,
//! export version and which optional columns were selected. This module maps
//! whatever headers a file carries onto [`CanonicalField`] identifiers using a
//! declarative [`KeywordTable`], producing an immutable [`FieldMap`].
//!
//! Resolution is independent per field: a header may satisfy more than one
//! field, and the order in which fields are declared never changes how a
//! single field resolves. Within one field the first header (in file order)
//! whose normalized form contains any keyword variant wins.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    CampaignName,
    AdSetName,
    AdName,
    Spend,
    Impressions,
    LinkClicks,
    VideoPlaysHook,
    #[serde(rename = "video_plays_25")]
    VideoPlays25,
    #[serde(rename = "video_plays_50")]
    VideoPlays50,
    #[serde(rename = "video_plays_75")]
    VideoPlays75,
    Ctr,
    Cpc,
    Purchases,
    PurchaseRate,
    PurchaseValue,
    Roas,
    AddToCart,
    CheckoutInitiated,
    HookRate,
    Cpa,
    #[serde(rename = "drop_25_to_50")]
    Drop25To50,
    #[serde(rename = "drop_50_to_75")]
    Drop50To75,
}

/// How a field's values are interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Dimension,
    Count,
    Currency,
    /// Percentage scale (0–100) once normalized.
    Percentage,
    Ratio,
}

/// How a metric is rolled up across the rows below a hierarchy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupKind {
    Sum,
    Mean,
}

impl CanonicalField {
    pub const ALL: &'static [CanonicalField] = &[
        CanonicalField::CampaignName,
        CanonicalField::AdSetName,
        CanonicalField::AdName,
        CanonicalField::Spend,
        CanonicalField::Impressions,
        CanonicalField::LinkClicks,
        CanonicalField::VideoPlaysHook,
        CanonicalField::VideoPlays25,
        CanonicalField::VideoPlays50,
        CanonicalField::VideoPlays75,
        CanonicalField::Ctr,
        CanonicalField::Cpc,
        CanonicalField::Purchases,
        CanonicalField::PurchaseRate,
        CanonicalField::PurchaseValue,
        CanonicalField::Roas,
        CanonicalField::AddToCart,
        CanonicalField::CheckoutInitiated,
        CanonicalField::HookRate,
        CanonicalField::Cpa,
        CanonicalField::Drop25To50,
        CanonicalField::Drop50To75,
    ];

    pub fn kind(self) -> FieldKind {
        use CanonicalField::*;
        match self {
            CampaignName | AdSetName | AdName => FieldKind::Dimension,
            Impressions | LinkClicks | VideoPlaysHook | VideoPlays25 | VideoPlays50
            | VideoPlays75 | Purchases | AddToCart | CheckoutInitiated => FieldKind::Count,
            Spend | PurchaseValue | Cpc | Cpa => FieldKind::Currency,
            Ctr | HookRate | PurchaseRate => FieldKind::Percentage,
            Roas | Drop25To50 | Drop50To75 => FieldKind::Ratio,
        }
    }

    pub fn rollup(self) -> Option<RollupKind> {
        use CanonicalField::*;
        match self {
            CampaignName | AdSetName | AdName => None,
            Spend | Impressions | LinkClicks | VideoPlaysHook | VideoPlays25 | VideoPlays50
            | VideoPlays75 | Purchases | PurchaseValue | AddToCart | CheckoutInitiated => {
                Some(RollupKind::Sum)
            }
            Ctr | Cpc | PurchaseRate | Roas | HookRate | Cpa | Drop25To50 | Drop50To75 => {
                Some(RollupKind::Mean)
            }
        }
    }

    pub fn is_dimension(self) -> bool {
        self.kind() == FieldKind::Dimension
    }

    /// Numeric fields, in declaration order.
    pub fn metrics() -> impl Iterator<Item = CanonicalField> {
        Self::ALL.iter().copied().filter(|field| !field.is_dimension())
    }

    pub fn as_str(self) -> &'static str {
        use CanonicalField::*;
        match self {
            CampaignName => "campaign_name",
            AdSetName => "ad_set_name",
            AdName => "ad_name",
            Spend => "spend",
            Impressions => "impressions",
            LinkClicks => "link_clicks",
            VideoPlaysHook => "video_plays_hook",
            VideoPlays25 => "video_plays_25",
            VideoPlays50 => "video_plays_50",
            VideoPlays75 => "video_plays_75",
            Ctr => "ctr",
            Cpc => "cpc",
            Purchases => "purchases",
            PurchaseRate => "purchase_rate",
            PurchaseValue => "purchase_value",
            Roas => "roas",
            AddToCart => "add_to_cart",
            CheckoutInitiated => "checkout_initiated",
            HookRate => "hook_rate",
            Cpa => "cpa",
            Drop25To50 => "drop_25_to_50",
            Drop50To75 => "drop_50_to_75",
        }
    }

    /// Human readable label used in reports and error messages.
    pub fn label(self) -> &'static str {
        use CanonicalField::*;
        match self {
            CampaignName => "Campaign name",
            AdSetName => "Ad set name",
            AdName => "Ad name",
            Spend => "Spend",
            Impressions => "Impressions",
            LinkClicks => "Link clicks",
            VideoPlaysHook => "3-second video plays",
            VideoPlays25 => "Video plays at 25%",
            VideoPlays50 => "Video plays at 50%",
            VideoPlays75 => "Video plays at 75%",
            Ctr => "CTR",
            Cpc => "CPC",
            Purchases => "Purchases",
            PurchaseRate => "Purchase rate",
            PurchaseValue => "Purchase value",
            Roas => "ROAS",
            AddToCart => "Adds to cart",
            CheckoutInitiated => "Checkouts initiated",
            HookRate => "Hook rate",
            Cpa => "CPA",
            Drop25To50 => "Retention 25%→50%",
            Drop50To75 => "Retention 50%→75%",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CanonicalField {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let wanted = normalize_header(value);
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|field| {
                normalize_header(field.as_str()) == wanted || normalize_header(field.label()) == wanted
            })
            .ok_or_else(|| anyhow!("Unknown canonical field '{value}'"))
    }
}

/// Reduces a header (or keyword) to the form used for matching: whitespace and
/// punctuation of any width are removed and letters are lowercased.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Keyword variants per canonical field. Variants are matched as substrings of
/// normalized headers, so they may be written with any spacing or punctuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordTable(BTreeMap<CanonicalField, Vec<String>>);

impl KeywordTable {
    pub fn new(entries: BTreeMap<CanonicalField, Vec<String>>) -> Self {
        KeywordTable(entries)
    }

    pub fn variants(&self, field: CanonicalField) -> &[String] {
        self.0.get(&field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = CanonicalField> + '_ {
        self.0.keys().copied()
    }

    /// Replaces the variants of every field present in `overrides`, leaving
    /// the remaining fields untouched.
    pub fn with_overrides(mut self, overrides: BTreeMap<CanonicalField, Vec<String>>) -> Self {
        for (field, variants) in overrides {
            self.0.insert(field, variants);
        }
        self
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        use CanonicalField::*;
        let table: &[(CanonicalField, &[&str])] = &[
            (CampaignName, &["行銷活動名稱", "廣告活動名稱", "Campaign name"]),
            (AdSetName, &["廣告組合名稱", "Ad set name"]),
            (AdName, &["廣告名稱", "Ad name"]),
            (Spend, &["花費金額", "Amount spent"]),
            (Impressions, &["曝光次數", "Impressions"]),
            (LinkClicks, &["連結點擊次數", "Link clicks"]),
            (
                VideoPlaysHook,
                &["影片播放 3 秒以上的次數", "3 秒影片播放次數", "3-second video plays", "Hook plays"],
            ),
            (VideoPlays25, &["影片播放到 25%", "Video plays at 25%"]),
            (VideoPlays50, &["影片播放到 50%", "Video plays at 50%"]),
            (VideoPlays75, &["影片播放到 75%", "Video plays at 75%"]),
            (Ctr, &["CTR（連結點閱率）", "連結點閱率", "CTR"]),
            (Cpc, &["每次連結點擊成本", "CPC"]),
            (Purchases, &["購買次數", "成果", "Purchases"]),
            (PurchaseRate, &["購買轉換率", "Purchase rate", "Conversion rate"]),
            (PurchaseValue, &["購買轉換值", "Purchases conversion value", "Purchase value"]),
            (Roas, &["購買 ROAS", "Purchase ROAS", "ROAS"]),
            (AddToCart, &["加到購物車次數", "Adds to cart", "Add to cart"]),
            (CheckoutInitiated, &["開始結帳次數", "Checkouts initiated", "Initiate checkout"]),
            (HookRate, &["影片播放 3 秒以上的比率", "Hook rate"]),
        ];
        KeywordTable(
            table
                .iter()
                .map(|(field, variants)| {
                    (*field, variants.iter().map(|v| v.to_string()).collect())
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub header: String,
    pub index: usize,
}

/// Canonical field → resolved raw header. Built once per dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMap {
    columns: BTreeMap<CanonicalField, ResolvedColumn>,
}

impl FieldMap {
    pub fn resolve(headers: &[String], table: &KeywordTable) -> Self {
        let normalized = headers
            .iter()
            .map(|header| normalize_header(header))
            .collect::<Vec<_>>();
        let mut columns = BTreeMap::new();
        for field in table.fields() {
            match resolve_field(&normalized, table.variants(field)) {
                Some(index) => {
                    debug!("Resolved {} -> '{}'", field.as_str(), headers[index]);
                    columns.insert(
                        field,
                        ResolvedColumn {
                            header: headers[index].clone(),
                            index,
                        },
                    );
                }
                None => debug!("No header matched {}", field.as_str()),
            }
        }
        FieldMap { columns }
    }

    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(|column| column.header.as_str())
    }

    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).map(|column| column.index)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn resolved(&self) -> impl Iterator<Item = (CanonicalField, &ResolvedColumn)> {
        self.columns.iter().map(|(field, column)| (*field, column))
    }

    pub fn resolved_fields(&self) -> BTreeSet<CanonicalField> {
        self.columns.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Index of the first header (in file order) containing any of `variants`.
/// `headers` must already be normalized.
pub fn resolve_field(headers: &[String], variants: &[String]) -> Option<usize> {
    let variants = variants
        .iter()
        .map(|variant| normalize_header(variant))
        .filter(|variant| !variant.is_empty())
        .collect::<Vec<_>>();
    headers.iter().position(|header| {
        variants
            .iter()
            .any(|variant| header.contains(variant.as_str()))
    })
}

/// Numeric values keyed by canonical field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricSet(BTreeMap<CanonicalField, f64>);

impl MetricSet {
    pub fn new() -> Self {
        MetricSet::default()
    }

    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        self.0.get(&field).copied()
    }

    /// Missing metrics read as zero ("no data").
    pub fn value(&self, field: CanonicalField) -> f64 {
        self.get(field).unwrap_or(0.0)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn insert(&mut self, field: CanonicalField, value: f64) {
        self.0.insert(field, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, f64)> + '_ {
        self.0.iter().map(|(field, value)| (*field, *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(CanonicalField, f64)> for MetricSet {
    fn from_iter<I: IntoIterator<Item = (CanonicalField, f64)>>(iter: I) -> Self {
        MetricSet(iter.into_iter().collect())
    }
}
