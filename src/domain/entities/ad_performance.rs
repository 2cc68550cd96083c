use serde::{Deserialize, Serialize};

/// One row of ad performance, aggregated over a queried date range.
///
/// Metric fields arrive from upstream reports that occasionally omit or
/// mangle values; absent numerics default to 0 and optional fields stay
/// `None`. Downstream filtering and aggregation treat missing values as
/// non-contributing rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdPerformanceRecord {
    pub ad_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mall_product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_amt: Option<f64>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub conv_cnt: f64,
    #[serde(default)]
    pub conv_amt: f64,
    #[serde(default)]
    pub imp: f64,
    #[serde(default)]
    pub clk: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rnk: Option<f64>,
}

impl AdPerformanceRecord {
    /// A usable bid is present, finite and strictly positive. Records
    /// without one are excluded from bid-weighted computations.
    pub fn usable_bid(&self) -> Option<f64> {
        self.bid_amt.filter(|b| b.is_finite() && *b > 0.0)
    }
}
