//! Condition matching over ad performance metrics.
//!
//! Filtering is deliberately lenient: a missing or non-finite value for a
//! referenced field simply fails the comparison, and an empty condition
//! set matches everything. The filter never errors on malformed rows.

use serde::{Deserialize, Serialize};

use crate::domain::entities::ad_performance::AdPerformanceRecord;
use crate::domain::entities::conversion::ConversionMap;

/// Metric a filter condition can reference. Derived fields (`roas`,
/// `mainRoas`) are cost-normalized percentages, defined as 0 when cost
/// is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricField {
    Cost,
    Conv,
    ConvAmt,
    Roas,
    MainConv,
    MainConvAmt,
    MainRoas,
    AvgRnk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
}

impl FilterOp {
    fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            FilterOp::Gte => lhs >= rhs,
            FilterOp::Lte => lhs <= rhs,
            FilterOp::Eq => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub field: MetricField,
    pub op: FilterOp,
    pub value: f64,
}

fn default_enabled() -> bool {
    true
}

/// ROAS as a percentage; 0 whenever cost is 0 or the ratio degenerates.
pub fn roas(amount: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        let ratio = amount / cost * 100.0;
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    } else {
        0.0
    }
}

/// Resolve the value of `field` for one record. `None` means the field is
/// missing or non-finite and therefore fails any comparison against it.
pub fn metric_value(
    record: &AdPerformanceRecord,
    conversions: &ConversionMap,
    field: MetricField,
) -> Option<f64> {
    let main = record
        .mall_product_id
        .as_deref()
        .and_then(|id| conversions.get(id));

    let value = match field {
        MetricField::Cost => record.cost,
        MetricField::Conv => record.conv_cnt,
        MetricField::ConvAmt => record.conv_amt,
        MetricField::Roas => roas(record.conv_amt, record.cost),
        // Products with no uploaded conversions count as zero, matching
        // how the joined table renders them.
        MetricField::MainConv => main.map(|m| m.main_conv_cnt).unwrap_or(0.0),
        MetricField::MainConvAmt => main.map(|m| m.main_conv_amt).unwrap_or(0.0),
        MetricField::MainRoas => roas(
            main.map(|m| m.main_conv_amt).unwrap_or(0.0),
            record.cost,
        ),
        MetricField::AvgRnk => record.avg_rnk?,
    };

    value.is_finite().then_some(value)
}

/// A record matches when every enabled condition holds. No enabled
/// conditions means the record matches unconditionally.
pub fn matches(
    record: &AdPerformanceRecord,
    conditions: &[FilterCondition],
    conversions: &ConversionMap,
) -> bool {
    conditions
        .iter()
        .filter(|c| c.enabled)
        .all(|c| match metric_value(record, conversions, c.field) {
            Some(value) => c.op.holds(value, c.value),
            None => false,
        })
}

/// Select the records passing every enabled condition, preserving input
/// order. Zero enabled conditions returns the full input set.
pub fn filter_records(
    records: &[AdPerformanceRecord],
    conditions: &[FilterCondition],
    conversions: &ConversionMap,
) -> Vec<AdPerformanceRecord> {
    records
        .iter()
        .filter(|r| matches(r, conditions, conversions))
        .cloned()
        .collect()
}
