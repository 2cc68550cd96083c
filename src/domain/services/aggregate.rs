//! Summation of ad performance rows into period totals and day-normalized
//! averages, with main conversions joined in by product id.

use serde::{Deserialize, Serialize};

use crate::domain::entities::ad_performance::AdPerformanceRecord;
use crate::domain::entities::conversion::ConversionMap;
use crate::domain::services::filter::roas;

/// Coerce a possibly mangled metric to something summable. The upstream
/// reports occasionally produce blanks; those contribute nothing.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Summed performance over a set of rows. ROAS fields are derived and
/// always finite (0 on zero cost).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTotals {
    pub cost: f64,
    pub conv: f64,
    pub conv_amt: f64,
    pub roas: f64,
    pub main_conv: f64,
    pub main_conv_amt: f64,
    pub main_roas: f64,
}

impl PerformanceTotals {
    pub(crate) fn with_derived(mut self) -> Self {
        self.roas = roas(self.conv_amt, self.cost);
        self.main_roas = roas(self.main_conv_amt, self.cost);
        self
    }

    /// Component-wise sum of the additive metrics; ROAS recomputed.
    pub fn plus(&self, other: &PerformanceTotals) -> PerformanceTotals {
        PerformanceTotals {
            cost: self.cost + other.cost,
            conv: self.conv + other.conv,
            conv_amt: self.conv_amt + other.conv_amt,
            main_conv: self.main_conv + other.main_conv,
            main_conv_amt: self.main_conv_amt + other.main_conv_amt,
            ..Default::default()
        }
        .with_derived()
    }

    /// Component-wise difference of the additive metrics; used to derive
    /// the complement ("others") of a filtered subset.
    pub fn minus(&self, other: &PerformanceTotals) -> PerformanceTotals {
        PerformanceTotals {
            cost: self.cost - other.cost,
            conv: self.conv - other.conv,
            conv_amt: self.conv_amt - other.conv_amt,
            main_conv: self.main_conv - other.main_conv,
            main_conv_amt: self.main_conv_amt - other.main_conv_amt,
            ..Default::default()
        }
        .with_derived()
    }

    /// Uniformly scale the additive metrics; ROAS recomputed.
    pub fn scaled(&self, factor: f64) -> PerformanceTotals {
        PerformanceTotals {
            cost: self.cost * factor,
            conv: self.conv * factor,
            conv_amt: self.conv_amt * factor,
            main_conv: self.main_conv * factor,
            main_conv_amt: self.main_conv_amt * factor,
            ..Default::default()
        }
        .with_derived()
    }
}

/// Period totals together with their per-day averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub days: i64,
    pub total: PerformanceTotals,
    pub daily: PerformanceTotals,
}

impl AggregateSummary {
    /// Derive the day-normalized view from period totals. `days` below 1
    /// is clamped so the division is always defined.
    pub fn from_totals(total: PerformanceTotals, days: i64) -> Self {
        let days = days.max(1);
        AggregateSummary {
            days,
            total,
            daily: total.scaled(1.0 / days as f64),
        }
    }
}

/// Sum a set of rows into period totals, joining main conversions by
/// mall product id. Rows with mangled numerics contribute zeros.
pub fn sum_records(
    records: &[AdPerformanceRecord],
    conversions: &ConversionMap,
) -> PerformanceTotals {
    let mut totals = PerformanceTotals::default();
    for record in records {
        totals.cost += finite_or_zero(record.cost);
        totals.conv += finite_or_zero(record.conv_cnt);
        totals.conv_amt += finite_or_zero(record.conv_amt);

        if let Some(main) = record
            .mall_product_id
            .as_deref()
            .and_then(|id| conversions.get(id))
        {
            totals.main_conv += finite_or_zero(main.main_conv_cnt);
            totals.main_conv_amt += finite_or_zero(main.main_conv_amt);
        }
    }
    totals.with_derived()
}

/// Aggregate rows over `days` into totals plus daily averages.
pub fn aggregate(
    records: &[AdPerformanceRecord],
    conversions: &ConversionMap,
    days: i64,
) -> AggregateSummary {
    AggregateSummary::from_totals(sum_records(records, conversions), days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::conversion::MainConversion;

    fn record(ad_id: &str, cost: f64, conv: f64, conv_amt: f64) -> AdPerformanceRecord {
        AdPerformanceRecord {
            ad_id: ad_id.to_string(),
            campaign_id: None,
            mall_product_id: None,
            bid_amt: None,
            cost,
            conv_cnt: conv,
            conv_amt,
            imp: 0.0,
            clk: 0.0,
            avg_rnk: None,
        }
    }

    #[test]
    fn test_sum_records_totals_and_roas() {
        let records = vec![
            record("a", 1_000.0, 2.0, 3_000.0),
            record("b", 500.0, 1.0, 1_500.0),
        ];
        let totals = sum_records(&records, &ConversionMap::new());
        assert_eq!(totals.cost, 1_500.0);
        assert_eq!(totals.conv, 3.0);
        assert_eq!(totals.conv_amt, 4_500.0);
        assert_eq!(totals.roas, 300.0);
        assert_eq!(totals.main_roas, 0.0);
    }

    #[test]
    fn test_zero_cost_roas_is_zero() {
        let totals = sum_records(&[record("a", 0.0, 1.0, 9_000.0)], &ConversionMap::new());
        assert_eq!(totals.roas, 0.0);
        assert_eq!(totals.main_roas, 0.0);
    }

    #[test]
    fn test_non_finite_metrics_do_not_poison_sums() {
        let mut bad = record("bad", f64::INFINITY, f64::NAN, 100.0);
        bad.mall_product_id = None;
        let good = record("good", 200.0, 1.0, 400.0);
        let totals = sum_records(&[bad, good], &ConversionMap::new());
        assert_eq!(totals.cost, 200.0);
        assert_eq!(totals.conv, 1.0);
        assert_eq!(totals.conv_amt, 500.0);
    }

    #[test]
    fn test_main_conversions_joined_per_row() {
        let mut a = record("a", 1_000.0, 0.0, 0.0);
        a.mall_product_id = Some("p-1".to_string());
        let mut b = record("b", 1_000.0, 0.0, 0.0);
        b.mall_product_id = Some("p-1".to_string());

        let mut conversions = ConversionMap::new();
        conversions.insert(
            "p-1".to_string(),
            MainConversion {
                main_conv_cnt: 1.0,
                main_conv_amt: 4_000.0,
            },
        );

        // Both ads share the product, so the lookup contributes twice.
        let totals = sum_records(&[a, b], &conversions);
        assert_eq!(totals.main_conv, 2.0);
        assert_eq!(totals.main_conv_amt, 8_000.0);
        assert_eq!(totals.main_roas, 400.0);
    }

    #[test]
    fn test_additivity_of_target_and_others() {
        let all = vec![
            record("a", 1_000.0, 2.0, 3_000.0),
            record("b", 500.0, 1.0, 1_500.0),
            record("c", 250.0, 0.0, 0.0),
        ];
        let target = &all[..1];
        let others = &all[1..];

        let conversions = ConversionMap::new();
        let sum_all = sum_records(&all, &conversions);
        let sum_target = sum_records(target, &conversions);
        let sum_others = sum_records(others, &conversions);

        let recombined = sum_target.plus(&sum_others);
        assert_eq!(recombined.cost, sum_all.cost);
        assert_eq!(recombined.conv, sum_all.conv);
        assert_eq!(recombined.conv_amt, sum_all.conv_amt);

        let derived_others = sum_all.minus(&sum_target);
        assert_eq!(derived_others.cost, sum_others.cost);
        assert_eq!(derived_others.conv_amt, sum_others.conv_amt);
    }

    #[test]
    fn test_daily_averages_divide_by_inclusive_days() {
        let records = vec![record("a", 700.0, 7.0, 1_400.0)];
        let summary = aggregate(&records, &ConversionMap::new(), 7);
        assert_eq!(summary.days, 7);
        assert_eq!(summary.daily.cost, 100.0);
        assert_eq!(summary.daily.conv, 1.0);
        assert_eq!(summary.daily.conv_amt, 200.0);
        // Uniform scaling leaves ROAS untouched.
        assert_eq!(summary.daily.roas, summary.total.roas);
    }

    #[test]
    fn test_day_count_clamped_to_one() {
        let summary = AggregateSummary::from_totals(PerformanceTotals::default(), 0);
        assert_eq!(summary.days, 1);
    }

    #[test]
    fn test_finite_or_zero() {
        assert_eq!(finite_or_zero(3.5), 3.5);
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
    }
}
