//! Bid-impact simulation: project the aggregate effect of a bulk bid or
//! ON/OFF action on the filtered target set and on the whole population,
//! using a two-parameter linear elasticity model.

use serde::{Deserialize, Serialize};

use crate::domain::entities::ad_performance::AdPerformanceRecord;
use crate::domain::entities::conversion::ConversionMap;
use crate::domain::services::aggregate::{sum_records, AggregateSummary, PerformanceTotals};
use crate::domain::services::filter::{filter_records, FilterCondition};

/// ON/OFF state as the platform spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnOffState {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

/// The bulk action being simulated (and later dispatched). Deltas and
/// percentages are signed: negative values lower bids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkAction {
    /// Flat currency delta applied to every targeted ad's bid.
    BidAmount { delta: f64 },
    /// Uniform percentage change applied to every targeted ad's bid.
    BidPercent { percent: f64 },
    /// Switch the targeted ads ON or OFF.
    Onoff { status: OnOffState },
}

impl BulkAction {
    /// Bid-growth factor `g`: the multiplier on the target set's total
    /// bid-weighted spend implied by this action.
    ///
    /// For flat deltas, `g` is the ratio of summed new bids to summed old
    /// bids over the records carrying a usable bid; with no usable bids
    /// or a zero/non-finite delta the action is a no-op (`g = 1`).
    /// Percentage changes apply uniformly regardless of individual bids.
    /// Turning ads OFF zeroes their spend; turning them ON is a no-op on
    /// historical performance (an OFF ad has no baseline to scale).
    pub fn bid_growth_factor(&self, targets: &[AdPerformanceRecord]) -> f64 {
        match *self {
            BulkAction::BidAmount { delta } => {
                if !delta.is_finite() || delta == 0.0 {
                    return 1.0;
                }
                let mut old_sum = 0.0;
                let mut new_sum = 0.0;
                for bid in targets.iter().filter_map(|r| r.usable_bid()) {
                    old_sum += bid;
                    new_sum += (bid + delta).max(0.0);
                }
                if old_sum > 0.0 {
                    new_sum / old_sum
                } else {
                    1.0
                }
            }
            BulkAction::BidPercent { percent } => {
                if percent.is_finite() {
                    (1.0 + percent / 100.0).max(0.0)
                } else {
                    1.0
                }
            }
            BulkAction::Onoff { status: OnOffState::Off } => 0.0,
            BulkAction::Onoff { status: OnOffState::On } => 1.0,
        }
    }
}

/// Analyst-tuned elasticity knobs. `k` scales how strongly cost follows
/// the bid change; `t` how strongly performance follows the cost change
/// (`t = 1`: proportional, `t = 0`: unaffected).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    #[serde(default = "default_knob")]
    pub k: f64,
    #[serde(default = "default_knob")]
    pub t: f64,
}

fn default_knob() -> f64 {
    1.0
}

impl Default for SimulationParameters {
    fn default() -> Self {
        SimulationParameters { k: 1.0, t: 1.0 }
    }
}

impl SimulationParameters {
    /// `k` falls back to 1 when non-finite or non-positive.
    pub fn sanitized_k(&self) -> f64 {
        if self.k.is_finite() && self.k > 0.0 {
            self.k
        } else {
            1.0
        }
    }

    /// `t` is deliberately unbounded; only non-finite input falls back.
    pub fn sanitized_t(&self) -> f64 {
        if self.t.is_finite() {
            self.t
        } else {
            1.0
        }
    }
}

/// The three multipliers derived from an action over a target set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionFactors {
    pub bid_growth: f64,
    pub cost: f64,
    pub performance: f64,
}

/// Compute the projection multipliers for `action` against `targets`.
///
/// `cost = g * k`; `performance = 1 + t * (cost - 1)`, floored at 0 so a
/// projection can never imply negative conversions.
pub fn projection_factors(
    action: &BulkAction,
    targets: &[AdPerformanceRecord],
    params: &SimulationParameters,
) -> ProjectionFactors {
    let bid_growth = action.bid_growth_factor(targets);
    let cost = bid_growth * params.sanitized_k();
    let performance = (1.0 + params.sanitized_t() * (cost - 1.0)).max(0.0);
    ProjectionFactors {
        bid_growth,
        cost,
        performance,
    }
}

/// Apply the multipliers to a target's BEFORE totals: cost scales by the
/// cost factor, the four performance metrics by the performance factor,
/// and ROAS is recomputed from the scaled values.
pub fn project_totals(
    before: &PerformanceTotals,
    factors: &ProjectionFactors,
) -> PerformanceTotals {
    PerformanceTotals {
        cost: before.cost * factors.cost,
        conv: before.conv * factors.performance,
        conv_amt: before.conv_amt * factors.performance,
        main_conv: before.main_conv * factors.performance,
        main_conv_amt: before.main_conv_amt * factors.performance,
        ..Default::default()
    }
    .with_derived()
}

/// Before/after aggregates for the target subset and the population.
///
/// When nothing matches the filter, the target-level summaries are absent
/// (not zero-filled) and the population AFTER equals the population
/// BEFORE: the others are assumed unaffected by the action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub row_count: usize,
    pub target_count: usize,
    pub factors: ProjectionFactors,
    pub before_all: AggregateSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_target: Option<AggregateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_target: Option<AggregateSummary>,
    pub after_population: AggregateSummary,
}

/// A full simulation pass: the report plus the matched target rows (the
/// rows a confirmed bulk action would apply to).
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub report: SimulationReport,
    pub targets: Vec<AdPerformanceRecord>,
}

/// Run the simulator over already-fetched rows: filter the targets,
/// aggregate before-states, project the target under the action, and
/// recompose the population as projected target + untouched others.
pub fn simulate(
    records: &[AdPerformanceRecord],
    conversions: &ConversionMap,
    conditions: &[FilterCondition],
    action: &BulkAction,
    params: &SimulationParameters,
    days: i64,
) -> SimulationRun {
    let targets = filter_records(records, conditions, conversions);
    let factors = projection_factors(action, &targets, params);

    let all_before = sum_records(records, conversions);
    let before_all = AggregateSummary::from_totals(all_before, days);

    if targets.is_empty() {
        let report = SimulationReport {
            row_count: records.len(),
            target_count: 0,
            factors,
            before_all,
            before_target: None,
            after_target: None,
            after_population: before_all,
        };
        return SimulationRun {
            report,
            targets,
        };
    }

    let target_before = sum_records(&targets, conversions);
    let others_before = all_before.minus(&target_before);
    let target_after = project_totals(&target_before, &factors);
    let population_after = target_after.plus(&others_before);

    let report = SimulationReport {
        row_count: records.len(),
        target_count: targets.len(),
        factors,
        before_all,
        before_target: Some(AggregateSummary::from_totals(target_before, days)),
        after_target: Some(AggregateSummary::from_totals(target_after, days)),
        after_population: AggregateSummary::from_totals(population_after, days),
    };

    SimulationRun { report, targets }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ad_id: &str, bid: Option<f64>, cost: f64, conv: f64, conv_amt: f64) -> AdPerformanceRecord {
        AdPerformanceRecord {
            ad_id: ad_id.to_string(),
            campaign_id: None,
            mall_product_id: None,
            bid_amt: bid,
            cost,
            conv_cnt: conv,
            conv_amt,
            imp: 0.0,
            clk: 0.0,
            avg_rnk: None,
        }
    }

    fn params(k: f64, t: f64) -> SimulationParameters {
        SimulationParameters { k, t }
    }

    #[test]
    fn test_flat_delta_growth_is_ratio_of_bid_sums() {
        let targets = vec![
            record("a", Some(100.0), 0.0, 0.0, 0.0),
            record("b", Some(300.0), 0.0, 0.0, 0.0),
            // No usable bid: excluded from both sums.
            record("c", None, 0.0, 0.0, 0.0),
        ];
        let action = BulkAction::BidAmount { delta: 100.0 };
        // (200 + 400) / (100 + 300)
        assert_eq!(action.bid_growth_factor(&targets), 1.5);
    }

    #[test]
    fn test_flat_delta_clamps_new_bids_at_zero() {
        let targets = vec![
            record("a", Some(100.0), 0.0, 0.0, 0.0),
            record("b", Some(300.0), 0.0, 0.0, 0.0),
        ];
        let action = BulkAction::BidAmount { delta: -200.0 };
        // (0 + 100) / 400
        assert_eq!(action.bid_growth_factor(&targets), 0.25);
    }

    #[test]
    fn test_flat_delta_without_usable_bids_is_noop() {
        let targets = vec![record("a", None, 0.0, 0.0, 0.0)];
        let action = BulkAction::BidAmount { delta: 500.0 };
        assert_eq!(action.bid_growth_factor(&targets), 1.0);
    }

    #[test]
    fn test_zero_or_non_finite_delta_is_noop() {
        let targets = vec![record("a", Some(100.0), 0.0, 0.0, 0.0)];
        assert_eq!(
            BulkAction::BidAmount { delta: 0.0 }.bid_growth_factor(&targets),
            1.0
        );
        assert_eq!(
            BulkAction::BidAmount { delta: f64::NAN }.bid_growth_factor(&targets),
            1.0
        );
    }

    #[test]
    fn test_percent_growth_is_uniform() {
        let targets = vec![record("a", Some(100.0), 0.0, 0.0, 0.0)];
        assert_eq!(
            BulkAction::BidPercent { percent: 30.0 }.bid_growth_factor(&targets),
            1.3
        );
        assert_eq!(
            BulkAction::BidPercent { percent: -50.0 }.bid_growth_factor(&targets),
            0.5
        );
        // A cut past -100% bottoms out at zero spend.
        assert_eq!(
            BulkAction::BidPercent { percent: -150.0 }.bid_growth_factor(&targets),
            0.0
        );
    }

    #[test]
    fn test_onoff_growth() {
        let targets = vec![record("a", Some(100.0), 0.0, 0.0, 0.0)];
        assert_eq!(
            BulkAction::Onoff { status: OnOffState::Off }.bid_growth_factor(&targets),
            0.0
        );
        assert_eq!(
            BulkAction::Onoff { status: OnOffState::On }.bid_growth_factor(&targets),
            1.0
        );
    }

    #[test]
    fn test_k_sanitization() {
        assert_eq!(params(0.0, 1.0).sanitized_k(), 1.0);
        assert_eq!(params(-2.0, 1.0).sanitized_k(), 1.0);
        assert_eq!(params(f64::NAN, 1.0).sanitized_k(), 1.0);
        assert_eq!(params(1.4, 1.0).sanitized_k(), 1.4);
    }

    #[test]
    fn test_performance_factor_floors_at_zero() {
        let targets = vec![record("a", Some(100.0), 0.0, 0.0, 0.0)];
        let action = BulkAction::Onoff { status: OnOffState::Off };
        // cost factor 0, t = 2 => 1 + 2 * (0 - 1) = -1, floored to 0.
        let factors = projection_factors(&action, &targets, &params(1.0, 2.0));
        assert_eq!(factors.cost, 0.0);
        assert_eq!(factors.performance, 0.0);
    }

    #[test]
    fn test_worked_example_half_percent_cut() {
        // Target BEFORE {cost: 1000, conv: 10, convAmt: 5000}, bid_percent
        // -50%, k = 1, t = 1: everything halves and ROAS is unchanged.
        let records = vec![{
            let mut r = record("a", Some(200.0), 1_000.0, 10.0, 5_000.0);
            r.mall_product_id = None;
            r
        }];
        let action = BulkAction::BidPercent { percent: -50.0 };
        let run = simulate(
            &records,
            &ConversionMap::new(),
            &[],
            &action,
            &params(1.0, 1.0),
            1,
        );

        assert_eq!(run.report.factors.bid_growth, 0.5);
        assert_eq!(run.report.factors.cost, 0.5);
        assert_eq!(run.report.factors.performance, 0.5);

        let after = run.report.after_target.unwrap().total;
        assert_eq!(after.cost, 500.0);
        assert_eq!(after.conv, 5.0);
        assert_eq!(after.conv_amt, 2_500.0);
        assert_eq!(after.roas, 500.0);
        assert_eq!(run.report.before_target.unwrap().total.roas, 500.0);
    }

    #[test]
    fn test_noop_action_with_unit_k_preserves_target() {
        let records = vec![record("a", Some(200.0), 1_000.0, 10.0, 5_000.0)];
        let action = BulkAction::BidAmount { delta: 0.0 };
        let run = simulate(
            &records,
            &ConversionMap::new(),
            &[],
            &action,
            &params(1.0, 1.0),
            1,
        );
        assert_eq!(run.report.factors.cost, 1.0);
        assert_eq!(
            run.report.after_target.unwrap().total,
            run.report.before_target.unwrap().total
        );
    }

    #[test]
    fn test_noop_action_cost_factor_equals_k() {
        let records = vec![record("a", Some(200.0), 1_000.0, 10.0, 5_000.0)];
        let action = BulkAction::BidPercent { percent: 0.0 };
        let run = simulate(
            &records,
            &ConversionMap::new(),
            &[],
            &action,
            &params(1.3, 1.0),
            1,
        );
        assert_eq!(run.report.factors.cost, 1.3);
    }

    #[test]
    fn test_off_action_zeroes_cost_and_scales_performance() {
        let records = vec![record("a", Some(200.0), 1_000.0, 10.0, 5_000.0)];
        let action = BulkAction::Onoff { status: OnOffState::Off };
        let t = 0.4;
        let run = simulate(
            &records,
            &ConversionMap::new(),
            &[],
            &action,
            &params(1.0, t),
            1,
        );

        let after = run.report.after_target.unwrap().total;
        assert_eq!(after.cost, 0.0);
        // perf factor = 1 - t when cost factor is 0.
        assert!((after.conv - 10.0 * (1.0 - t)).abs() < 1e-9);
        assert!((after.conv_amt - 5_000.0 * (1.0 - t)).abs() < 1e-9);
        assert_eq!(after.roas, 0.0);
    }

    #[test]
    fn test_empty_target_leaves_population_untouched() {
        use crate::domain::services::filter::{FilterOp, MetricField};

        let records = vec![record("a", Some(200.0), 1_000.0, 10.0, 5_000.0)];
        let impossible = FilterCondition {
            enabled: true,
            field: MetricField::Cost,
            op: FilterOp::Gte,
            value: f64::MAX,
        };
        let run = simulate(
            &records,
            &ConversionMap::new(),
            &[impossible],
            &BulkAction::Onoff { status: OnOffState::Off },
            &SimulationParameters::default(),
            1,
        );

        assert_eq!(run.report.target_count, 0);
        assert!(run.report.before_target.is_none());
        assert!(run.report.after_target.is_none());
        assert_eq!(
            run.report.after_population.total,
            run.report.before_all.total
        );
    }

    #[test]
    fn test_population_after_recomposes_target_and_others() {
        use crate::domain::services::filter::{FilterOp, MetricField};

        let records = vec![
            record("target", Some(200.0), 1_000.0, 10.0, 5_000.0),
            record("other", Some(500.0), 400.0, 2.0, 1_000.0),
        ];
        let only_expensive = FilterCondition {
            enabled: true,
            field: MetricField::Cost,
            op: FilterOp::Gte,
            value: 900.0,
        };
        let run = simulate(
            &records,
            &ConversionMap::new(),
            &[only_expensive],
            &BulkAction::Onoff { status: OnOffState::Off },
            &params(1.0, 1.0),
            1,
        );

        assert_eq!(run.report.target_count, 1);
        let population = run.report.after_population.total;
        // Target fully off, others untouched.
        assert_eq!(population.cost, 400.0);
        assert_eq!(population.conv, 2.0);
        assert_eq!(population.conv_amt, 1_000.0);
    }

    #[test]
    fn test_action_wire_format() {
        let action: BulkAction =
            serde_json::from_str(r#"{"type":"bid_percent","percent":-20}"#).unwrap();
        assert_eq!(action, BulkAction::BidPercent { percent: -20.0 });

        let action: BulkAction =
            serde_json::from_str(r#"{"type":"onoff","status":"OFF"}"#).unwrap();
        assert_eq!(action, BulkAction::Onoff { status: OnOffState::Off });
    }
}
