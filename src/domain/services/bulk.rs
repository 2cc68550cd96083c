//! Construction of the per-ad action list dispatched to the upstream
//! bulk-update endpoint after a simulation is confirmed.

use serde::{Deserialize, Serialize};

use crate::domain::entities::ad_performance::AdPerformanceRecord;
use crate::domain::services::simulation::{BulkAction, OnOffState};

/// The concrete change for one ad, in the upstream endpoint's shape:
/// `{"adId": …, "type": "bid", "newBid": …}` or
/// `{"adId": …, "type": "onoff", "status": "ON"|"OFF"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionItem {
    pub ad_id: String,
    #[serde(flatten)]
    pub change: BulkChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BulkChange {
    #[serde(rename_all = "camelCase")]
    Bid { new_bid: u64 },
    Onoff { status: OnOffState },
}

/// Build the minimal action list for `targets`.
///
/// Bid-type actions skip records without a usable positive bid (there is
/// nothing to adjust) and round the computed bid to the nearest integer
/// currency unit, clamped at zero. ON/OFF applies to every target.
pub fn build_bulk_actions(
    targets: &[AdPerformanceRecord],
    action: &BulkAction,
) -> Vec<BulkActionItem> {
    targets
        .iter()
        .filter_map(|record| {
            let change = match *action {
                BulkAction::BidAmount { delta } => {
                    let bid = record.usable_bid()?;
                    BulkChange::Bid {
                        new_bid: round_bid((bid + delta).max(0.0)),
                    }
                }
                BulkAction::BidPercent { percent } => {
                    let bid = record.usable_bid()?;
                    BulkChange::Bid {
                        new_bid: round_bid((bid * (1.0 + percent / 100.0)).max(0.0)),
                    }
                }
                BulkAction::Onoff { status } => BulkChange::Onoff { status },
            };
            Some(BulkActionItem {
                ad_id: record.ad_id.clone(),
                change,
            })
        })
        .collect()
}

fn round_bid(bid: f64) -> u64 {
    if bid.is_finite() {
        bid.round().max(0.0) as u64
    } else {
        0
    }
}
