use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// An individual ad (creative) inside an ad group.
///
/// `user_lock == true` means the ad is switched OFF by the operator;
/// `false` means it is live. Bid-related fields are absent when the ad
/// inherits the group bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    pub id: String,
    pub name: String,
    pub ad_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub user_lock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_amt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mall_product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A single mutation applied to one ad on the upstream platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdChange {
    /// Set a fixed per-ad bid (disables the group bid).
    Bid { bid_amt: f64 },
    /// Lock (OFF) or unlock (ON) the ad.
    Lock { user_lock: bool },
}

impl AdChange {
    /// Validate a bid change before it is sent upstream. The platform
    /// rejects non-positive bids, so we catch those locally.
    pub fn bid(bid_amt: f64) -> Result<Self, ValidationError> {
        if !bid_amt.is_finite() || bid_amt <= 0.0 {
            return Err(ValidationError::InvalidBid);
        }
        Ok(AdChange::Bid { bid_amt })
    }

    pub fn lock(user_lock: bool) -> Self {
        AdChange::Lock { user_lock }
    }
}
