//! Upstream ad-platform client trait.
//!
//! This seam keeps the console logic independent of the concrete HTTP
//! implementation: the application layer orchestrates against this trait
//! and tests substitute an in-memory fake.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::entities::ad::{Ad, AdChange};
use crate::domain::entities::ad_group::AdGroup;
use crate::domain::entities::campaign::Campaign;
use crate::domain::entities::date_range::DateRange;
use crate::domain::errors::UpstreamError;

/// Common result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Raw per-ad statistics for a date range, before joining with ad
/// metadata. Fields the platform omits come back as zeros / `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdStats {
    pub imp: f64,
    pub clk: f64,
    pub cost: f64,
    pub conv_cnt: f64,
    pub conv_amt: f64,
    pub avg_rnk: Option<f64>,
}

/// Client interface for the upstream search-ad platform.
#[async_trait]
pub trait SearchAdApi: Send + Sync {
    /// List every campaign on the account.
    async fn list_campaigns(&self) -> UpstreamResult<Vec<Campaign>>;

    /// List ad groups, optionally restricted to one campaign.
    async fn list_ad_groups(&self, campaign_id: Option<&str>) -> UpstreamResult<Vec<AdGroup>>;

    /// List the ads of one ad group.
    async fn list_ads(&self, ad_group_id: &str) -> UpstreamResult<Vec<Ad>>;

    /// Fetch aggregated statistics for one ad over a date range.
    async fn fetch_ad_stats(&self, ad_id: &str, range: &DateRange) -> UpstreamResult<AdStats>;

    /// Apply a bid or lock change to one ad.
    async fn update_ad(&self, ad_id: &str, change: &AdChange) -> UpstreamResult<()>;

    /// Total account spend for one day, in currency units.
    async fn daily_spend(&self, date: NaiveDate) -> UpstreamResult<f64>;

    /// Whether the upstream platform currently answers at all.
    async fn is_healthy(&self) -> bool {
        true
    }
}
