//! Console orchestration: assembles performance rows from the upstream
//! platform, owns the conversion map and stats cache, runs simulations
//! and dispatches bulk actions.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::services::stats_cache::{Clock, StatsCache};
use crate::domain::entities::ad::{Ad, AdChange};
use crate::domain::entities::ad_group::AdGroup;
use crate::domain::entities::ad_performance::AdPerformanceRecord;
use crate::domain::entities::campaign::Campaign;
use crate::domain::entities::conversion::{
    build_conversion_map, ConversionMap, MainConversionRow,
};
use crate::domain::entities::date_range::DateRange;
use crate::domain::repositories::search_ad_api::{AdStats, SearchAdApi, UpstreamResult};
use crate::domain::services::aggregate::{aggregate, AggregateSummary};
use crate::domain::services::bulk::{build_bulk_actions, BulkActionItem, BulkChange};
use crate::domain::services::filter::FilterCondition;
use crate::domain::services::simulation::{
    simulate, BulkAction, OnOffState, SimulationParameters, SimulationReport,
};

/// Performance rows plus their period summary, as served to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub range: DateRange,
    pub row_count: usize,
    pub summary: AggregateSummary,
    pub rows: Vec<AdPerformanceRecord>,
}

/// A simulation request as posted by the operator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub range: DateRange,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub ad_group_id: Option<String>,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
    pub action: BulkAction,
    #[serde(default)]
    pub params: SimulationParameters,
}

/// Simulation report plus the action list a confirmation would dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    #[serde(flatten)]
    pub report: SimulationReport,
    pub actions: Vec<BulkActionItem>,
}

/// Outcome of dispatching a bulk action list, item failures included.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDispatchOutcome {
    pub total: usize,
    pub success: usize,
    pub fail: usize,
    pub errors: Vec<BulkItemError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemError {
    pub ad_id: String,
    pub error: String,
}

/// Account spend per day plus the range total.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendReport {
    pub range: DateRange,
    pub total: f64,
    pub per_day: Vec<DailySpend>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySpend {
    pub date: chrono::NaiveDate,
    pub total: f64,
}

/// Upstream fan-out limits: how many calls go out concurrently and how
/// long to pause between chunks to stay under the platform's rate limit.
#[derive(Debug, Clone, Copy)]
pub struct FanoutSettings {
    pub concurrency: usize,
    pub inter_chunk_delay: Duration,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        FanoutSettings {
            concurrency: 10,
            inter_chunk_delay: Duration::from_millis(300),
        }
    }
}

pub struct ConsoleService {
    api: Arc<dyn SearchAdApi>,
    cache: StatsCache,
    conversions: RwLock<ConversionMap>,
    fanout: FanoutSettings,
}

impl ConsoleService {
    pub fn new(api: Arc<dyn SearchAdApi>, fanout: FanoutSettings, cache_ttl: Duration) -> Self {
        ConsoleService {
            api,
            cache: StatsCache::with_system_clock(cache_ttl),
            conversions: RwLock::new(ConversionMap::new()),
            fanout,
        }
    }

    /// Same as [`ConsoleService::new`] with an injected cache clock.
    pub fn with_clock(
        api: Arc<dyn SearchAdApi>,
        fanout: FanoutSettings,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ConsoleService {
            api,
            cache: StatsCache::new(cache_ttl, clock),
            conversions: RwLock::new(ConversionMap::new()),
            fanout,
        }
    }

    pub async fn campaigns(&self) -> UpstreamResult<Vec<Campaign>> {
        self.api.list_campaigns().await
    }

    pub async fn ad_groups(&self, campaign_id: Option<&str>) -> UpstreamResult<Vec<AdGroup>> {
        self.api.list_ad_groups(campaign_id).await
    }

    /// Enumerate the ads in scope, tagged with their campaign id. A given
    /// ad group short-circuits; otherwise every group of the (optional)
    /// campaign is walked with bounded concurrency.
    pub async fn ads_in_scope(
        &self,
        campaign_id: Option<&str>,
        ad_group_id: Option<&str>,
    ) -> UpstreamResult<Vec<(Ad, Option<String>)>> {
        if let Some(group_id) = ad_group_id {
            let ads = self.api.list_ads(group_id).await?;
            return Ok(ads.into_iter().map(|a| (a, None)).collect());
        }

        let groups = self.api.list_ad_groups(campaign_id).await?;
        self.collect_group_ads(&groups).await
    }

    async fn collect_group_ads(
        &self,
        groups: &[AdGroup],
    ) -> UpstreamResult<Vec<(Ad, Option<String>)>> {
        let concurrency = self.fanout.concurrency.max(1);
        let mut out = Vec::new();
        let mut chunks = groups.chunks(concurrency).peekable();

        while let Some(chunk) = chunks.next() {
            let futures = chunk.iter().map(|g| self.api.list_ads(&g.id));
            for (group, result) in chunk.iter().zip(join_all(futures).await) {
                let ads = result?;
                out.extend(
                    ads.into_iter()
                        .map(|a| (a, Some(group.campaign_id.clone()))),
                );
            }
            if chunks.peek().is_some() {
                tokio::time::sleep(self.fanout.inter_chunk_delay).await;
            }
        }
        Ok(out)
    }

    /// Assemble one performance row per ad in scope: ad metadata joined
    /// with its statistics for the range, sorted by cost descending.
    /// Results are cached for the configured TTL.
    pub async fn ad_performance(
        &self,
        range: &DateRange,
        campaign_id: Option<&str>,
        ad_group_id: Option<&str>,
    ) -> UpstreamResult<Vec<AdPerformanceRecord>> {
        let key = format!(
            "{}:{}:{}:{}",
            range.start,
            range.end,
            campaign_id.unwrap_or(""),
            ad_group_id.unwrap_or("")
        );
        if let Some(rows) = self.cache.get(&key).await {
            return Ok(rows);
        }

        let ads = self.ads_in_scope(campaign_id, ad_group_id).await?;
        let concurrency = self.fanout.concurrency.max(1);
        let mut rows = Vec::with_capacity(ads.len());
        let mut chunks = ads.chunks(concurrency).peekable();

        while let Some(chunk) = chunks.next() {
            let futures = chunk
                .iter()
                .map(|(ad, _)| self.api.fetch_ad_stats(&ad.id, range));
            for ((ad, campaign_id), result) in chunk.iter().zip(join_all(futures).await) {
                // A single failed stats fetch degrades that ad to zeros
                // instead of sinking the whole query.
                let stats = match result {
                    Ok(stats) => stats,
                    Err(e) => {
                        warn!(ad_id = %ad.id, error = %e, "ad stats fetch failed, zero-filling row");
                        AdStats::default()
                    }
                };
                rows.push(AdPerformanceRecord {
                    ad_id: ad.id.clone(),
                    campaign_id: campaign_id.clone(),
                    mall_product_id: ad.mall_product_id.clone(),
                    bid_amt: ad.bid_amt,
                    cost: stats.cost,
                    conv_cnt: stats.conv_cnt,
                    conv_amt: stats.conv_amt,
                    imp: stats.imp,
                    clk: stats.clk,
                    avg_rnk: stats.avg_rnk,
                });
            }
            if chunks.peek().is_some() {
                tokio::time::sleep(self.fanout.inter_chunk_delay).await;
            }
        }

        rows.sort_by(|a, b| b.cost.partial_cmp(&a.cost).unwrap_or(Ordering::Equal));
        info!(
            rows = rows.len(),
            start = %range.start,
            end = %range.end,
            "assembled ad performance rows"
        );
        self.cache.insert(key, rows.clone()).await;
        Ok(rows)
    }

    /// Replace the supplementary conversion map with freshly uploaded
    /// rows. Returns the number of distinct products.
    pub async fn replace_conversions(&self, rows: &[MainConversionRow]) -> usize {
        let map = build_conversion_map(rows);
        let count = map.len();
        let mut conversions = self.conversions.write().await;
        *conversions = map;
        info!(products = count, "replaced main conversion map");
        count
    }

    pub async fn conversions_snapshot(&self) -> ConversionMap {
        self.conversions.read().await.clone()
    }

    /// Rows plus their aggregate summary for the range.
    pub async fn performance_report(
        &self,
        range: &DateRange,
        campaign_id: Option<&str>,
        ad_group_id: Option<&str>,
    ) -> UpstreamResult<PerformanceReport> {
        let rows = self.ad_performance(range, campaign_id, ad_group_id).await?;
        let conversions = self.conversions_snapshot().await;
        let summary = aggregate(&rows, &conversions, range.inclusive_days());
        Ok(PerformanceReport {
            range: *range,
            row_count: rows.len(),
            summary,
            rows,
        })
    }

    /// Run the bid-impact simulation for the requested scope and action.
    pub async fn run_simulation(
        &self,
        request: &SimulationRequest,
    ) -> UpstreamResult<SimulationResponse> {
        let rows = self
            .ad_performance(
                &request.range,
                request.campaign_id.as_deref(),
                request.ad_group_id.as_deref(),
            )
            .await?;
        let conversions = self.conversions_snapshot().await;

        let run = simulate(
            &rows,
            &conversions,
            &request.conditions,
            &request.action,
            &request.params,
            request.range.inclusive_days(),
        );
        let actions = build_bulk_actions(&run.targets, &request.action);

        info!(
            rows = run.report.row_count,
            targets = run.report.target_count,
            cost_factor = run.report.factors.cost,
            performance_factor = run.report.factors.performance,
            "simulation computed"
        );

        Ok(SimulationResponse {
            report: run.report,
            actions,
        })
    }

    /// Dispatch a bulk action list item by item. Item failures are
    /// captured per ad; the dispatch itself always completes.
    pub async fn dispatch_bulk(&self, items: &[BulkActionItem]) -> BulkDispatchOutcome {
        let mut outcome = BulkDispatchOutcome {
            total: items.len(),
            ..Default::default()
        };

        for item in items {
            let change = match &item.change {
                BulkChange::Bid { new_bid } => match AdChange::bid(*new_bid as f64) {
                    Ok(change) => change,
                    Err(e) => {
                        outcome.fail += 1;
                        outcome.errors.push(BulkItemError {
                            ad_id: item.ad_id.clone(),
                            error: e.to_string(),
                        });
                        continue;
                    }
                },
                BulkChange::Onoff { status } => AdChange::lock(*status == OnOffState::Off),
            };

            match self.api.update_ad(&item.ad_id, &change).await {
                Ok(()) => outcome.success += 1,
                Err(e) => {
                    outcome.fail += 1;
                    outcome.errors.push(BulkItemError {
                        ad_id: item.ad_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            total = outcome.total,
            success = outcome.success,
            fail = outcome.fail,
            "bulk action dispatched"
        );
        outcome
    }

    pub async fn update_ad(&self, ad_id: &str, change: &AdChange) -> UpstreamResult<()> {
        self.api.update_ad(ad_id, change).await
    }

    /// Sum account spend day by day over the range.
    pub async fn spend(&self, range: &DateRange) -> UpstreamResult<SpendReport> {
        let mut per_day = Vec::new();
        let mut total = 0.0;
        for date in range.iter_days() {
            let day_total = self.api.daily_spend(date).await?;
            total += day_total;
            per_day.push(DailySpend {
                date,
                total: day_total.round(),
            });
        }
        Ok(SpendReport {
            range: *range,
            total: total.round(),
            per_day,
        })
    }

    pub async fn upstream_healthy(&self) -> bool {
        self.api.is_healthy().await
    }

    pub async fn cache_stats(&self) -> crate::application::services::stats_cache::CacheStats {
        self.cache.stats().await
    }
}
