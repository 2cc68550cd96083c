//! reqwest-based client for the Naver SearchAd REST API.
//!
//! Authentication uses the account's static credential headers
//! (`X-API-KEY`, `X-Customer`); request signing is handled at the
//! deployment boundary and is out of scope here. Rate-limit responses
//! (HTTP 429) are retried with `Retry-After`-aware backoff.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;
use zeroize::Zeroizing;

use crate::domain::entities::ad::{Ad, AdChange};
use crate::domain::entities::ad_group::AdGroup;
use crate::domain::entities::campaign::Campaign;
use crate::domain::entities::date_range::DateRange;
use crate::domain::errors::UpstreamError;
use crate::domain::repositories::search_ad_api::{AdStats, SearchAdApi, UpstreamResult};

/// Longest single backoff wait, in seconds.
const MAX_BACKOFF_SECS: u64 = 8;

/// Credential material for the upstream account.
pub struct SearchAdCredentials {
    pub api_key: Zeroizing<String>,
    pub customer_id: String,
}

pub struct SearchAdClient {
    http: Client,
    api_base: Url,
    billing_base: Url,
    credentials: SearchAdCredentials,
    max_retries: u32,
}

impl std::fmt::Debug for SearchAdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAdClient")
            .field("api_base", &self.api_base.as_str())
            .field("billing_base", &self.billing_base.as_str())
            .field("customer_id", &self.credentials.customer_id)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl SearchAdClient {
    pub fn new(
        api_base: Url,
        billing_base: Url,
        credentials: SearchAdCredentials,
        max_retries: u32,
    ) -> Self {
        SearchAdClient {
            http: Client::new(),
            api_base,
            billing_base,
            credentials,
            max_retries,
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("X-API-KEY", self.credentials.api_key.as_str())
            .header("X-Customer", self.credentials.customer_id.as_str())
            .header("Content-Type", "application/json")
    }

    fn api_url(&self, path: &str) -> UpstreamResult<Url> {
        self.api_base
            .join(path)
            .map_err(|e| UpstreamError::Request(format!("bad url {}: {}", path, e)))
    }

    fn billing_url(&self, path: &str) -> UpstreamResult<Url> {
        self.billing_base
            .join(path)
            .map_err(|e| UpstreamError::Request(format!("bad url {}: {}", path, e)))
    }

    /// Send a request, retrying 429 responses. `Retry-After` seconds win
    /// over the linearly growing 1s, 2s, … default; every wait is capped.
    /// After the retry budget one final attempt is returned as-is.
    async fn send_with_retry<F>(&self, build: F) -> UpstreamResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        for attempt in 0..self.max_retries {
            let response = build()
                .send()
                .await
                .map_err(|e| UpstreamError::Request(e.to_string()))?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let wait = backoff_wait(retry_after, attempt);
            warn!(attempt, wait_secs = wait, "upstream rate limited, backing off");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }

        build()
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))
    }

    async fn read_success(response: Response) -> UpstreamResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> UpstreamResult<T> {
        let body = Self::read_success(
            self.send_with_retry(|| self.authed(self.http.get(url.clone())))
                .await?,
        )
        .await?;
        serde_json::from_str(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

/// Backoff wait in seconds for the given attempt (0-based), honoring a
/// parsed `Retry-After` value when larger.
fn backoff_wait(retry_after: Option<u64>, attempt: u32) -> u64 {
    retry_after
        .unwrap_or(0)
        .max(attempt as u64 + 1)
        .min(MAX_BACKOFF_SECS)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCampaign {
    ncc_campaign_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    campaign_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    daily_budget: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAdGroup {
    ncc_adgroup_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ncc_campaign_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAd {
    ncc_ad_id: String,
    #[serde(default)]
    ncc_adgroup_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    user_lock: bool,
    #[serde(default)]
    ad: Option<RawAdContent>,
    #[serde(default)]
    ad_attr: Option<RawAdAttr>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAdContent {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    mall_product_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAdAttr {
    #[serde(default)]
    bid_amt: Option<f64>,
    #[serde(default)]
    use_group_bid_amt: Option<bool>,
}

fn map_ad(raw: RawAd) -> Ad {
    let content = raw.ad.unwrap_or_default();
    let attr = raw.ad_attr.unwrap_or_default();
    let name = content
        .name
        .clone()
        .or_else(|| content.product_name.clone())
        .unwrap_or_else(|| raw.ncc_ad_id.clone());
    // Ads inheriting the group bid have no per-ad bid of their own.
    let bid_amt = if attr.use_group_bid_amt.unwrap_or(false) {
        None
    } else {
        attr.bid_amt
    };
    Ad {
        id: raw.ncc_ad_id,
        name,
        ad_group_id: raw.ncc_adgroup_id,
        status: raw.status,
        user_lock: raw.user_lock,
        bid_amt,
        mall_product_id: content.mall_product_id,
        product_name: content.product_name,
        image_url: content.image_url,
    }
}

/// Flatten the platform's stats envelope. The response is sometimes a
/// bare array, sometimes wrapped in `data`, and entries may nest their
/// values under `items`; every shape degrades to an item list.
fn stat_items(value: &Value) -> Vec<&Value> {
    let list = value
        .as_array()
        .or_else(|| value.get("data").and_then(Value::as_array))
        .or_else(|| value.get("items").and_then(Value::as_array));

    let mut out = Vec::new();
    if let Some(list) = list {
        for entry in list {
            match entry.get("items").and_then(Value::as_array) {
                Some(nested) => out.extend(nested.iter()),
                None => out.push(entry),
            }
        }
    }
    out
}

fn stat_field(item: &Value, key: &str) -> f64 {
    item.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn sum_stats(value: &Value) -> AdStats {
    let items = stat_items(value);
    let mut stats = AdStats::default();
    let mut rnk_sum = 0.0;
    let mut n = 0usize;

    for item in items {
        stats.imp += stat_field(item, "impCnt");
        stats.clk += stat_field(item, "clkCnt");
        stats.cost += stat_field(item, "salesAmt");
        stats.conv_cnt += stat_field(item, "ccnt");
        stats.conv_amt += stat_field(item, "convAmt");
        rnk_sum += stat_field(item, "avgRnk");
        n += 1;
    }

    if n > 0 && rnk_sum > 0.0 {
        stats.avg_rnk = Some(rnk_sum / n as f64);
    }
    stats
}

#[async_trait]
impl SearchAdApi for SearchAdClient {
    async fn list_campaigns(&self) -> UpstreamResult<Vec<Campaign>> {
        let url = self.api_url("/ncc/campaigns")?;
        let raw: Vec<RawCampaign> = self.get_json(url).await?;
        Ok(raw
            .into_iter()
            .map(|c| Campaign {
                id: c.ncc_campaign_id,
                name: c.name,
                campaign_type: c.campaign_type,
                status: c.status,
                daily_budget: c.daily_budget,
            })
            .collect())
    }

    async fn list_ad_groups(&self, campaign_id: Option<&str>) -> UpstreamResult<Vec<AdGroup>> {
        let mut url = self.api_url("/ncc/adgroups")?;
        if let Some(campaign_id) = campaign_id {
            url.query_pairs_mut()
                .append_pair("nccCampaignId", campaign_id);
        }
        let raw: Vec<RawAdGroup> = self.get_json(url).await?;
        Ok(raw
            .into_iter()
            .map(|g| AdGroup {
                id: g.ncc_adgroup_id,
                name: g.name,
                campaign_id: g.ncc_campaign_id,
                status: g.status,
            })
            .collect())
    }

    async fn list_ads(&self, ad_group_id: &str) -> UpstreamResult<Vec<Ad>> {
        let mut url = self.api_url("/ncc/ads")?;
        url.query_pairs_mut()
            .append_pair("nccAdgroupId", ad_group_id);
        let raw: Vec<RawAd> = self.get_json(url).await?;
        Ok(raw.into_iter().map(map_ad).collect())
    }

    async fn fetch_ad_stats(&self, ad_id: &str, range: &DateRange) -> UpstreamResult<AdStats> {
        let mut url = self.api_url("/stats")?;
        let fields = json!(["impCnt", "clkCnt", "salesAmt", "ccnt", "convAmt", "avgRnk"]);
        let time_range = json!({
            "since": range.start.format("%Y-%m-%d").to_string(),
            "until": range.end.format("%Y-%m-%d").to_string(),
        });
        url.query_pairs_mut()
            .append_pair("id", ad_id)
            .append_pair("fields", &fields.to_string())
            .append_pair("timeRange", &time_range.to_string());

        let value: Value = self.get_json(url).await?;
        debug!(ad_id = %ad_id, "fetched ad stats");
        Ok(sum_stats(&value))
    }

    async fn update_ad(&self, ad_id: &str, change: &AdChange) -> UpstreamResult<()> {
        let (field, payload) = match change {
            AdChange::Bid { bid_amt } => (
                "adAttr",
                json!({
                    "nccAdId": ad_id,
                    "type": "SHOPPING_PRODUCT_AD",
                    "adAttr": { "bidAmt": bid_amt, "useGroupBidAmt": false },
                }),
            ),
            AdChange::Lock { user_lock } => (
                "userLock",
                json!({
                    "nccAdId": ad_id,
                    "type": "SHOPPING_PRODUCT_AD",
                    "userLock": user_lock,
                }),
            ),
        };

        let mut url = self.api_url(&format!("/ncc/ads/{}", ad_id))?;
        url.query_pairs_mut().append_pair("fields", field);

        let response = self
            .send_with_retry(|| self.authed(self.http.put(url.clone())).json(&payload))
            .await?;
        Self::read_success(response).await?;
        Ok(())
    }

    async fn daily_spend(&self, date: NaiveDate) -> UpstreamResult<f64> {
        let mut url = self.billing_url("/billing/bizmoney/histories/exhaust")?;
        let ymd = date.format("%Y%m%d").to_string();
        url.query_pairs_mut()
            .append_pair("searchStartDt", &ymd)
            .append_pair("searchEndDt", &ymd);

        let entries: Value = self.get_json(url).await?;
        let mut total = 0.0;
        if let Some(entries) = entries.as_array() {
            for entry in entries {
                total += stat_field(entry, "useRefundableAmt").abs();
                total += stat_field(entry, "useNonrefundableAmt").abs();
            }
        }
        Ok(total)
    }

    async fn is_healthy(&self) -> bool {
        self.list_campaigns().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_prefers_retry_after() {
        assert_eq!(backoff_wait(Some(5), 0), 5);
        assert_eq!(backoff_wait(Some(2), 3), 4);
    }

    #[test]
    fn test_backoff_grows_linearly_and_caps() {
        assert_eq!(backoff_wait(None, 0), 1);
        assert_eq!(backoff_wait(None, 3), 4);
        assert_eq!(backoff_wait(None, 20), MAX_BACKOFF_SECS);
        assert_eq!(backoff_wait(Some(60), 0), MAX_BACKOFF_SECS);
    }

    #[test]
    fn test_sum_stats_bare_array() {
        let value = json!([
            { "impCnt": 100, "clkCnt": 10, "salesAmt": 1000, "ccnt": 1, "convAmt": 5000, "avgRnk": 2.0 },
            { "impCnt": 50, "clkCnt": 5, "salesAmt": 500, "ccnt": 1, "convAmt": 2500, "avgRnk": 4.0 },
        ]);
        let stats = sum_stats(&value);
        assert_eq!(stats.imp, 150.0);
        assert_eq!(stats.clk, 15.0);
        assert_eq!(stats.cost, 1_500.0);
        assert_eq!(stats.conv_cnt, 2.0);
        assert_eq!(stats.conv_amt, 7_500.0);
        assert_eq!(stats.avg_rnk, Some(3.0));
    }

    #[test]
    fn test_sum_stats_wrapped_and_nested() {
        let value = json!({
            "data": [
                { "items": [ { "salesAmt": 300 }, { "salesAmt": 200 } ] },
                { "salesAmt": 100 },
            ]
        });
        let stats = sum_stats(&value);
        assert_eq!(stats.cost, 600.0);
        assert!(stats.avg_rnk.is_none());
    }

    #[test]
    fn test_sum_stats_empty_response() {
        assert_eq!(sum_stats(&Value::Null), AdStats::default());
        assert_eq!(sum_stats(&json!({})), AdStats::default());
    }

    #[test]
    fn test_map_ad_name_fallbacks() {
        let raw: RawAd = serde_json::from_value(json!({
            "nccAdId": "nad-1",
            "nccAdgroupId": "grp-1",
            "ad": { "productName": "Sneaker", "mallProductId": "p-1" },
        }))
        .unwrap();
        let ad = map_ad(raw);
        assert_eq!(ad.name, "Sneaker");
        assert_eq!(ad.mall_product_id.as_deref(), Some("p-1"));

        let raw: RawAd = serde_json::from_value(json!({
            "nccAdId": "nad-2",
            "nccAdgroupId": "grp-1",
        }))
        .unwrap();
        assert_eq!(map_ad(raw).name, "nad-2");
    }

    #[test]
    fn test_map_ad_group_bid_inheritance() {
        let raw: RawAd = serde_json::from_value(json!({
            "nccAdId": "nad-1",
            "nccAdgroupId": "grp-1",
            "adAttr": { "bidAmt": 150.0, "useGroupBidAmt": true },
        }))
        .unwrap();
        assert_eq!(map_ad(raw).bid_amt, None);

        let raw: RawAd = serde_json::from_value(json!({
            "nccAdId": "nad-1",
            "nccAdgroupId": "grp-1",
            "adAttr": { "bidAmt": 150.0, "useGroupBidAmt": false },
        }))
        .unwrap();
        assert_eq!(map_ad(raw).bid_amt, Some(150.0));
    }

    #[test]
    fn test_client_debug_redacts_api_key() {
        let client = SearchAdClient::new(
            Url::parse("https://api.searchad.naver.com").unwrap(),
            Url::parse("https://api.naver.com").unwrap(),
            SearchAdCredentials {
                api_key: Zeroizing::new("super-secret-key".to_string()),
                customer_id: "123456".to_string(),
            },
            4,
        );
        let debug = format!("{:?}", client);
        assert!(debug.contains("<REDACTED>"));
        assert!(!debug.contains("super-secret-key"));
    }
}
