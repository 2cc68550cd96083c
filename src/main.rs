use std::sync::Arc;

use adconsole::application::services::console_service::{
    ConsoleService, PerformanceReport, SimulationRequest, SimulationResponse, SpendReport,
};
use adconsole::auth::{operator_auth_middleware, OperatorAuth};
use adconsole::config::{credentials_from_env, ConsoleConfig};
use adconsole::domain::entities::ad::AdChange;
use adconsole::domain::entities::conversion::MainConversionRow;
use adconsole::domain::entities::date_range::DateRange;
use adconsole::domain::errors::ApiError;
use adconsole::domain::services::bulk::BulkActionItem;
use adconsole::infrastructure::searchad_client::SearchAdClient;
use adconsole::rate_limit::{throttle_middleware, InboundThrottle};
use axum::extract::{Path, Query, Request, State};
use axum::routing::{get, post, put};
use axum::middleware::{self, Next};
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adconsole=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("SearchAd console starting...");

    let auth = Arc::new(OperatorAuth::from_env());

    let config = ConsoleConfig::from_env();
    let credentials = match credentials_from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("Missing upstream credentials: {}", e);
            return Err(e.into());
        }
    };

    let client = SearchAdClient::new(
        config.api_base.clone(),
        config.billing_base.clone(),
        credentials,
        config.upstream_max_retries,
    );
    let service = Arc::new(ConsoleService::new(
        Arc::new(client),
        config.fanout(),
        config.cache_ttl(),
    ));

    let throttle = Arc::new(InboundThrottle::new(config.requests_per_minute));

    let protected = Router::new()
        .route("/conversions", post(upload_conversions))
        .route("/simulate", post(run_simulation))
        .route("/ads/bulk", post(dispatch_bulk))
        .route("/ads/:ad_id", put(update_ad))
        .route_layer(middleware::from_fn(move |req: Request, next: Next| {
            let auth = auth.clone();
            async move { operator_auth_middleware(auth, req, next).await }
        }));

    let app = Router::new()
        .route("/", get(|| async { "SearchAd console is running" }))
        .route("/health", get(health_check))
        .route("/campaigns", get(list_campaigns))
        .route("/adgroups", get(list_ad_groups))
        .route("/ads", get(list_ads))
        .route("/stats/ads", get(ad_stats))
        .route("/spend", get(spend))
        .merge(protected)
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            let throttle = throttle.clone();
            async move { throttle_middleware(throttle, req, next).await }
        }))
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(service);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Server shutting down gracefully");
    Ok(())
}

/// The reporting day that just closed, in the account's KST timezone.
fn kst_yesterday() -> NaiveDate {
    (Utc::now() + ChronoDuration::hours(9)).date_naive() - chrono::Days::new(1)
}

fn parse_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<DateRange, ApiError> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(DateRange::new(start, end)?),
        // No range means the last closed reporting day.
        (None, None) => {
            let yesterday = kst_yesterday();
            Ok(DateRange::new(yesterday, yesterday)?)
        }
        _ => Err(ApiError::InvalidRequest(
            "start and end must be given together".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeQuery {
    campaign_id: Option<String>,
    adgroup_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    campaign_id: Option<String>,
    adgroup_id: Option<String>,
}

/// Service status plus whether the upstream platform answers.
async fn health_check(
    State(service): State<Arc<ConsoleService>>,
) -> Json<serde_json::Value> {
    let upstream = service.upstream_healthy().await;
    let cache = service.cache_stats().await;
    Json(serde_json::json!({
        "status": "running",
        "upstream_healthy": upstream,
        "cache": { "hits": cache.hits, "misses": cache.misses },
    }))
}

async fn list_campaigns(
    State(service): State<Arc<ConsoleService>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let campaigns = service.campaigns().await?;
    Ok(Json(serde_json::json!({ "campaigns": campaigns })))
}

async fn list_ad_groups(
    State(service): State<Arc<ConsoleService>>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = service.ad_groups(query.campaign_id.as_deref()).await?;
    Ok(Json(serde_json::json!({ "adgroups": groups })))
}

async fn list_ads(
    State(service): State<Arc<ConsoleService>>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ads = service
        .ads_in_scope(query.campaign_id.as_deref(), query.adgroup_id.as_deref())
        .await?;
    let ads: Vec<_> = ads.into_iter().map(|(ad, _)| ad).collect();
    Ok(Json(serde_json::json!({ "ads": ads })))
}

/// Performance rows for the range, with the period / daily summary.
async fn ad_stats(
    State(service): State<Arc<ConsoleService>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<PerformanceReport>, ApiError> {
    let range = parse_range(query.start, query.end)?;
    let report = service
        .performance_report(
            &range,
            query.campaign_id.as_deref(),
            query.adgroup_id.as_deref(),
        )
        .await?;
    Ok(Json(report))
}

async fn spend(
    State(service): State<Arc<ConsoleService>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<SpendReport>, ApiError> {
    let range = parse_range(query.start, query.end)?;
    let report = service.spend(&range).await?;
    Ok(Json(report))
}

/// Replace the supplementary conversion map with uploaded rows.
async fn upload_conversions(
    State(service): State<Arc<ConsoleService>>,
    Json(rows): Json<Vec<MainConversionRow>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let products = service.replace_conversions(&rows).await;
    Ok(Json(serde_json::json!({ "products": products })))
}

async fn run_simulation(
    State(service): State<Arc<ConsoleService>>,
    Json(request): Json<SimulationRequest>,
) -> Result<Json<SimulationResponse>, ApiError> {
    // Re-validate the range; deserialization alone does not order-check.
    let range = DateRange::new(request.range.start, request.range.end)?;
    let request = SimulationRequest { range, ..request };
    let response = service.run_simulation(&request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct BulkDispatchBody {
    items: Vec<BulkActionItem>,
}

async fn dispatch_bulk(
    State(service): State<Arc<ConsoleService>>,
    Json(body): Json<BulkDispatchBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.items.is_empty() {
        return Err(ApiError::InvalidRequest("items array is empty".to_string()));
    }
    let outcome = service.dispatch_bulk(&body.items).await;
    Ok(Json(serde_json::json!({
        "ok": true,
        "total": outcome.total,
        "success": outcome.success,
        "fail": outcome.fail,
        "errors": outcome.errors,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdUpdateBody {
    bid_amt: Option<f64>,
    user_lock: Option<bool>,
}

/// Change one ad's bid and/or ON-OFF state.
async fn update_ad(
    State(service): State<Arc<ConsoleService>>,
    Path(ad_id): Path<String>,
    Json(body): Json<AdUpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut changes = Vec::new();
    if let Some(bid_amt) = body.bid_amt {
        changes.push(AdChange::bid(bid_amt)?);
    }
    if let Some(user_lock) = body.user_lock {
        changes.push(AdChange::lock(user_lock));
    }
    if changes.is_empty() {
        return Err(ApiError::InvalidRequest(
            "nothing to change (bidAmt or userLock required)".to_string(),
        ));
    }

    for change in &changes {
        service.update_ad(&ad_id, change).await?;
    }
    Ok(Json(serde_json::json!({ "ok": true, "adId": ad_id })))
}
