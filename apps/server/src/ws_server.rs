//! HTTP and WebSocket server.
//!
//! Event-driven: the cycle runner broadcasts a snapshot after every cycle,
//! and new WebSocket clients receive the current snapshot on connect.

use crate::state::{MarketSnapshot, SharedState, StatsSummary};
use arbitrage_core::{FeeBreakdown, Opportunity, OpportunityRecord, Quote};
use arbitrage_engine::{format_jpy, format_pct, summarize, RankingSummary};
use arbitrage_feeds::ExchangeHealth;
use arbitrage_storage::{
    opportunities_to_csv, prices_to_csv, ExportError, HistoryCounts, StorageError,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Default and maximum row counts for history queries.
const DEFAULT_HISTORY_LIMIT: i64 = 100;
const MAX_HISTORY_LIMIT: i64 = 5_000;

/// Quote data for WebSocket broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct WsQuoteData {
    pub exchange: String,
    /// Display name, e.g. "GMO Coin"; the id for unknown exchanges.
    pub name: String,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub mid: Option<f64>,
    /// Own-book spread in percent.
    pub spread_pct: Option<f64>,
    pub timestamp: i64,
}

impl From<&Quote> for WsQuoteData {
    fn from(quote: &Quote) -> Self {
        let name = match quote.exchange.known() {
            Some(exchange) => exchange.as_str().to_string(),
            None => quote.exchange.to_string(),
        };
        Self {
            exchange: quote.exchange.to_string(),
            name,
            last: quote.last,
            bid: quote.bid,
            ask: quote.ask,
            mid: quote.mid(),
            spread_pct: quote.spread_pct(),
            timestamp: quote.observed_at.timestamp_millis(),
        }
    }
}

/// Opportunity data for WebSocket broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct WsOpportunityData {
    pub buy_exchange: String,
    pub sell_exchange: String,
    /// "buy → sell"
    pub route: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub quantity: f64,
    pub gross_spread: f64,
    pub gross_spread_pct: f64,
    pub fee_breakdown: FeeBreakdown,
    pub total_fees: f64,
    pub net_profit: f64,
    pub net_profit_pct: f64,
    pub is_profitable: bool,
    /// Display strings, e.g. "¥98,000" and "1.960%".
    pub net_profit_display: String,
    pub gross_spread_pct_display: String,
    pub timestamp: i64,
}

impl From<&Opportunity> for WsOpportunityData {
    fn from(opp: &Opportunity) -> Self {
        Self {
            buy_exchange: opp.buy_exchange.to_string(),
            sell_exchange: opp.sell_exchange.to_string(),
            route: opp.route_label(),
            buy_price: opp.buy_price,
            sell_price: opp.sell_price,
            quantity: opp.quantity,
            gross_spread: opp.gross_spread,
            gross_spread_pct: opp.gross_spread_pct,
            fee_breakdown: opp.fee_breakdown,
            total_fees: opp.total_fees,
            net_profit: opp.net_profit,
            net_profit_pct: opp.net_profit_pct,
            is_profitable: opp.is_profitable_after_fees,
            net_profit_display: format_jpy(opp.net_profit),
            gross_spread_pct_display: format_pct(opp.gross_spread_pct),
            timestamp: opp.observed_at.timestamp_millis(),
        }
    }
}

/// Snapshot data for WebSocket broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct WsSnapshotData {
    pub cycle: u64,
    pub quotes: Vec<WsQuoteData>,
    pub opportunities: Vec<WsOpportunityData>,
    pub summary: RankingSummary,
    pub failed_exchanges: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&MarketSnapshot> for WsSnapshotData {
    fn from(snapshot: &MarketSnapshot) -> Self {
        Self {
            cycle: snapshot.cycle,
            quotes: snapshot.quotes.iter().map(WsQuoteData::from).collect(),
            opportunities: snapshot
                .opportunities
                .iter()
                .map(WsOpportunityData::from)
                .collect(),
            summary: summarize(&snapshot.opportunities),
            failed_exchanges: snapshot
                .failed_exchanges
                .iter()
                .map(|id| id.to_string())
                .collect(),
            updated_at: snapshot.updated_at,
        }
    }
}

/// Stats data for WebSocket broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct WsStatsData {
    #[serde(flatten)]
    pub stats: StatsSummary,
    pub is_running: bool,
}

/// WebSocket message types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsServerMessage {
    /// Result of a completed cycle
    #[serde(rename = "snapshot")]
    Snapshot(WsSnapshotData),
    #[serde(rename = "stats")]
    Stats(WsStatsData),
}

/// Broadcast channel sender.
pub type BroadcastSender = broadcast::Sender<WsServerMessage>;

/// Server state.
pub struct WsServerState {
    pub app_state: SharedState,
    pub broadcast_tx: BroadcastSender,
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        warn!("API error: {}", message);
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Create the server router.
pub fn create_ws_router(state: Arc<WsServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/prices", get(prices_handler))
        .route("/api/opportunities", get(opportunities_handler))
        .route("/api/history/prices", get(price_history_handler))
        .route("/api/history/opportunities", get(opportunity_history_handler))
        .route("/api/export/opportunities.csv", get(export_opportunities_handler))
        .route("/api/export/prices.csv", get(export_prices_handler))
        .layer(cors)
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> &'static str {
    "OK"
}

/// Per-exchange polling status.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeStatus {
    pub exchange: String,
    pub healthy: bool,
    #[serde(flatten)]
    pub health: ExchangeHealth,
}

/// Detector settings in effect.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSettings {
    pub threshold_pct: f64,
    pub reference_quantity: f64,
    pub interval_ms: u64,
    pub demo: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub cycle: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub stats: StatsSummary,
    pub exchanges: Vec<ExchangeStatus>,
    pub history: Option<HistoryCounts>,
    pub settings: ActiveSettings,
}

async fn status_handler(State(state): State<Arc<WsServerState>>) -> Json<StatusResponse> {
    let app = &state.app_state;
    let snapshot = app.current_snapshot();

    let exchanges = app
        .source
        .health()
        .into_iter()
        .map(|(id, health)| ExchangeStatus {
            exchange: id.to_string(),
            healthy: health.is_healthy(),
            health,
        })
        .collect();

    let history = match app.database.history_counts().await {
        Ok(counts) => Some(counts),
        Err(e) => {
            warn!("Failed to count history: {}", e);
            None
        }
    };

    Json(StatusResponse {
        running: app.is_running(),
        cycle: snapshot.cycle,
        updated_at: snapshot.updated_at,
        stats: app.stats_summary(),
        exchanges,
        history,
        settings: ActiveSettings {
            threshold_pct: app.config.detector.threshold_pct,
            reference_quantity: app.config.detector.reference_quantity,
            interval_ms: app.config.polling.interval_ms,
            demo: app.config.demo,
        },
    })
}

async fn prices_handler(State(state): State<Arc<WsServerState>>) -> Json<Vec<WsQuoteData>> {
    let snapshot = state.app_state.current_snapshot();
    Json(snapshot.quotes.iter().map(WsQuoteData::from).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunitiesResponse {
    pub cycle: u64,
    pub summary: RankingSummary,
    pub opportunities: Vec<WsOpportunityData>,
}

async fn opportunities_handler(
    State(state): State<Arc<WsServerState>>,
) -> Json<OpportunitiesResponse> {
    let snapshot = state.app_state.current_snapshot();
    Json(OpportunitiesResponse {
        cycle: snapshot.cycle,
        summary: summarize(&snapshot.opportunities),
        opportunities: snapshot
            .opportunities
            .iter()
            .map(WsOpportunityData::from)
            .collect(),
    })
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

async fn price_history_handler(
    State(state): State<Arc<WsServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Quote>>, ApiError> {
    let prices = state.app_state.database.recent_prices(query.limit()).await?;
    Ok(Json(prices))
}

async fn opportunity_history_handler(
    State(state): State<Arc<WsServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<OpportunityRecord>>, ApiError> {
    let records = state
        .app_state
        .database
        .recent_opportunities(query.limit())
        .await?;
    Ok(Json(records))
}

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_opportunities_handler(
    State(state): State<Arc<WsServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(MAX_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let records = state.app_state.database.recent_opportunities(limit).await?;
    let body = opportunities_to_csv(&records)?;
    Ok(csv_response("opportunities.csv", body))
}

async fn export_prices_handler(
    State(state): State<Arc<WsServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(MAX_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let quotes = state.app_state.database.recent_prices(limit).await?;
    let body = prices_to_csv(&quotes)?;
    Ok(csv_response("prices.csv", body))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<WsServerState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no cycle is missed in between
    let mut broadcast_rx = state.broadcast_tx.subscribe();

    debug!("WebSocket client connected");

    let snapshot = state.app_state.current_snapshot();
    let initial = [
        WsServerMessage::Snapshot(WsSnapshotData::from(snapshot.as_ref())),
        stats_message(&state.app_state),
    ];
    for msg in &initial {
        if let Ok(json) = serde_json::to_string(msg) {
            let _ = sender.send(Message::Text(json)).await;
        }
    }

    // Spawn task to send broadcast messages to this client
    let send_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(ws_msg) => {
                    if let Ok(json) = serde_json::to_string(&ws_msg) {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("WebSocket client lagged, skipped {} messages", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Handle incoming messages (ping/pong, close)
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    debug!("WebSocket client disconnected");
}

fn stats_message(state: &SharedState) -> WsServerMessage {
    WsServerMessage::Stats(WsStatsData {
        stats: state.stats_summary(),
        is_running: state.is_running(),
    })
}

/// Broadcast a completed cycle to all clients.
pub fn broadcast_snapshot(tx: &BroadcastSender, snapshot: &MarketSnapshot) {
    // No receivers is not an error
    let _ = tx.send(WsServerMessage::Snapshot(WsSnapshotData::from(snapshot)));
}

/// Broadcast current stats to all clients.
pub fn broadcast_stats(tx: &BroadcastSender, state: &SharedState) {
    let _ = tx.send(stats_message(state));
}

/// Create the server and return the broadcast sender for event-driven updates.
pub fn create_ws_server(state: SharedState) -> (Router, BroadcastSender) {
    let (broadcast_tx, _) = broadcast::channel::<WsServerMessage>(256);

    let ws_state = Arc::new(WsServerState {
        app_state: state,
        broadcast_tx: broadcast_tx.clone(),
    });

    let app = create_ws_router(ws_state);
    (app, broadcast_tx)
}

/// Start the server and return the broadcast sender.
pub async fn start_ws_server(
    state: SharedState,
    port: u16,
) -> Result<BroadcastSender, Box<dyn std::error::Error + Send + Sync>> {
    let (app, broadcast_tx) = create_ws_server(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://0.0.0.0:{} (WebSocket at /ws)", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let tx_clone = broadcast_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(tx_clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use arbitrage_engine::{ranked, OpportunityDetector};
    use axum::body::to_bytes;
    use pretty_assertions::assert_eq;

    fn sample_snapshot() -> MarketSnapshot {
        let quotes = vec![
            Quote::with_bid_ask("bitflyer", 4_999_000.0, 5_001_000.0),
            Quote::with_bid_ask("coincheck", 5_099_000.0, 5_101_000.0),
        ];
        let opportunities = ranked(OpportunityDetector::default().detect(&quotes, Utc::now()));
        MarketSnapshot {
            cycle: 4,
            quotes,
            opportunities,
            failed_exchanges: vec!["zaif".into()],
            updated_at: Some(Utc::now()),
        }
    }

    async fn server_state() -> (Arc<WsServerState>, crate::state::SnapshotSender) {
        let (app_state, tx) = test_state().await;
        let (broadcast_tx, _) = broadcast::channel(16);
        (
            Arc::new(WsServerState {
                app_state,
                broadcast_tx,
            }),
            tx,
        )
    }

    #[test]
    fn test_message_envelope() {
        let msg = WsServerMessage::Snapshot(WsSnapshotData::from(&sample_snapshot()));
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["data"]["cycle"], 4);
        assert_eq!(json["data"]["failed_exchanges"][0], "zaif");
        let opp = &json["data"]["opportunities"][0];
        assert_eq!(opp["route"], "bitflyer → coincheck");
        assert_eq!(opp["gross_spread_pct_display"], "1.960%");
        assert_eq!(json["data"]["summary"]["count"], 1);
    }

    #[test]
    fn test_stats_message_is_flat() {
        let msg = WsServerMessage::Stats(WsStatsData {
            stats: crate::state::BotStats::new().summary(),
            is_running: true,
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "stats");
        assert_eq!(json["data"]["cycles"], 0);
        assert_eq!(json["data"]["is_running"], true);
    }

    #[test]
    fn test_history_limit_is_clamped() {
        assert_eq!(HistoryQuery { limit: None }.limit(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(HistoryQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(HistoryQuery { limit: Some(1_000_000) }.limit(), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn test_quote_data_display_fields() {
        let gmo = WsQuoteData::from(&Quote::with_bid_ask("gmocoin", 4_999_000.0, 5_001_000.0));
        assert_eq!(gmo.name, "GMO Coin");
        assert_eq!(gmo.mid, Some(5_000_000.0));
        assert!(gmo.spread_pct.is_some());

        let one_sided = Quote::new("newvenue", None, Some(5_000_000.0), None, Utc::now());
        let data = WsQuoteData::from(&one_sided);
        assert_eq!(data.name, "newvenue");
        assert_eq!(data.mid, None);
        assert_eq!(data.spread_pct, None);
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let err = ApiError::from(StorageError::InvalidRetention(0));
        assert_eq!(err.to_string(), "Invalid retention period: 0 days");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Invalid retention period: 0 days");
    }

    #[tokio::test]
    async fn test_opportunities_handler_reads_snapshot() {
        let (state, tx) = server_state().await;
        tx.send_replace(Arc::new(sample_snapshot()));

        let Json(response) = opportunities_handler(State(state)).await;
        assert_eq!(response.cycle, 4);
        assert_eq!(response.opportunities.len(), 1);
        assert_eq!(response.opportunities[0].buy_exchange, "bitflyer");
    }

    #[tokio::test]
    async fn test_status_handler() {
        let (state, tx) = server_state().await;
        tx.send_replace(Arc::new(sample_snapshot()));

        let Json(status) = status_handler(State(state)).await;
        assert_eq!(status.cycle, 4);
        assert_eq!(status.settings.threshold_pct, 0.1);
        assert_eq!(status.history, Some(HistoryCounts::default()));
    }

    #[tokio::test]
    async fn test_history_and_export_handlers() {
        let (state, _tx) = server_state().await;
        let snapshot = sample_snapshot();
        state
            .app_state
            .database
            .insert_quotes(&snapshot.quotes)
            .await
            .unwrap();
        state
            .app_state
            .database
            .insert_opportunity(&snapshot.opportunities[0].to_record())
            .await
            .unwrap();

        let query = Query(HistoryQuery::default());
        let Json(prices) = price_history_handler(State(state.clone()), query).await.unwrap();
        assert_eq!(prices.len(), 2);

        let query = Query(HistoryQuery { limit: Some(1) });
        let Json(records) = opportunity_history_handler(State(state.clone()), query)
            .await
            .unwrap();
        assert_eq!(records[0].exchange_to, "coincheck");

        let response = export_opportunities_handler(State(state), Query(HistoryQuery::default()))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("timestamp,exchange_from,exchange_to"));
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_snapshot_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        broadcast_snapshot(&tx, &sample_snapshot());
        match rx.recv().await.unwrap() {
            WsServerMessage::Snapshot(data) => assert_eq!(data.cycle, 4),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
