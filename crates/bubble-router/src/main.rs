use anyhow::Context;
use axum::{routing::{get, post}, Router, Json, extract::{Path, Query, State, ws::{WebSocketUpgrade, WebSocket, Message}}};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bubble_engine::{ContentCatalog, Engine, EngineConfig, SimulatedParticipant};
use bubble_schema::{ChoiceRecord, NextCardDecision, SessionAggregate};
use futures_util::{StreamExt, SinkExt};
use metrics::{counter, decrement_gauge, gauge, histogram, increment_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod store;
use store::SessionStore;

const DEMO_SESSION: &str = "DEMO";
const DEMO_STEP_CHANCE: f64 = 0.3;

static PROM: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
struct AppState { engine: Arc<Engine>, store: Arc<SessionStore> }

async fn metrics_handler() -> String { PROM.get().map(|h| h.render()).unwrap_or_default() }

async fn next_card(State(app): State<AppState>, Path((sid, pid)): Path<(String, String)>) -> Json<NextCardDecision> {
    let (decision, phase) = app.store.next_card(&app.engine, &sid, &pid).await;
    let outcome = if decision.is_exhausted() { "exhausted" } else { phase.as_str() };
    counter!("bubble_next_card_total", 1, "outcome" => outcome);
    tracing::debug!(session_id=%sid, participant_id=%pid, content_id=?decision.content_id(), outcome, "next_card");
    Json(decision)
}

async fn record_choice(State(app): State<AppState>, Path((sid, pid)): Path<(String, String)>, Json(choice): Json<ChoiceRecord>) -> Response {
    let action = if choice.is_like() { "like" } else { "skip" };
    match app.store.record_choice(&app.engine, &sid, &pid, choice).await {
        Ok(total) => {
            counter!("bubble_choices_total", 1, "action" => action);
            (StatusCode::OK, Json(json!({"choices": total}))).into_response()
        }
        Err(e) => {
            counter!("bubble_choices_rejected_total", 1, "reason" => e.as_str());
            tracing::debug!(session_id=%sid, participant_id=%pid, reason=e.as_str(), "choice_rejected");
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": e.as_str()}))).into_response()
        }
    }
}

fn unknown(what: &str) -> Response { (StatusCode::NOT_FOUND, Json(json!({"error": format!("unknown_{}", what)}))).into_response() }

/// Latest published aggregate, or a fresh one before the first tick. Only the tick loop publishes.
async fn aggregate(State(app): State<AppState>, Path(sid): Path<String>) -> Response {
    if let Some(latest) = app.store.latest(&sid).await { return Json(latest).into_response(); }
    match app.store.aggregate(&app.engine, &sid, &mut StdRng::from_entropy()).await {
        Some(agg) => Json(agg).into_response(),
        None => unknown("session"),
    }
}

async fn reveal(State(app): State<AppState>, Path(sid): Path<String>) -> Response {
    match app.store.snapshot(&sid).await {
        Some(participants) => Json(app.engine.reveal(&participants)).into_response(),
        None => unknown("session"),
    }
}

async fn summary(State(app): State<AppState>, Path((sid, pid)): Path<(String, String)>) -> Response {
    match app.store.profile(&sid, &pid).await {
        Some(profile) => Json(app.engine.summary(&profile)).into_response(),
        None => unknown("participant"),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let sid = params.get("session").cloned().unwrap_or_else(|| DEMO_SESSION.into());
    ws.on_upgrade(move |socket| handle_socket(socket, app, sid))
}

async fn handle_socket(socket: WebSocket, app: AppState, sid: String) {
    let span = tracing::info_span!("ws_session", session_id = %sid);
    let mut rx = app.store.subscribe(&sid).await;
    let latest = app.store.latest(&sid).await;
    let (mut sender, mut receiver) = socket.split();
    let forward = tokio::spawn(async move {
        if let Some(agg) = latest {
            if let Ok(line) = serde_json::to_string(&agg) { if sender.send(Message::Text(line)).await.is_err() { return; } }
        }
        loop {
            match rx.recv().await {
                Ok(line) => { if sender.send(Message::Text(line)).await.is_err() { break; } }
                Err(RecvError::Lagged(n)) => { counter!("bubble_ws_lagged_total", n); }
                Err(RecvError::Closed) => break,
            }
        }
    }.instrument(span.clone()));
    increment_gauge!("bubble_ws_clients", 1.0);
    async {
        tracing::debug!("ws_open");
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
        tracing::debug!("ws_closed");
    }.instrument(span).await;
    decrement_gauge!("bubble_ws_clients", 1.0);
    forward.abort();
}

/// Recomputes one session's aggregate and publishes it if it changed. `None` for unknown sessions.
async fn publish_session(app: &AppState, sid: &str, rng: &mut StdRng) -> Option<SessionAggregate> {
    let started = Instant::now();
    let agg = app.store.aggregate(&app.engine, sid, rng).await?;
    histogram!("bubble_aggregate_ms", started.elapsed().as_secs_f64() * 1000.0);
    gauge!("bubble_shared_reality_pct", agg.shared_reality_pct as f64, "session" => sid.to_string());
    gauge!("bubble_clusters", agg.clusters.len() as f64, "session" => sid.to_string());
    if app.store.publish(sid, agg.clone()).await {
        counter!("bubble_aggregates_published_total", 1);
    } else {
        counter!("bubble_aggregates_unchanged_total", 1);
    }
    Some(agg)
}

async fn run_ticks(app: AppState, every: Duration) {
    let mut tick = tokio::time::interval(every);
    let mut rng = StdRng::from_entropy();
    loop {
        tick.tick().await;
        let started = Instant::now();
        let pruned = app.store.prune().await;
        if pruned > 0 { tracing::debug!(pruned, "dropped idle sessions"); }
        for sid in app.store.session_ids().await {
            publish_session(&app, &sid, &mut rng).instrument(tracing::debug_span!("tick", session_id = %sid)).await;
        }
        histogram!("bubble_tick_ms", started.elapsed().as_secs_f64() * 1000.0);
    }
}

async fn run_demo(app: AppState, bots: Vec<SimulatedParticipant>, every: Duration) {
    let budget = app.engine.config().session.cards_per_participant;
    let mut tick = tokio::time::interval(every);
    let mut rng = StdRng::from_entropy();
    loop {
        tick.tick().await;
        for bot in &bots {
            let id = &bot.profile.id;
            if app.store.history_len(DEMO_SESSION, id).await >= budget || !rng.gen_bool(DEMO_STEP_CHANCE) { continue; }
            let (decision, _) = app.store.next_card(&app.engine, DEMO_SESSION, id).await;
            let NextCardDecision::Card { content_id } = decision else { continue };
            let Some(item) = app.engine.catalog().get(&content_id) else { continue };
            let action = bot.react(item, &mut rng);
            let choice = ChoiceRecord { content_id, action, timestamp: now_ms(), dwell_time_ms: Some(rng.gen_range(400..3000)) };
            if app.store.record_choice(&app.engine, DEMO_SESSION, id, choice).await.is_ok() { counter!("bubble_demo_choices_total", 1); }
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn load_engine() -> anyhow::Result<Engine> {
    let config = match std::env::var("BUBBLE_ENGINE_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path).with_context(|| format!("engine config {}", path))?,
        Err(_) => EngineConfig::default(),
    };
    let catalog = match std::env::var("BUBBLE_CATALOG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("catalog {}", path))?;
            ContentCatalog::from_json(&raw).with_context(|| format!("catalog {}", path))?
        }
        Err(_) => ContentCatalog::builtin().context("builtin catalog")?,
    };
    tracing::info!(items = catalog.len(), subcategories = catalog.subcategories().len(), "catalog loaded");
    Ok(Engine::new(catalog, config))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| anyhow::anyhow!("invalid {}: {}", key, v)),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,bubble_router=debug".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .init();
    let _ = PROM.set(PrometheusBuilder::new().install_recorder()?);

    let app_state = AppState { engine: Arc::new(load_engine()?), store: Arc::new(SessionStore::default()) };
    let tick = Duration::from_millis(env_or("BUBBLE_TICK_MS", 2000u64)?.max(1));
    tokio::spawn(run_ticks(app_state.clone(), tick));

    let bots: usize = env_or("BUBBLE_DEMO_BOTS", 0)?;
    if bots > 0 {
        let mut rng = StdRng::from_entropy();
        let bots: Vec<SimulatedParticipant> = (0..bots).map(|n| SimulatedParticipant::new(format!("bot_{}", n), &mut rng)).collect();
        tracing::info!(bots = bots.len(), session_id = DEMO_SESSION, "demo bots enabled");
        tokio::spawn(run_demo(app_state.clone(), bots, tick).instrument(tracing::info_span!("demo")));
    }

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions/:sid/participants/:pid/next", get(next_card))
        .route("/sessions/:sid/participants/:pid/choices", post(record_choice))
        .route("/sessions/:sid/participants/:pid/summary", get(summary))
        .route("/sessions/:sid/aggregate", get(aggregate))
        .route("/sessions/:sid/reveal", get(reveal))
        .with_state(app_state);

    let addr: std::net::SocketAddr = env_or("BUBBLE_ADDR", std::net::SocketAddr::from(([0, 0, 0, 0], 7443)))?;
    tracing::info!(%addr, ?tick, "bubble router listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
