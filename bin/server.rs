// Matchmaker - Read-only REST API with Axum
// Serves investors, scored startups, live matches and the audit trail.
// Writes happen only through the batch runner.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use matchmaker::{Event, Investor, Match, Repository, SqliteStore, Startup};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }

    fn failed(message: String) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                success: false,
                data: None,
                error: Some(message),
            }),
        )
            .into_response()
    }
}

/// Run a read against the store and wrap the result
fn read<T, F>(state: &AppState, what: &str, f: F) -> Response
where
    T: Serialize,
    F: FnOnce(&SqliteStore) -> anyhow::Result<T>,
{
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(_) => return ApiResponse::<T>::failed("store lock poisoned".to_string()),
    };

    match f(&store) {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => {
            error!(error = %e, "failed to load {}", what);
            ApiResponse::<T>::failed(format!("failed to load {}", what))
        }
    }
}

/// Startup response (scores flattened)
#[derive(Serialize)]
struct StartupResponse {
    id: String,
    name: String,
    sectors: Vec<String>,
    stage: Option<String>,
    total_score: Option<f64>,
    imputed: Vec<String>,
}

impl From<Startup> for StartupResponse {
    fn from(s: Startup) -> Self {
        let total_score = s.total_score();
        Self {
            imputed: s.scores.map(|c| c.imputed).unwrap_or_default(),
            id: s.id,
            name: s.name,
            sectors: s.sectors,
            stage: s.stage,
            total_score,
        }
    }
}

/// Guard status response
#[derive(Serialize)]
struct GuardStatus {
    live_matches: u64,
    last_known_good: Option<u64>,
    last_trip: Option<Event>,
    last_commit: Option<Event>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/investors - All promoted investors
async fn get_investors(State(state): State<AppState>) -> Response {
    read(&state, "investors", |store| -> anyhow::Result<Vec<Investor>> {
        store.all_investors()
    })
}

/// GET /api/startups - Startups with their latest scores
async fn get_startups(State(state): State<AppState>) -> Response {
    read(&state, "startups", |store| {
        let startups = store.all_startups()?;
        Ok(startups.into_iter().map(StartupResponse::from).collect::<Vec<_>>())
    })
}

/// GET /api/matches - Live match set
async fn get_matches(State(state): State<AppState>) -> Response {
    read(&state, "matches", |store| -> anyhow::Result<Vec<Match>> {
        store.live_matches()
    })
}

/// GET /api/startups/:id/matches - Ranked matches for one startup
async fn get_startup_matches(
    State(state): State<AppState>,
    Path(startup_id): Path<String>,
) -> Response {
    read(&state, "startup matches", |store| store.matches_for_startup(&startup_id))
}

/// GET /api/guard - Live count, last known-good snapshot, latest trip/commit
async fn get_guard_status(State(state): State<AppState>) -> Response {
    read(&state, "guard status", |store| {
        Ok(GuardStatus {
            live_matches: store.live_match_count()?,
            last_known_good: store.last_known_good_count()?,
            last_trip: store.recent_events(Some("guard_tripped"), 1)?.into_iter().next(),
            last_commit: store.recent_events(Some("matches_committed"), 1)?.into_iter().next(),
        })
    })
}

/// GET /api/candidates/blocked - Candidates the quality gate rejected
async fn get_blocked_candidates(State(state): State<AppState>) -> Response {
    read(&state, "blocked candidates", |store| {
        store.recent_events(Some("candidate_blocked"), 100)
    })
}

/// GET /api/events - Recent audit events
async fn get_events(State(state): State<AppState>) -> Response {
    read(&state, "events", |store| store.recent_events(None, 100))
}

/// GET /api/events/:type - Recent audit events of one type
async fn get_events_by_type(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
) -> Response {
    read(&state, "events", |store| store.recent_events(Some(&event_type), 100))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchmaker=info,tower_http=info".into()),
        )
        .init();

    println!("🌐 Matchmaker - API Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("MATCHMAKER_DB").unwrap_or_else(|_| "matchmaker.db".to_string());
    if !std::path::Path::new(&db_path).exists() {
        eprintln!("❌ Database not found at {}", db_path);
        eprintln!("   Run: matchmaker import-mentions <csv>");
        eprintln!("   to create it first.");
        std::process::exit(1);
    }

    let store = SqliteStore::open(&db_path)?;
    println!("✓ Database opened: {}", db_path);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/investors", get(get_investors))
        .route("/startups", get(get_startups))
        .route("/startups/:id/matches", get(get_startup_matches))
        .route("/candidates/blocked", get(get_blocked_candidates))
        .route("/matches", get(get_matches))
        .route("/guard", get(get_guard_status))
        .route("/events", get(get_events))
        .route("/events/:type", get(get_events_by_type))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("MATCHMAKER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/matches", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
