//! Axum HTTP server: hosts one trial engine per participant session.
//!
//! Each session's engine sits behind its own mutex; handlers lock it only for
//! the synchronous transition and never across an `.await`. The request whose
//! input finishes the test submits the results on a blocking thread and
//! answers once the sink has resolved; inputs arriving meanwhile are ignored by
//! the engine because it is finished.
//!
//! Sessions are swept whenever a new one is created: a session idle for
//! longer than the idle limit is dropped, and a session whose results were
//! saved is dropped once the shorter finished limit has passed since its last
//! request. Sessions whose save failed keep their log until the idle limit.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/catalogue` | Categories with example stimuli for the intro screen |
//! | POST | `/sessions` | Bootstrap a session, returns its snapshot |
//! | GET | `/sessions/{id}` | Snapshot of a session |
//! | POST | `/sessions/{id}/input` | Apply `LEFT` / `RIGHT` / `ACKNOWLEDGE` |
//! | GET | `/images/{file}` | Image stimuli, SVG placeholder when missing |

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::aggregator::SaveStatus;
use crate::block_plan::{generate_blocks, validate_against_pool, PlanError};
use crate::clock::SystemClock;
use crate::constants::{
    CATALOGUE_IMAGES_PER_CATEGORY, DEBOUNCE_MS, FINISHED_SESSION_TTL_SECS, SESSION_IDLE_TTL_SECS,
};
use crate::engine::{EngineSnapshot, InputOutcome, TrialEngine};
use crate::labels::labels;
use crate::session::{bootstrap, generate_uuid, BootstrapParams};
use crate::sink::{ResultsSink, SinkError};
use crate::stimulus_pool::StimulusPool;
use crate::types::{Action, Category, Group, Session, Stimulus, StimulusType};

type Engine = TrialEngine<SmallRng, SystemClock>;

struct SessionRunner {
    session: Session,
    engine: Engine,
    last_active: Instant,
}

impl SessionRunner {
    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn is_stale(&self, now: Instant, idle_ttl: Duration, finished_ttl: Duration) -> bool {
        let idle = now.saturating_duration_since(self.last_active);
        idle >= idle_ttl || (*self.engine.save_status() == SaveStatus::Saved && idle >= finished_ttl)
    }
}

pub struct AppState {
    pool: Arc<StimulusPool>,
    sink: Arc<dyn ResultsSink>,
    image_dir: PathBuf,
    completion_url: String,
    debounce_ms: f64,
    idle_ttl: Duration,
    finished_ttl: Duration,
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionRunner>>>>,
}

impl AppState {
    /// Validates both groups' plans against the pool up front, so a bad
    /// deployment fails at startup rather than on a participant's first block.
    pub fn new(
        pool: Arc<StimulusPool>,
        sink: Arc<dyn ResultsSink>,
        image_dir: PathBuf,
        completion_url: String,
    ) -> Result<Self, PlanError> {
        for group in [Group::A, Group::B] {
            validate_against_pool(&generate_blocks(group)?, &pool)?;
        }
        Ok(Self {
            pool,
            sink,
            image_dir,
            completion_url,
            debounce_ms: DEBOUNCE_MS,
            idle_ttl: Duration::from_secs(SESSION_IDLE_TTL_SECS),
            finished_ttl: Duration::from_secs(FINISHED_SESSION_TTL_SECS),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Override the input debounce window for new sessions.
    pub fn with_debounce_ms(mut self, ms: f64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Override how long idle sessions and saved sessions are kept.
    pub fn with_session_ttl(mut self, idle: Duration, finished: Duration) -> Self {
        self.idle_ttl = idle;
        self.finished_ttl = finished;
        self
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Drop stale sessions, returning how many were removed. A session whose
    /// lock is held is in use and kept.
    pub fn evict_stale(&self) -> usize {
        let now = Instant::now();
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, runner| match runner.try_lock() {
            Ok(r) => !r.is_stale(now, self.idle_ttl, self.finished_ttl),
            Err(TryLockError::Poisoned(p)) => !p.into_inner().is_stale(now, self.idle_ttl, self.finished_ttl),
            Err(TryLockError::WouldBlock) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "stale sessions evicted");
        }
        evicted
    }

    fn runner(&self, id: &str) -> Option<Arc<Mutex<SessionRunner>>> {
        lock(&self.sessions).get(id).cloned()
    }

    fn start_session(&self, params: &BootstrapParams) -> Result<(String, SessionRunner), PlanError> {
        let mut rng = rand::rng();
        let clock = SystemClock::new();
        let session = bootstrap(params, &mut rng, &clock);
        let mut engine = TrialEngine::new(
            self.pool.clone(),
            session.group,
            SmallRng::from_rng(&mut rng),
            clock,
        )?;
        engine.set_debounce_ms(self.debounce_ms);
        let runner = SessionRunner {
            session,
            engine,
            last_active: Instant::now(),
        };
        Ok((generate_uuid(&mut rng), runner))
    }

    fn view(&self, session_id: &str, runner: &SessionRunner) -> SessionView {
        let snapshot = runner.engine.snapshot();
        let completion_url = runner
            .engine
            .is_finished()
            .then(|| self.completion_url.replace("{user_id}", &runner.session.user_id));
        SessionView {
            session_id: session_id.to_string(),
            user_id: runner.session.user_id.clone(),
            referrer: runner.session.referrer.clone(),
            start_time_ms: runner.session.start_time_ms,
            completion_url,
            snapshot,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health_check))
        .route("/catalogue", get(handle_get_catalogue))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", get(handle_get_session))
        .route("/sessions/{id}/input", post(handle_input))
        .route("/images/{file}", get(handle_get_image))
        .layer(cors)
        .with_state(state)
}

// ── Request/Response types ──────────────────────────────────────────

#[derive(Deserialize)]
struct InputRequest {
    action: Action,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    session_id: String,
    user_id: String,
    referrer: String,
    start_time_ms: i64,
    /// Survey-panel link, present once the test is finished.
    completion_url: Option<String>,
    #[serde(flatten)]
    snapshot: EngineSnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputResponse {
    outcome: InputOutcome,
    session: SessionView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogueEntry {
    category: Category,
    label: &'static str,
    #[serde(rename = "type")]
    kind: StimulusType,
    examples: Vec<Stimulus>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": msg })))
}

fn unknown_session() -> ApiError {
    error_response(StatusCode::NOT_FOUND, "unknown session")
}

// ── GET handlers ────────────────────────────────────────────────────

async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

async fn handle_get_catalogue(State(app): State<Arc<AppState>>) -> Json<Vec<CatalogueEntry>> {
    let entries = Category::ALL
        .into_iter()
        .map(|category| {
            let kind = category.stimulus_type();
            let limit = match kind {
                StimulusType::Word => usize::MAX,
                StimulusType::Image => CATALOGUE_IMAGES_PER_CATEGORY,
            };
            CatalogueEntry {
                category,
                label: labels(category).heading,
                kind,
                examples: app.pool.by_category(category).take(limit).cloned().collect(),
            }
        })
        .collect();
    Json(entries)
}

async fn handle_get_session(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let runner = app.runner(&id).ok_or_else(unknown_session)?;
    let mut r = lock(&runner);
    r.touch();
    Ok(Json(app.view(&id, &r)))
}

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160"><rect width="160" height="160" fill="#1e293b"/><text x="80" y="86" font-family="sans-serif" font-size="14" fill="#f87171" text-anchor="middle">IMG Error</text></svg>"##;

fn placeholder_image() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::HeaderName::from_static("x-iat-placeholder"), "1"),
        ],
        PLACEHOLDER_SVG,
    )
        .into_response()
}

async fn handle_get_image(State(app): State<Arc<AppState>>, Path(file): Path<String>) -> Response {
    if file.contains('/') || file.contains('\\') || file.contains("..") {
        return placeholder_image();
    }
    match tokio::fs::read(app.image_dir.join(&file)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e) => {
            warn!(file = %file, error = %e, "image missing, serving placeholder");
            placeholder_image()
        }
    }
}

// ── POST handlers ───────────────────────────────────────────────────

async fn handle_create_session(
    State(app): State<Arc<AppState>>,
    Json(params): Json<BootstrapParams>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let (id, runner) = app
        .start_session(&params)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    let view = app.view(&id, &runner);
    app.evict_stale();
    lock(&app.sessions).insert(id, Arc::new(Mutex::new(runner)));
    Ok((StatusCode::CREATED, Json(view)))
}

async fn handle_input(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<InputRequest>,
) -> Result<Json<InputResponse>, ApiError> {
    let runner = app.runner(&id).ok_or_else(unknown_session)?;

    let (outcome, submission) = {
        let mut r = lock(&runner);
        r.touch();
        let outcome = r.engine.handle_input(req.action);
        let submission = r.engine.take_submission();
        (outcome, submission.map(|payload| (r.session.clone(), payload)))
    };

    if let Some((session, payload)) = submission {
        info!(session_id = %id, user_id = %session.user_id, results = payload.data.len(), "submitting results");
        let sink = app.sink.clone();
        let result = tokio::task::spawn_blocking(move || sink.submit(&session, &payload))
            .await
            .unwrap_or_else(|e| Err(SinkError::Unavailable(e.to_string())));
        let status = lock(&runner).engine.complete_submission(result).clone();
        if let SaveStatus::Failed(reason) = &status {
            warn!(session_id = %id, reason = %reason, "results not saved");
        }
    }

    let session = app.view(&id, &lock(&runner));
    Ok(Json(InputResponse { outcome, session }))
}
