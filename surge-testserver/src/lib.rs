use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_TICKETS: &str = "/api/tickets";

const QUEUE_TYPES: [&str; 4] = ["CAJA", "PERSONAL", "EMPRESAS", "GERENCIA"];

/// How the ticket endpoint answers valid requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TicketMode {
    /// 201 with a ticket body.
    #[default]
    Created,
    /// 500, as a saturated backend would.
    Degraded,
    /// 503.
    Unavailable,
}

impl FromStr for TicketMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "degraded" => Ok(Self::Degraded),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(format!(
                "unknown mode `{other}` (expected created, degraded, or unavailable)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TestServerOptions {
    pub mode: TicketMode,
    /// Delay before every response.
    pub delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    tickets_created: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
}

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn tickets_created(&self) -> u64 {
        self.tickets_created.load(Ordering::Relaxed)
    }

    /// Requests answered with 400.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketCreateRequest {
    national_id: Option<String>,
    telefono: Option<String>,
    branch_office: Option<String>,
    queue_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketResponse {
    id: u64,
    numero: String,
    national_id: String,
    telefono: Option<String>,
    branch_office: String,
    queue_type: String,
    status: &'static str,
    position_in_queue: u64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn is_valid_phone(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    let mut bytes = digits.bytes();
    matches!(bytes.next(), Some(b'1'..=b'9'))
        && (2..=15).contains(&digits.len())
        && bytes.all(|b| b.is_ascii_digit())
}

fn validate(req: TicketCreateRequest) -> Result<(String, Option<String>, String, String), String> {
    let national_id = req
        .national_id
        .filter(|v| !v.trim().is_empty())
        .ok_or("National ID is required")?;
    if !(7..=20).contains(&national_id.chars().count()) {
        return Err("National ID must be between 7-20 characters".to_string());
    }

    if let Some(phone) = req.telefono.as_deref()
        && !is_valid_phone(phone)
    {
        return Err("Invalid phone number format".to_string());
    }

    let branch_office = req
        .branch_office
        .filter(|v| !v.trim().is_empty())
        .ok_or("Branch office is required")?;
    if branch_office.chars().count() > 100 {
        return Err("Branch office name too long".to_string());
    }

    let queue_type = req.queue_type.ok_or("Queue type is required")?;
    if !QUEUE_TYPES.contains(&queue_type.as_str()) {
        return Err(format!("Unknown queue type: {queue_type}"));
    }

    Ok((national_id, req.telefono, branch_office, queue_type))
}

#[derive(Debug, Clone)]
struct AppState {
    opts: TestServerOptions,
    stats: TestServerStats,
}

fn bad_request(stats: &TestServerStats, error: String) -> Response {
    stats.rejected.fetch_add(1, Ordering::Relaxed);
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
}

async fn handle_create_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let stats = &state.stats;
    stats.requests_total.fetch_add(1, Ordering::Relaxed);

    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        stats.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
    }

    if !state.opts.delay.is_zero() {
        sleep(state.opts.delay).await;
    }

    let req: TicketCreateRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(err) => return bad_request(stats, format!("bad json: {err}")),
    };
    let (national_id, telefono, branch_office, queue_type) = match validate(req) {
        Ok(v) => v,
        Err(error) => return bad_request(stats, error),
    };

    match state.opts.mode {
        TicketMode::Created => {
            let id = stats.tickets_created.fetch_add(1, Ordering::Relaxed) + 1;
            let prefix = queue_type.chars().next().unwrap_or('T');
            let res = TicketResponse {
                id,
                numero: format!("{prefix}{id:02}"),
                national_id,
                telefono,
                branch_office,
                queue_type,
                status: "EN_ESPERA",
                position_in_queue: id,
            };
            (StatusCode::CREATED, Json(res)).into_response()
        }
        TicketMode::Degraded => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "ticket store unavailable".to_string(),
            }),
        )
            .into_response(),
        TicketMode::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

pub fn router(opts: TestServerOptions, stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_TICKETS, post(handle_create_ticket))
        .with_state(AppState { opts, stats })
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(opts: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(opts, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tickets_url(&self) -> String {
        format!("{}{PATH_TICKETS}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
