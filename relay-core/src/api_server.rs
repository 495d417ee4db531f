// HTTP control panel for operators
use crate::{
    control::{PoolSettingsUpdate, RelayController},
    error::{Error, Result},
    mode::DifficultyMode,
    types::RelayStatus,
};
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Write, net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

/// Form posted by the difficulty selector
#[derive(Debug, Deserialize)]
pub struct SetDifficultyForm {
    pub mode: Option<String>,
}

/// Form posted by the pool settings editor
#[derive(Debug, Deserialize)]
pub struct PoolSettingsForm {
    pub pool_url: Option<String>,
    pub pool_port: Option<String>,
    pub listen_port: Option<String>,
}

/// HTTP control panel server
pub struct ApiServer {
    bind_address: SocketAddr,
    controller: Arc<RelayController>,
}

impl ApiServer {
    pub fn new(bind_address: SocketAddr, controller: Arc<RelayController>) -> Self {
        Self {
            bind_address,
            controller,
        }
    }

    /// Start the control panel
    pub async fn start(self) -> Result<()> {
        let app = self.create_router();

        info!("Starting control panel on {}", self.bind_address);

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| Error::Network(format!("Failed to bind control panel: {}", e)))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("Control panel error: {}", e)))?;

        Ok(())
    }

    /// Create the router with all endpoints
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/set_difficulty", post(set_difficulty))
            .route("/update_pool_settings", post(update_pool_settings))
            .route("/api/v1/status", get(get_status))
            .route("/api/v1/health", get(get_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(Arc::clone(&self.controller))
    }
}

/// Status page with the control forms
async fn index(State(controller): State<Arc<RelayController>>) -> Html<String> {
    Html(render_status_page(&controller.status().await))
}

async fn set_difficulty(
    State(controller): State<Arc<RelayController>>,
    Form(form): Form<SetDifficultyForm>,
) -> Redirect {
    match form.mode {
        Some(mode) => {
            controller.set_difficulty_mode(&mode).await;
        }
        None => warn!("Difficulty form posted without a mode"),
    }
    Redirect::to("/")
}

async fn update_pool_settings(
    State(controller): State<Arc<RelayController>>,
    Form(form): Form<PoolSettingsForm>,
) -> std::result::Result<Redirect, (StatusCode, String)> {
    let update = match PoolSettingsUpdate::from_fields(
        form.pool_url.as_deref(),
        form.pool_port.as_deref(),
        form.listen_port.as_deref(),
    ) {
        Ok(update) => update,
        Err(e) => {
            warn!("Ignoring pool settings update: {}", e);
            return Ok(Redirect::to("/"));
        }
    };

    match controller.update_pool_settings(update).await {
        Ok(addr) => {
            info!("Relay now listening on {}", addr);
            Ok(Redirect::to("/"))
        }
        Err(e) => {
            error!("Failed to apply pool settings: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Get relay status
async fn get_status(State(controller): State<Arc<RelayController>>) -> Json<ApiResponse<RelayStatus>> {
    Json(ApiResponse::success(controller.status().await))
}

/// Health check endpoint
async fn get_health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_status_page(status: &RelayStatus) -> String {
    let mut options = String::new();
    for mode in DifficultyMode::ALL {
        let selected = if mode == status.difficulty_mode { " selected" } else { "" };
        let _ = write!(options, r#"<option value="{0}"{1}>{0}</option>"#, mode, selected);
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Stratum Relay</title></head>
<body>
<h1>Stratum Relay</h1>
<table>
<tr><td>Miners connected</td><td>{miners}</td></tr>
<tr><td>Best share</td><td>{best}</td></tr>
<tr><td>Total shares</td><td>{total}</td></tr>
<tr><td>Rejected shares</td><td>{rejected}</td></tr>
<tr><td>Current difficulty</td><td>{difficulty}</td></tr>
<tr><td>Difficulty mode</td><td>{mode}</td></tr>
<tr><td>Pool</td><td>{pool_url}:{pool_port}</td></tr>
<tr><td>Listening on</td><td>{host}:{listen_port}</td></tr>
</table>
<h2>Difficulty</h2>
<form method="post" action="/set_difficulty">
<select name="mode">{options}</select>
<button type="submit">Apply</button>
</form>
<h2>Pool settings</h2>
<form method="post" action="/update_pool_settings">
<input name="pool_url" value="{pool_url}">
<input name="pool_port" value="{pool_port}">
<input name="listen_port" value="{listen_port}">
<button type="submit">Update</button>
</form>
</body>
</html>
"#,
        miners = status.miners_connected,
        best = status.best_share,
        total = status.total_shares,
        rejected = status.rejected_shares,
        difficulty = status.current_difficulty,
        mode = status.difficulty_mode,
        pool_url = escape_html(&status.pool_url),
        pool_port = status.pool_port,
        host = escape_html(&status.listen_host),
        listen_port = status.listen_port,
        options = options,
    )
}
