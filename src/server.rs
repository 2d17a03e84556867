//! Chat web server.
//!
//! Serves the assistant UI and the session lifecycle around it:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`/`POST` | `/` | Render the chat page; establish a session on first visit |
//! | `POST` | `/chat` | Run one chat turn; returns the answer as rendered HTML |
//! | `POST` | `/reset` | Destroy the session's agent and expire the cookie |
//! | `POST` | `/login/google` | Attach a user credential to the session agent |
//!
//! # Error Contract
//!
//! All error responses carry a JSON body with a textual detail message:
//!
//! ```json
//! { "detail": "Error: No user query" }
//! ```
//!
//! There is no retry or partial-failure recovery at this boundary; agent
//! failures surface as 500s with the underlying message.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::Agent;
use crate::backend::BackendClient;
use crate::config::Config;
use crate::llm::LlmClient;
use crate::models::{base_history, ChatTurn};
use crate::session::{CookieCodec, SessionStore};
use crate::tools::ToolRegistry;

const SESSION_COOKIE: &str = "concourse_session";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    sessions: Arc<SessionStore>,
    codec: Arc<CookieCodec>,
    llm: Arc<LlmClient>,
    tools: Arc<ToolRegistry>,
    templates: Arc<minijinja::Environment<'static>>,
}

/// Build the shared state from config. Fails fast on a missing secret key
/// or API key rather than at first request.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let secret = config.server.secret_key()?;
    let llm = LlmClient::new(&config.llm)?;

    let mut templates = minijinja::Environment::new();
    templates.add_template("index.html", include_str!("../templates/index.html"))?;

    Ok(AppState {
        config: Arc::new(config.clone()),
        sessions: Arc::new(SessionStore::new()),
        codec: Arc::new(CookieCodec::new(&secret)),
        llm: Arc::new(llm),
        tools: Arc::new(ToolRegistry::with_builtins()),
        templates: Arc::new(templates),
    })
}

/// Assemble the router. Exposed separately from [`run_server`] so tests can
/// drive the app on an ephemeral listener.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index).post(handle_index))
        .route("/chat", post(handle_chat))
        .route("/reset", post(handle_reset))
        .route("/login/google", post(handle_login_google))
        .layer(cors)
        .with_state(state)
}

/// Start the chat server and block until shutdown.
///
/// On Ctrl-C the listener stops accepting and the session map is cleared,
/// dropping every agent together with its HTTP client.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let sessions = state.sessions.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "chat server listening");
    println!("Chat server listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    sessions.clear().await;
    Ok(())
}

// ============ Error response ============

/// JSON error body: a textual detail message.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: detail.into(),
    }
}

fn unauthorized(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        detail: detail.into(),
    }
}

fn internal_error(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: detail.into(),
    }
}

// ============ Session helpers ============

/// Extract and verify the session id from the request's cookies.
fn session_id_from_headers(codec: &CookieCodec, headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            if name == SESSION_COOKIE {
                return codec.verify(value);
            }
        }
    }
    None
}

fn session_cookie(codec: &CookieCodec, id: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        codec.sign(id)
    )
}

fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE)
}

/// Construct a fresh agent with its own backend client and the greeting
/// history.
fn create_agent(state: &AppState) -> anyhow::Result<Agent> {
    let backend = BackendClient::new(&state.config.backend)?;
    Ok(Agent::new(
        backend,
        state.tools.clone(),
        state.llm.clone(),
        base_history(),
        state.config.llm.max_steps,
    ))
}

/// Return the agent for the request's session, creating the session (and
/// returning its Set-Cookie header value) when none exists.
async fn get_or_create_agent(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, Arc<Agent>, Option<String>), AppError> {
    if let Some(id) = session_id_from_headers(&state.codec, headers) {
        if let Some(agent) = state.sessions.get(&id).await {
            return Ok((id, agent, None));
        }
    }

    let id = SessionStore::mint_id();
    let agent = Arc::new(
        create_agent(state).map_err(|e| internal_error(format!("Error creating agent: {}", e)))?,
    );
    state.sessions.insert(&id, agent.clone()).await;
    tracing::info!(session = %id, "created session");

    let cookie = session_cookie(&state.codec, &id);
    Ok((id, agent, Some(cookie)))
}

// ============ GET/POST / ============

/// Render the chat page, establishing a session on first visit.
async fn handle_index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (_, agent, new_cookie) = get_or_create_agent(&state, &headers).await?;
    let history = agent.history().await;

    let page = render_index(&state, &history)
        .map_err(|e| internal_error(format!("Template error: {}", e)))?;

    let mut response = Html(page).into_response();
    if let Some(cookie) = new_cookie {
        response.headers_mut().insert(
            header::SET_COOKIE,
            cookie.parse().expect("cookie value is valid ASCII"),
        );
    }
    Ok(response)
}

fn render_index(state: &AppState, history: &[ChatTurn]) -> Result<String, minijinja::Error> {
    let template = state.templates.get_template("index.html")?;
    template.render(minijinja::context! {
        messages => history,
        client_id => state.config.server.client_id,
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    prompt: String,
}

/// Run one chat turn and return the assistant's answer as rendered HTML.
async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Html<String>, AppError> {
    if request.prompt.trim().is_empty() {
        return Err(bad_request("Error: No user query"));
    }

    let id = session_id_from_headers(&state.codec, &headers)
        .ok_or_else(|| bad_request("Error: Visit the index page before starting a chat"))?;
    let agent = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| bad_request("Error: Visit the index page before starting a chat"))?;

    tracing::info!(session = %id, prompt = %request.prompt, "chat turn");

    let answer = agent
        .invoke(&request.prompt)
        .await
        .map_err(|e| internal_error(format!("Error invoking agent: {:#}", e)))?;

    Ok(Html(render_markdown(&answer)))
}

/// Render assistant Markdown to HTML for the chat transcript.
pub fn render_markdown(text: &str) -> String {
    let parser = pulldown_cmark::Parser::new(text);
    let mut html = String::with_capacity(text.len() * 2);
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

// ============ POST /reset ============

/// Destroy the session's agent and expire the cookie.
async fn handle_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = session_id_from_headers(&state.codec, &headers)
        .ok_or_else(|| bad_request("No session to reset."))?;

    if state.sessions.remove(&id).await.is_none() {
        return Err(internal_error("Current agent not found"));
    }
    tracing::info!(session = %id, "session reset");

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        expired_session_cookie()
            .parse()
            .expect("cookie value is valid ASCII"),
    );
    Ok(response)
}

// ============ POST /login/google ============

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    credential: Option<String>,
}

/// Attach the submitted credential to the session agent's backend client
/// and bounce back to the page the form was posted from.
async fn handle_login_google(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Form(form): axum::extract::Form<LoginForm>,
) -> Result<Response, AppError> {
    let credential = form
        .credential
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| unauthorized("No user credentials found"))?;

    let (id, agent, new_cookie) = get_or_create_agent(&state, &headers).await?;
    agent.backend().set_id_token(&credential);
    tracing::info!(session = %id, "attached user credential");

    let source = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/");

    let mut response = Redirect::to(source).into_response();
    if let Some(cookie) = new_cookie {
        response.headers_mut().insert(
            header::SET_COOKIE,
            cookie.parse().expect("cookie value is valid ASCII"),
        );
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_markdown_paragraph_and_list() {
        let html = render_markdown("Flight **118** departs from:\n\n- Gate A3");
        assert!(html.contains("<strong>118</strong>"));
        assert!(html.contains("<li>Gate A3</li>"));
    }

    #[test]
    fn test_render_markdown_plain_text() {
        let html = render_markdown("hello");
        assert_eq!(html.trim(), "<p>hello</p>");
    }

    #[test]
    fn test_session_cookie_header_roundtrip() {
        let codec = CookieCodec::new("secret");
        let cookie = session_cookie(&codec, "abc-123");

        let mut headers = HeaderMap::new();
        let value = cookie.split(';').next().unwrap();
        headers.insert(header::COOKIE, value.parse().unwrap());

        assert_eq!(
            session_id_from_headers(&codec, &headers),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn test_session_id_absent_without_cookie() {
        let codec = CookieCodec::new("secret");
        let headers = HeaderMap::new();
        assert_eq!(session_id_from_headers(&codec, &headers), None);
    }

    #[test]
    fn test_session_id_ignores_other_cookies() {
        let codec = CookieCodec::new("secret");
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; other=1".parse().unwrap());
        assert_eq!(session_id_from_headers(&codec, &headers), None);
    }

    #[test]
    fn test_expired_cookie_has_max_age_zero() {
        assert!(expired_session_cookie().contains("Max-Age=0"));
    }
}
