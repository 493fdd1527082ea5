//! HTTP transport: receives chat messages and replies with the answer.

mod error;
mod state;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::instrument;

pub use error::*;
pub use state::*;

use crate::llm::Model;
use crate::store::Store;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Header carrying the shared secret of the chat platform.
pub const TOKEN_HEADER: &str = "x-transport-token";

pub const WELCOME: &str = "Привет! Я бот для аналитики видео.\n\n\
    Я могу ответить на вопросы о статистике видео, например:\n\
    • Сколько всего видео в системе?\n\
    • Сколько видео у креатора с id ...?\n\
    • Сколько видео набрало больше N просмотров?\n\
    • На сколько просмотров выросли видео за определённую дату?\n\n\
    Просто задайте вопрос на русском языке!";

pub const HELP: &str = "Как пользоваться ботом:\n\n\
    Просто напишите вопрос на русском языке, например:\n\
    • Сколько всего видео есть в системе?\n\
    • Сколько видео у креатора с id abc123?\n\
    • Сколько видео набрало больше 100000 просмотров?\n\
    • На сколько просмотров выросли все видео 28 ноября 2025?\n\n\
    Бот работает с данными из PostgreSQL и использует LLM для понимания запросов.\n\n\
    Важно: бот возвращает только числовой ответ.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub reply: String,
}

/// What an incoming message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    Question(&'a str),
    /// Empty text or a command nobody handles.
    Ignore,
}

impl<'a> Command<'a> {
    pub fn parse(text: &'a str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Command::Ignore;
        }

        let Some(command) = text.strip_prefix('/') else {
            return Command::Question(text);
        };

        // `/help@video_stats_bot extra words`
        let name = command.split_whitespace().next().unwrap_or_default();
        let name = name.split_once('@').map_or(name, |(name, _bot)| name);

        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            _ => Command::Ignore,
        }
    }
}

pub fn create_router<M, S>(app: App<M, S>) -> Router
where
    M: Model + Send + Sync + 'static,
    S: Store + Send + Sync + 'static,
{
    Router::new()
        .route("/messages", post(message::<M, S>))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&app.token), require_token))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app)
}

async fn require_token(State(token): State<Arc<str>>, request: Request, next: Next) -> Result<Response> {
    let presented = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    if presented != Some(&*token) {
        tracing::warn!(uri = %request.uri(), "rejected a request without a valid transport token");
        return UnauthorizedSnafu.fail();
    }

    Ok(next.run(request).await)
}

#[instrument(skip_all)]
async fn message<M, S>(State(app): State<App<M, S>>, Json(message): Json<Message>) -> Response
where
    M: Model + Send + Sync + 'static,
    S: Store + Send + Sync + 'static,
{
    let question = match Command::parse(&message.text) {
        Command::Ignore => return StatusCode::NO_CONTENT.into_response(),
        Command::Start => return reply(WELCOME),
        Command::Help => return reply(HELP),
        Command::Question(question) => question,
    };

    match app.translate(question).await {
        Ok(answer) => reply(answer.text),
        Err(error) => reply(error.user_message()),
    }
}

fn reply(text: impl Into<String>) -> Response {
    Json(Reply { reply: text.into() }).into_response()
}
