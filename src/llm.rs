//! Client for the local text generation service.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use snafu::{IntoError as _, Location, ResultExt as _, Snafu};
use tracing::instrument;
use url::Url;

use crate::config::ModelConfig;
use crate::Located;

pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// A generative language model turning a prompt into free-form text.
pub trait Model {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ModelError {
    #[snafu(display("could not build the HTTP client at {location}: {source}"))]
    Client {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("`{url}` is not a usable model service url at {location}: {source}"))]
    Endpoint {
        url: Url,
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("model service at `{url}` is unreachable at {location}: {source}"))]
    Unreachable {
        url: Url,
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("model did not answer within {} at {location}", humantime::format_duration(*timeout)))]
    Timeout {
        timeout: Duration,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("model service answered {status} at {location}: {message}"))]
    Status {
        status: StatusCode,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("malformed response from the model service at {location}: {source}"))]
    MalformedResponse {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for ModelError {
    fn location(&self) -> Location {
        match self {
            ModelError::Client { location, .. }
            | ModelError::Endpoint { location, .. }
            | ModelError::Unreachable { location, .. }
            | ModelError::Timeout { location, .. }
            | ModelError::Status { location, .. }
            | ModelError::MalformedResponse { location, .. } => *location,
        }
    }
}

/// [Model] served by Ollama's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct Ollama {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl Ollama {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context(ClientSnafu)?;

        let endpoint = config.url.join("api/generate").context(EndpointSnafu {
            url: config.url.clone(),
        })?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn send_error(&self, source: reqwest::Error) -> ModelError {
        if source.is_timeout() {
            return TimeoutSnafu {
                timeout: self.timeout,
            }
            .build();
        }

        UnreachableSnafu {
            url: self.endpoint.clone(),
        }
        .into_error(source)
    }
}

impl Model for Ollama {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|source| self.send_error(source))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(ErrorResponse { error }) => error,
                Err(_) => body.chars().take(200).collect(),
            };

            return StatusSnafu { status, message }.fail();
        }

        let GenerateResponse { response } = response.json().await.map_err(|source| {
            if source.is_timeout() {
                self.send_error(source)
            } else {
                MalformedResponseSnafu.into_error(source)
            }
        })?;

        tracing::debug!(response_len = response.len(), "model finished generating");
        Ok(response)
    }
}
