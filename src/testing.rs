//! Deterministic stand-ins for the model and the store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::llm::{self, Model, TimeoutSnafu as ModelTimeoutSnafu};
use crate::store::{self, Scalar, Store, TimeoutSnafu as QueryTimeoutSnafu, UnexpectedShapeSnafu};
use crate::validate::Validated;

pub(crate) enum Script {
    Reply(&'static str),
    Fail,
    Hang,
}

/// Model that answers every prompt the same way and remembers what it was asked.
pub(crate) struct ScriptedModel {
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Model for ScriptedModel {
    async fn generate(&self, prompt: &str) -> llm::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        match self.script {
            Script::Reply(text) => Ok(text.to_string()),
            Script::Fail => ModelTimeoutSnafu {
                timeout: Duration::from_secs(60),
            }
            .fail(),
            Script::Hang => std::future::pending().await,
        }
    }
}

pub(crate) enum Outcome {
    Value(Scalar),
    NoRows,
    Timeout,
    Hang,
}

/// Store with a single pooled connection, leased for the duration of each call.
pub(crate) struct StubStore {
    outcome: Outcome,
    lease: Arc<Semaphore>,
    executed: Mutex<Vec<String>>,
}

impl StubStore {
    pub(crate) fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            lease: Arc::new(Semaphore::new(1)),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub(crate) fn is_released(&self) -> bool {
        self.lease.available_permits() == 1
    }
}

impl Store for StubStore {
    async fn execute(&self, sql: &Validated) -> store::Result<Scalar> {
        let _lease = self.lease.acquire().await.unwrap();
        self.executed.lock().unwrap().push(sql.to_string());

        match &self.outcome {
            Outcome::Value(value) => Ok(value.clone()),
            Outcome::NoRows => UnexpectedShapeSnafu {
                rows: 0_usize,
                columns: 1_usize,
            }
            .fail(),
            Outcome::Timeout => QueryTimeoutSnafu {
                timeout: Duration::from_secs(10),
            }
            .fail(),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
