//! The question-to-answer pipeline.
//!
//! Every call to [Translator::translate] walks the same stages in order:
//! build the prompt, ask the model, extract a candidate, validate it, execute it and format the scalar. Any failure
//! ends the request; nothing is retried.

use std::fmt;

use derive_new::new;
use snafu::{Location, ResultExt as _, Snafu};
use tracing::instrument;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::llm::{Model, ModelError};
use crate::sanitize::{sanitize, SanitizeError};
use crate::store::{QueryError, Scalar, Store};
use crate::validate::{validate, Rejection, Validated};
use crate::{prompt, Located};

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;

/// Reply sent to the user for every failed request, whatever the cause.
pub const FAILURE_NOTICE: &str = "⚠️ Произошла ошибка при обработке запроса.\n\n\
    Возможные причины:\n\
    • Некорректный формат запроса\n\
    • Ошибка в работе с базой данных\n\
    • Проблема с API анализатора\n\n\
    Попробуйте переформулировать вопрос или используйте /help для примеров.";

/// Position of a request in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Received,
    PromptBuilt,
    ModelInvoked,
    Sanitized,
    Validated,
    Executed,
    Formatted,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::PromptBuilt => "prompt_built",
            Stage::ModelInvoked => "model_invoked",
            Stage::Sanitized => "sanitized",
            Stage::Validated => "validated",
            Stage::Executed => "executed",
            Stage::Formatted => "formatted",
            Stage::Done => "done",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TranslateError {
    #[snafu(display("the model could not produce a response at {location}: {source}"))]
    ModelUnavailable {
        source: ModelError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("no SQL statement in the model response at {location}: {source}"))]
    NoSqlCandidate {
        response: String,
        source: SanitizeError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("`{sql}` was rejected at {location}: {source}"))]
    RejectedByValidator {
        sql: String,
        source: Rejection,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("`{sql}` failed at {location}: {source}"))]
    Query {
        sql: String,
        source: QueryError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl TranslateError {
    /// The stage the request was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            TranslateError::ModelUnavailable { .. } => Stage::ModelInvoked,
            TranslateError::NoSqlCandidate { .. } => Stage::Sanitized,
            TranslateError::RejectedByValidator { .. } => Stage::Validated,
            TranslateError::Query { .. } => Stage::Executed,
        }
    }

    /// The statement involved in the failure, when one was extracted.
    pub fn sql(&self) -> Option<&str> {
        match self {
            TranslateError::RejectedByValidator { sql, .. } | TranslateError::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The text shown to the user. It never carries diagnostic detail.
    pub fn user_message(&self) -> &'static str {
        FAILURE_NOTICE
    }
}

impl Located for TranslateError {
    fn location(&self) -> Location {
        match self {
            TranslateError::ModelUnavailable { location, .. }
            | TranslateError::NoSqlCandidate { location, .. }
            | TranslateError::RejectedByValidator { location, .. }
            | TranslateError::Query { location, .. } => *location,
        }
    }
}

/// The outcome of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub request_id: Uuid,
    pub sql: Validated,
    pub value: Scalar,
    /// The value as shown to the user.
    pub text: String,
}

/// Turns questions into answers.
///
/// Holds no per-request state, so one instance can serve any number of concurrent requests.
#[derive(Debug, new)]
pub struct Translator<M, S> {
    catalog: Catalog,
    model: M,
    store: S,
}

impl<M, S> Translator<M, S>
where
    M: Model + Sync,
    S: Store + Sync,
{
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn translate(&self, question: &str) -> Result<Answer> {
        let request_id = Uuid::new_v4();

        let result = self.run(request_id, question).await;
        if let Err(error) = &result {
            tracing::warn!(
                %request_id,
                stage = %error.stage(),
                sql = error.sql(),
                location = %error.location(),
                %error,
                "request failed"
            );
        }

        result
    }

    #[instrument(name = "translate", skip(self))]
    async fn run(&self, request_id: Uuid, question: &str) -> Result<Answer> {
        tracing::info!(stage = %Stage::Received, "received a question");

        let prompt = prompt::build(&self.catalog, self.catalog.examples, question);
        tracing::debug!(stage = %Stage::PromptBuilt, prompt_len = prompt.len());

        let response = self.model.generate(&prompt).await.context(ModelUnavailableSnafu)?;
        tracing::info!(stage = %Stage::ModelInvoked, response = %response);

        let candidate = sanitize(&response).context(NoSqlCandidateSnafu {
            response: response.clone(),
        })?;
        tracing::debug!(stage = %Stage::Sanitized, sql = %candidate);

        let sql = validate(&candidate, &self.catalog).context(RejectedByValidatorSnafu {
            sql: candidate.as_str(),
        })?;
        tracing::info!(stage = %Stage::Validated, sql = %sql);

        let value = self.store.execute(&sql).await.context(QuerySnafu { sql: sql.as_str() })?;
        tracing::debug!(stage = %Stage::Executed, value = ?value);

        let text = format(&value);
        tracing::debug!(stage = %Stage::Formatted, answer = %text);

        tracing::info!(stage = %Stage::Done, answer = %text, "answered");

        Ok(Answer {
            request_id,
            sql,
            value,
            text,
        })
    }
}

/// Render a scalar for the user. An empty aggregate (`NULL`) counts as zero.
pub fn format(value: &Scalar) -> String {
    match value {
        Scalar::Null => "0".to_string(),
        value => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::catalog::VIDEO_STATS;
    use crate::testing::{Outcome, Script, ScriptedModel, StubStore};

    fn translator(script: Script, outcome: Outcome) -> Translator<ScriptedModel, StubStore> {
        Translator::new(VIDEO_STATS, ScriptedModel::new(script), StubStore::new(outcome))
    }

    #[tokio::test]
    async fn total_video_count() {
        let translator = translator(
            Script::Reply("SELECT COUNT(*) FROM videos;"),
            Outcome::Value(Scalar::Integer(358)),
        );

        let answer = translator.translate("Сколько всего видео есть в системе?").await.unwrap();

        assert_eq!(answer.text, "358");
        assert_eq!(answer.sql.as_str(), "SELECT COUNT(*) FROM videos;");
        assert_eq!(translator.store.executed(), ["SELECT COUNT(*) FROM videos;"]);
    }

    #[tokio::test]
    async fn creator_without_videos_is_zero() {
        let translator = translator(
            Script::Reply("```sql\nSELECT COUNT(*) FROM videos WHERE creator_id = 'abc123';\n```"),
            Outcome::Value(Scalar::Integer(0)),
        );

        let answer = translator.translate("Сколько видео у креатора с id abc123?").await.unwrap();

        assert_eq!(answer.text, "0");
        assert!(translator.store.executed()[0].contains("creator_id = 'abc123'"));
    }

    #[tokio::test]
    async fn unrelated_question_never_reaches_the_store() {
        let translator = translator(
            Script::Reply("Колобок повесился. Это был анекдот."),
            Outcome::Value(Scalar::Integer(1)),
        );

        let error = translator.translate("расскажи анекдот").await.unwrap_err();

        assert!(matches!(error, TranslateError::NoSqlCandidate { .. }), "{error}");
        assert_eq!(error.stage(), Stage::Sanitized);
        assert_eq!(error.user_message(), FAILURE_NOTICE);
        assert!(translator.store.executed().is_empty());
    }

    #[tokio::test]
    async fn question_is_part_of_the_prompt() {
        let translator = translator(Script::Reply("SELECT 1"), Outcome::Value(Scalar::Integer(1)));
        translator.translate("Сколько видео набрало больше 100000 просмотров?").await.unwrap();

        let prompts = translator.model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Сколько видео набрало больше 100000 просмотров?"));
        assert!(prompts[0].contains("video_snapshots"));
    }

    #[tokio::test]
    async fn model_failure_is_reported_generically() {
        let translator = translator(Script::Fail, Outcome::Value(Scalar::Integer(1)));

        let error = translator.translate("Сколько всего видео?").await.unwrap_err();

        assert!(matches!(error, TranslateError::ModelUnavailable { .. }), "{error}");
        assert_eq!(error.stage(), Stage::ModelInvoked);
        assert_eq!(error.user_message(), FAILURE_NOTICE);
        assert!(translator.store.executed().is_empty());
    }

    #[tokio::test]
    async fn rejected_statement_is_not_executed() {
        let translator = translator(
            Script::Reply("DELETE FROM videos;"),
            Outcome::Value(Scalar::Integer(1)),
        );

        let error = translator.translate("Удали все видео").await.unwrap_err();

        match &error {
            TranslateError::RejectedByValidator { sql, source, .. } => {
                assert_eq!(sql, "DELETE FROM videos;");
                assert_eq!(source.code(), "not_select");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(error.sql(), Some("DELETE FROM videos;"));
        assert!(!error.user_message().contains("DELETE"));
        assert!(translator.store.executed().is_empty());
    }

    #[tokio::test]
    async fn injected_statement_only_runs_the_read() {
        let translator = translator(
            Script::Reply("SELECT COUNT(*) FROM videos; DROP TABLE videos;"),
            Outcome::Value(Scalar::Integer(5)),
        );

        let answer = translator.translate("Сколько всего видео?").await.unwrap();

        assert_eq!(answer.text, "5");
        assert_eq!(translator.store.executed(), ["SELECT COUNT(*) FROM videos;"]);
    }

    #[tokio::test]
    async fn unknown_table_is_rejected() {
        let translator = translator(
            Script::Reply("SELECT COUNT(*) FROM users"),
            Outcome::Value(Scalar::Integer(1)),
        );

        let error = translator.translate("Сколько пользователей?").await.unwrap_err();

        assert_eq!(error.stage(), Stage::Validated);
        assert!(translator.store.executed().is_empty());
    }

    #[tokio::test]
    async fn query_failures_carry_the_statement_and_release_the_lease() {
        for outcome in [Outcome::NoRows, Outcome::Timeout] {
            let translator = translator(
                Script::Reply("SELECT views_count FROM videos WHERE creator_id = 'nobody'"),
                outcome,
            );

            let error = translator.translate("Сколько просмотров у nobody?").await.unwrap_err();

            assert!(matches!(error, TranslateError::Query { .. }), "{error}");
            assert_eq!(error.stage(), Stage::Executed);
            assert_eq!(
                error.sql(),
                Some("SELECT views_count FROM videos WHERE creator_id = 'nobody'")
            );
            assert!(translator.store.is_released());
        }
    }

    #[tokio::test]
    async fn cancelled_request_releases_the_lease() {
        let translator = translator(
            Script::Reply("SELECT COUNT(*) FROM video_snapshots"),
            Outcome::Hang,
        );

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), translator.translate("Сколько замеров?")).await;

        assert!(cancelled.is_err());
        assert_eq!(translator.store.executed().len(), 1);
        assert!(translator.store.is_released());
    }

    #[tokio::test]
    async fn cancelled_model_call_never_reaches_the_store() {
        let translator = translator(Script::Hang, Outcome::Value(Scalar::Integer(1)));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), translator.translate("Сколько видео?")).await;

        assert!(cancelled.is_err());
        assert!(translator.store.executed().is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let translator = Arc::new(translator(
            Script::Reply("SELECT COUNT(*) FROM videos"),
            Outcome::Value(Scalar::Integer(7)),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let translator = Arc::clone(&translator);
                tokio::spawn(async move { translator.translate("Сколько всего видео?").await })
            })
            .collect();

        let mut request_ids = Vec::new();
        for task in tasks {
            let answer = task.await.unwrap().unwrap();
            assert_eq!(answer.text, "7");
            request_ids.push(answer.request_id);
        }

        request_ids.sort();
        request_ids.dedup();
        assert_eq!(request_ids.len(), 8);
        assert!(translator.store.is_released());
    }

    #[test]
    fn null_is_zero() {
        assert_eq!(format(&Scalar::Null), "0");
        assert_eq!(format(&Scalar::Integer(42)), "42");
        assert_eq!(format(&Scalar::Text("abc123".to_string())), "abc123");
    }
}
