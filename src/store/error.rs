use std::time::Duration;

use snafu::{Location, Snafu};

use crate::Located;

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// SQLSTATE raised by PostgreSQL when `statement_timeout` cancels a statement.
pub(crate) const QUERY_CANCELED: &str = "57014";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatabaseError {
    #[snafu(display("cannot connect to the database at `{host}` at {location}: {source}"))]
    DatabaseConnection {
        host: String,
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to apply the schema migrations at {location}: {source}"))]
    Migration {
        source: sqlx::migrate::MigrateError,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueryError {
    #[snafu(display("could not lease a connection from the pool at {location}: {source}"))]
    Acquire {
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to execute the statement at {location}: {source}"))]
    Execute {
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("statement exceeded its {} budget at {location}", humantime::format_duration(*timeout)))]
    Timeout {
        timeout: Duration,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "expected one row with one column, got {} with {columns} column(s) at {location}",
        describe_rows(*rows)
    ))]
    UnexpectedShape {
        rows: usize,
        columns: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("cannot render a value of type `{type_name}` at {location}"))]
    UnsupportedType {
        type_name: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to decode the result at {location}: {source}"))]
    Decode {
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

fn describe_rows(rows: usize) -> String {
    match rows {
        0 => "no rows".to_string(),
        1 => "one row".to_string(),
        _ => "more than one row".to_string(),
    }
}

impl Located for DatabaseError {
    fn location(&self) -> Location {
        match self {
            DatabaseError::DatabaseConnection { location, .. }
            | DatabaseError::Migration { location, .. } => *location,
        }
    }
}

impl Located for QueryError {
    fn location(&self) -> Location {
        match self {
            QueryError::Acquire { location, .. }
            | QueryError::Execute { location, .. }
            | QueryError::Timeout { location, .. }
            | QueryError::UnexpectedShape { location, .. }
            | QueryError::UnsupportedType { location, .. }
            | QueryError::Decode { location, .. } => *location,
        }
    }
}
