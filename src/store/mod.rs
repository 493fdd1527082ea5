//! Read-only execution of validated statements against the analytics store.

use std::future::Future;

pub use error::*;
pub use postgres::*;
pub use scalar::*;

use crate::validate::Validated;

mod error;
mod postgres;
mod scalar;

/// Executes a validated statement and returns its single scalar value.
pub trait Store {
    /// Run the statement in a read-only context.
    ///
    /// The result must be exactly one row with one column, anything else is a [QueryError::UnexpectedShape].
    fn execute(&self, sql: &Validated) -> impl Future<Output = Result<Scalar>> + Send;
}

/// Represents a type that can be used to establish a connection to a database.
pub trait Connection {
    /// The type of the connected database.
    type Database;

    /// Establishes a connection to the database.
    fn connect(&self) -> impl Future<Output = Result<Self::Database, DatabaseError>> + Send;
}

/// Check that a result set holds exactly one row with exactly one column.
pub(crate) fn check_shape(rows: usize, columns: usize) -> Result<()> {
    if rows == 1 && columns == 1 {
        return Ok(());
    }

    UnexpectedShapeSnafu { rows, columns }.fail()
}

/// Rows and columns to report for a result whose first row has `first_row_columns` columns.
///
/// Without a row the column count is unknown, so an empty result is reported with the single column a scalar
/// query asks for.
pub(crate) fn observed_shape(first_row_columns: Option<usize>, more_rows: bool) -> (usize, usize) {
    match first_row_columns {
        Some(columns) => (1 + usize::from(more_rows), columns),
        None => (0, 1),
    }
}
