use std::net::SocketAddr;

use snafu::{Location, Snafu};

use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::llm::ModelError;
use crate::store::DatabaseError;
use crate::Located;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApplicationError {
    /// Could not read the configuration from the environment
    ConfigLoad {
        source: ConfigError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not connect to the database
    ConnectDatabase {
        source: DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not bring the schema up to date
    Migrate {
        source: DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not set up the model client
    ModelClient {
        source: ModelError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not load the dataset into the database
    LoadDataset {
        source: DatasetError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not serve the application
    WebServer {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not bind to the given address, check if it's already in use
    BindAddress {
        address: SocketAddr,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not initialize the logger
    InitializeLogger {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for ApplicationError {
    fn location(&self) -> Location {
        match self {
            ApplicationError::ConfigLoad { location, .. }
            | ApplicationError::ConnectDatabase { location, .. }
            | ApplicationError::Migrate { location, .. }
            | ApplicationError::ModelClient { location, .. }
            | ApplicationError::LoadDataset { location, .. }
            | ApplicationError::WebServer { location, .. }
            | ApplicationError::BindAddress { location, .. }
            | ApplicationError::InitializeLogger { location, .. } => *location,
        }
    }
}
