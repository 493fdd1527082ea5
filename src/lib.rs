pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod logger;
pub mod model;
pub mod prompt;
pub mod sanitize;
pub mod store;
pub mod translator;
pub mod validate;

#[cfg(test)]
mod testing;

pub trait Located {
    fn location(&self) -> snafu::Location;
}
