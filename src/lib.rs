#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod geometry;
pub mod ir;
pub mod iterate;
pub mod layout;
pub mod parser;
pub mod render;
pub mod snapshot;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use error::EngineError;
