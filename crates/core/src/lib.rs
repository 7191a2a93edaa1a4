//! Core library: signals, stores and the decision engine that turns them into a
//! category and destination for every file.

mod bounded;
pub mod cache;
pub mod categories;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod extractor;
pub mod memory;
pub mod models;
pub mod naming;
pub mod pipeline;
pub mod rules;
pub mod scanner;
pub mod series;
pub mod suggester;
pub mod timing;

pub use bounded::BoundedLog;
pub use engine::{DecisionEngine, EngineSettings, FolderHint, Stores};
