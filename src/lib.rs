//! Second Guess: decision quality measurement service.
//!
//! A decision and its context run through a fixed sequence of evaluation
//! agents backed by a chat model; each evaluation is stored as an immutable,
//! versioned run that can be re-evaluated and compared.

pub mod agents;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;

pub use error::AppError;
