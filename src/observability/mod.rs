//! Evaluation tracing to Langfuse.
//!
//! Process logs go through `tracing`; this module additionally ships one
//! Langfuse trace per evaluation when credentials are configured.

mod langfuse;

pub use langfuse::{Langfuse, LangfuseError, Trace};

#[cfg(test)]
pub(crate) use langfuse::testing;
