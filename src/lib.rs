//! medquery - medical question answering gateway
//!
//! Sends a question to a chat model, a research-search model and a web
//! search API at the same time, then merges whatever comes back into one
//! labelled answer with a disclaimer and a list of sources.

pub mod ai;
pub mod answer;
pub mod cli;
pub mod core;
pub mod limit;
pub mod web;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
