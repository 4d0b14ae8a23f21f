//! Request orchestration core for the lumen OCR/AI assistant: a priority
//! task scheduler, a multi-provider fallback/retry/merge orchestrator and a
//! cached connectivity gate.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod provider;
pub mod routing;
pub mod scheduler;
