#![deny(missing_docs)]

//! Core library for the mediarelay upload and voice server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Per-MIME text extraction.
pub mod extraction;
/// Language-model provider clients and selection.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Batch upload and voice session pipelines.
pub mod pipeline;
/// Conversation sessions and their stores.
pub mod session;
/// Speech transcription client.
pub mod transcription;
