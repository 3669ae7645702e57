// ABOUTME: Library root for deckhand - deployment orchestration across container platforms.
// ABOUTME: The CLI binary is in main.rs; everything it drives is exposed here.

pub mod cluster;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod platform;
pub mod runtime;
pub mod store;
pub mod types;
