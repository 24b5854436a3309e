//! FlashChat
//!
//! A single-page chat client that sends the running conversation to a
//! generative text service and shows the reply incrementally as it streams.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server; transcript changes are pushed over SSE
//! - **Transcript Controller**: owns the turn list, loading flag and error
//! - **Generation Client**: turns a prompt into a stream of text fragments
//! - **UI**: a static page that mirrors the server-side transcript
//!
//! # Modules
//!
//! - [`config`]: layered configuration (defaults, file, env, CLI)
//! - [`llm`]: generation client trait and provider drivers
//! - [`normalized`]: transcript change events sent to the browser
//! - [`session`]: transcript controller and session management

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod llm;
pub mod normalized;
pub mod server;
pub mod session;
pub mod ui;

use crate::config::AppConfig;

use llm::GenerationClient;
use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session store for conversation management.
    pub sessions: SessionStore,
    /// Generation client every session streams from.
    pub client: Arc<dyn GenerationClient>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            sessions: SessionStore::new(),
            client,
            config,
        }
    }
}
