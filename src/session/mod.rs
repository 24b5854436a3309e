//! Conversation state and session management.
//!
//! This module provides the transcript controller and the in-memory session
//! storage the server keeps one controller per browser conversation in.
//!
//! # Architecture
//!
//! - [`Transcript`] / [`Turn`]: the ordered conversation
//! - [`TranscriptController`]: single-writer owner of a transcript, its
//!   loading flag and its error
//! - [`Session`]: shared handle that drives generation streams into a
//!   controller
//! - [`SessionStore`]: thread-safe store for all active sessions
//!
//! # Example
//!
//! ```rust
//! use flashchat::session::TranscriptController;
//!
//! let mut controller = TranscriptController::new();
//! let request = controller.submit_user_text("Hi").unwrap();
//! controller.on_fragment(request.placeholder_id, "He");
//! controller.on_fragment(request.placeholder_id, "llo");
//! controller.on_stream_complete(request.generation);
//!
//! let snapshot = controller.snapshot();
//! assert_eq!(snapshot.turns[1].content(), "Hello");
//! assert!(!snapshot.loading);
//! ```

mod controller;
mod thread;
mod transcript;

pub use controller::{
    GENERATION_FAILED_MESSAGE, GenerationRequest, TranscriptController, TranscriptSnapshot,
};
pub use thread::{Session, SessionStore};
pub use transcript::{Role, Transcript, Turn, TurnId};
