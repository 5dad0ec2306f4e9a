//! Solace Storage crate - SQLite persistence for conversation transcripts.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! `TranscriptStore` collaborator used by the conversation engine, with a
//! SQLite-backed and an in-memory implementation.

pub mod db;
pub mod migrations;
pub mod transcript;

pub use db::Database;
pub use transcript::{MemoryTranscriptStore, SqliteTranscriptStore, TranscriptStore};
