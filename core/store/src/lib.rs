//! Note store abstraction for decksync.
//!
//! This module provides a trait-based interface to the remote flashcard
//! store, an AnkiConnect implementation of its wire protocol and an
//! in-memory store for tests and dry runs.
//!
//! # Design Principles
//! - One client behind one capability set, no per-content-type variants
//! - Transport failures and protocol rejections are distinct errors
//! - A duplicate rejection is an outcome, not an error

pub mod ankiconnect;
pub mod memory;
pub mod query;
pub mod store;

pub use ankiconnect::{
    AnkiConnectConfig, AnkiConnectStore, DEFAULT_ENDPOINT, DEFAULT_NOTE_MODEL, PROTOCOL_VERSION,
};
pub use memory::{MemoryStore, StoredEntry};
pub use query::EntryQuery;
pub use store::{CreateOutcome, NoteFields, NoteStore};
