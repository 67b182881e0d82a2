//! Persistence for users, patients and their uploaded documents
//!
//! - SQLite for user and patient rows
//! - Plain files for uploaded motion-capture documents

pub mod sqlite;
pub mod files;

pub use sqlite::{SqliteStore, StoreStats, user_id_for};
pub use files::{DocumentStore, original_name, secure_filename};
