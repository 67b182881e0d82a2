//! Datai - Patient Movement Analysis Library
//!
//! Clinicians upload motion-capture CSV/Excel files holding joint-angle time
//! series. This crate provides:
//! - SQLite persistence for users and patient records
//! - Upload storage on the local filesystem
//! - Column detection, numeric coercion, statistics and chart data for goniometry files
//! - A TF-IDF intent classifier that answers questions about a loaded dataset
//! - An axum HTTP API with JWT authentication
//!
//! # Example
//!
//! ```ignore
//! use datai::analysis::{NumberFormat, load_dataset_from_path};
//! use datai::chatbot::ChatBot;
//! use datai::config::AnalysisConfig;
//!
//! let settings = AnalysisConfig::default();
//! let dataset = load_dataset_from_path("walk.csv".as_ref(), NumberFormat::DecimalComma, &settings)?;
//! let bot = ChatBot::new(0.2);
//! let reply = bot.respond("what is the max knee angle?", Some(&dataset));
//! println!("{}", reply.answer);
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod patient;
pub mod storage;
pub mod analysis;
pub mod chatbot;
pub mod server;
pub mod cli;

pub use analysis::{AnalysisReport, AngleStats, ChartFigure, Dataset, NumberFormat};
pub use chatbot::{BotReply, ChatBot, Intent};
pub use config::Config;
pub use error::{AnalysisError, ApiError, StorageError};
pub use patient::{NewPatient, PatientRecord, Sex, UserRecord};
pub use storage::{DocumentStore, SqliteStore};
pub use server::{AppState, build_router, start as start_server};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Patient Movement Analysis", NAME, VERSION)
}
