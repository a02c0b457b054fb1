//! Core library for Taskhub
//!
//! This crate contains the core business logic, including:
//! - Task model and validation
//! - Task storage (SQLite and in-memory)
//! - Concurrent batch processing

pub mod batch;
pub mod db;
pub mod error;
pub mod task;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
