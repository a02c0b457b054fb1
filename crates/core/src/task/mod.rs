//! Task module
//!
//! This module contains task-related types and storage.

mod memory_store;
mod model;
mod repository;
mod sqlite_store;

pub use memory_store::InMemoryTaskStore;
pub use model::*;
pub use repository::TaskRepository;
pub use sqlite_store::SqliteTaskStore;
