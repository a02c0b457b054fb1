//! Batch processing
//!
//! Concurrent fan-out that marks a set of tasks completed.

mod coordinator;
mod work;

pub use coordinator::{BatchConfig, BatchCoordinator, BatchFailure, BatchReport, UnitFailure};
pub use work::{SimulatedWork, UnitWork, PROCESSING_DELAY};
