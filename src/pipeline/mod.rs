// Refinement pipeline: processing stages and durable storage

pub mod processing;
pub mod refine;
pub mod storage;

pub use refine::{BatchOutcome, RecordFailure, Refiner};
