pub mod callback;
pub mod engine;
pub mod performance;
pub mod streaming;
