//! Run session: snapshot file lifecycle around a classification run.

pub mod manager;

pub use manager::{RunInputs, RunSession};
