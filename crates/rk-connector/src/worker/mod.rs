//! Background workers for tunnel opening

mod pool;

pub use pool::{JobId, JobOutcome, WorkerPool, DEFAULT_MAX_WORKERS};
