//! Result reconciliation: consuming worker reports and advancing each job
//! to its terminal state or another retry, plus dead-letter parking.

pub mod dlq;
pub mod reconciler;

pub use dlq::run_dlq_consumer;
pub use reconciler::run_reconciler;
