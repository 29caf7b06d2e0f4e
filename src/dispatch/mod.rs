//! Job dispatch: queue consumption, worker selection and HTTP delivery.
//!
//! The dispatcher pops `job_queue`, leases each job to the least-loaded
//! available worker inside a single database transaction, and hands the
//! actual HTTP delivery to an independent task so a slow worker never
//! stalls the dispatch loop.

pub mod delivery;
pub mod dispatcher;

pub use dispatcher::run_dispatcher;
