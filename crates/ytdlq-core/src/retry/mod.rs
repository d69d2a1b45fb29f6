//! Backoff policy for transient store failures.
//!
//! The dispatcher uses it when polling fails so a broken database does not
//! turn into a tight error loop, and gives up once the consecutive-failure
//! budget is spent.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
