//! Bounded-concurrency task runner.
//!
//! Runs a list of async task factories with at most `limit` tasks in flight,
//! under one of two completion policies:
//!
//! - [`run_limited`] fails fast: the first failure stops scheduling and is
//!   returned; tasks already running are left to finish in the background.
//! - [`run_settled`] waits for every task and reports each outcome as a
//!   [`TaskResult`].
//!
//! Both preserve input order in their output regardless of completion order.

mod runner;

pub use runner::{BoxTask, TaskResult, run_limited, run_settled};
