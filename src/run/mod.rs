//! Session/run layer
//!
//! A [`Tracker`] resolves project and experiment records and hands out
//! [`RunContext`]s. Each run owns its lineage graph exclusively and is passed
//! explicitly to every tracked call.

mod context;
mod tracker;

pub use context::{RunContext, SyncReport};
pub use tracker::Tracker;
