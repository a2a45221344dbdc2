//! The resumable transfer engine.
//!
//! [`plan::build_plan`] settles what to work on (the stored checkpoint, or a
//! fresh snapshot of the source account), then [`apply::run`] walks it in
//! order against the destination account.

pub mod apply;
pub mod enumerate;
pub mod plan;
pub mod progress;

#[cfg(test)]
pub(crate) mod mocks;

pub use apply::{ApplyOptions, RunOutcome, RunReport};
pub use plan::PlanOrigin;
