//! Planner, Plan Store, Merger and Dispatcher: the pieces that turn a goal
//! into a validated `TaskGraph`, execute it to completion, and synthesize a
//! final answer from the result.

pub mod dispatcher;
pub mod merger;
pub mod plan_store;
pub mod planner;
pub mod subprocess;
pub mod validator;

pub use dispatcher::{Dispatcher, DispatcherError, RetryPolicy};
pub use merger::{fallback_summary, Merger, MergerError};
pub use plan_store::{PlanStore, PlanStoreError};
pub use planner::{Planner, PlannerContext, PlannerError};
pub use subprocess::{SubprocessAdapter, SubprocessError, SubprocessOutcome};
pub use validator::{PlanValidator, ValidationIssue};
