//! Alert evaluation for log rules.
//!
//! [`engine::AlertEvaluator`] scores every enabled rule against the
//! aggregate of its trailing window and drives the alert lifecycle:
//! raise when the value reaches the threshold, resolve when it drops back.
//! [`scheduler::EvaluationScheduler`] runs the evaluator on a fixed
//! interval, one cycle at a time.

pub mod engine;
pub mod error;
pub mod scheduler;


pub use engine::{AlertEvaluator, CycleReport, RuleOutcome};
pub use error::EvalError;
pub use scheduler::EvaluationScheduler;
