//! The collaborator interface a lowered machine runs against.

use thiserror::Error;
use ttcn_ast::ast::{Block, Expr};
use ttcn_lower::machine::{ControlOutcome, Operation, StatusCode};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    /// A blocking snapshot was requested but no further event can arrive.
    #[error("no further events can arrive after {snapshots} blocking snapshots")]
    Starved { snapshots: usize },
    #[error("altstep '{name}' failed: {message}")]
    Altstep { name: String, message: String },
    #[error("{0}")]
    Other(String),
}

/// Port, timer and component runtime seen by the driver.
///
/// Every call returns without blocking except `snapshot(true)`, the only
/// suspension point of a lowered machine.
pub trait AltEnvironment {
    /// Evaluate a boolean guard or branch condition.
    fn evaluate(&mut self, expr: &Expr) -> Result<bool, EnvironmentError>;

    /// Attempt a branch operation against the current snapshot.
    fn attempt(&mut self, op: &Operation) -> Result<StatusCode, EnvironmentError>;

    /// Freeze the pending events; `blocking` waits for at least one new one.
    fn snapshot(&mut self, blocking: bool) -> Result<(), EnvironmentError>;

    /// Consult the activated defaults of an else-less construct.
    fn try_defaults(&mut self) -> Result<StatusCode, EnvironmentError>;

    /// Execute plain sequential code.
    fn run(&mut self, code: &Block) -> Result<ControlOutcome, EnvironmentError>;
}

impl<E: AltEnvironment + ?Sized> AltEnvironment for &mut E {
    fn evaluate(&mut self, expr: &Expr) -> Result<bool, EnvironmentError> {
        (**self).evaluate(expr)
    }

    fn attempt(&mut self, op: &Operation) -> Result<StatusCode, EnvironmentError> {
        (**self).attempt(op)
    }

    fn snapshot(&mut self, blocking: bool) -> Result<(), EnvironmentError> {
        (**self).snapshot(blocking)
    }

    fn try_defaults(&mut self) -> Result<StatusCode, EnvironmentError> {
        (**self).try_defaults()
    }

    fn run(&mut self, code: &Block) -> Result<ControlOutcome, EnvironmentError> {
        (**self).run(code)
    }
}
