//! Altstep table and default registry on top of another collaborator.
//!
//! Branches that reference an altstep by name, and activated defaults,
//! execute the altstep's compiled machine against the same collaborator
//! and snapshot. Everything else is forwarded to the wrapped environment.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};
use ttcn_ast::ast::{Block, Expr};
use ttcn_lower::machine::{ControlOutcome, MachineKind, Operation, StateMachine, StatusCode};

use crate::driver::{execute, Completion, DriverLimits};
use crate::env::{AltEnvironment, EnvironmentError};

#[derive(Debug, Clone)]
pub struct AltstepEnvironment<E> {
    inner: E,
    altsteps: IndexMap<String, Rc<StateMachine>>,
    /// Activated defaults, oldest first.
    defaults: Vec<String>,
    limits: DriverLimits,
}

impl<E: AltEnvironment> AltstepEnvironment<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            altsteps: IndexMap::new(),
            defaults: Vec::new(),
            limits: DriverLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DriverLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register a compiled altstep under its name.
    pub fn register(&mut self, machine: StateMachine) -> Result<(), EnvironmentError> {
        if machine.kind != MachineKind::Altstep {
            return Err(EnvironmentError::Other(format!(
                "'{}' is not a compiled altstep",
                machine.name
            )));
        }
        self.altsteps.insert(machine.name.clone(), Rc::new(machine));
        Ok(())
    }

    /// Activate a registered altstep as a default.
    pub fn activate(&mut self, name: &str) -> Result<(), EnvironmentError> {
        if !self.altsteps.contains_key(name) {
            return Err(EnvironmentError::Other(format!(
                "cannot activate unknown altstep '{name}'"
            )));
        }
        self.defaults.push(name.to_string());
        Ok(())
    }

    /// Deactivate the most recent activation of `name`.
    pub fn deactivate(&mut self, name: &str) -> bool {
        match self.defaults.iter().rposition(|d| d == name) {
            Some(i) => {
                self.defaults.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn active_defaults(&self) -> &[String] {
        &self.defaults
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    fn run_altstep(&mut self, name: &str) -> Result<Option<StatusCode>, EnvironmentError> {
        let Some(machine) = self.altsteps.get(name).cloned() else {
            return Ok(None);
        };
        let limits = self.limits;
        let completion =
            execute(&machine, self, &limits).map_err(|err| EnvironmentError::Altstep {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        let status = match completion {
            Completion::Status(status) => status,
            Completion::Finished | Completion::Returned => StatusCode::Yes,
        };
        debug!(altstep = name, %status, "altstep finished");
        Ok(Some(status))
    }
}

impl<E: AltEnvironment> AltEnvironment for AltstepEnvironment<E> {
    fn evaluate(&mut self, expr: &Expr) -> Result<bool, EnvironmentError> {
        self.inner.evaluate(expr)
    }

    fn attempt(&mut self, op: &Operation) -> Result<StatusCode, EnvironmentError> {
        let name = match op {
            Operation::AltstepInstance(r) => r.name.as_str(),
            Operation::AltstepInvocation(e) => e.text.as_str(),
            Operation::Receiving(_) => return self.inner.attempt(op),
        };
        match self.run_altstep(name)? {
            Some(status) => Ok(status),
            None => self.inner.attempt(op),
        }
    }

    fn snapshot(&mut self, blocking: bool) -> Result<(), EnvironmentError> {
        self.inner.snapshot(blocking)
    }

    /// Try the activated defaults, most recent first. The first YES, REPEAT
    /// or BREAK decides; otherwise MAYBE if any default may still match.
    fn try_defaults(&mut self) -> Result<StatusCode, EnvironmentError> {
        let mut result = StatusCode::No;
        for name in self.defaults.clone().iter().rev() {
            match self.run_altstep(name)? {
                Some(status @ (StatusCode::Yes | StatusCode::Repeat | StatusCode::Break)) => {
                    return Ok(status)
                }
                Some(StatusCode::Maybe) => result = StatusCode::Maybe,
                Some(_) => {}
                None => warn!(altstep = %name, "activated default is not registered"),
            }
        }
        Ok(result)
    }

    fn run(&mut self, code: &Block) -> Result<ControlOutcome, EnvironmentError> {
        self.inner.run(code)
    }
}
