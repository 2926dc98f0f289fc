//! Interpreter for lowered state machines.
//!
//! The driver walks the block table from the entry label. Status slots
//! start UNCHECKED and state variables start at 0 for every execution, so
//! one call to [`execute`] is one activation of the compiled function,
//! altstep or construct.

use thiserror::Error;
use tracing::{trace, warn};
use ttcn_ast::ast::Span;
use ttcn_lower::machine::{
    ControlOutcome, ControlTargets, GuardCond, Instr, Label, MachineKind, StateMachine,
    StatusCode, Terminator,
};

use crate::env::{AltEnvironment, EnvironmentError};

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Control ran off the end of the machine.
    Finished,
    /// A `return` left the machine.
    Returned,
    /// An altstep body finished with this status.
    Status(StatusCode),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// Every branch and the default registry are permanently NO.
    #[error("no branch can ever match in the construct at {span}")]
    NoBranchCanMatch { span: Span },
    #[error("'{machine}' exceeded the limit of {limit} steps")]
    StepLimitExceeded { machine: String, limit: usize },
    #[error("'{machine}': {outcome:?} at {label} has no target")]
    UnhandledOutcome {
        machine: String,
        label: Label,
        outcome: ControlOutcome,
    },
    #[error("malformed machine '{machine}': {message}")]
    Malformed { machine: String, message: String },
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

/// Bounds on one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverLimits {
    /// Maximum number of blocks entered.
    pub max_steps: usize,
}

impl DriverLimits {
    pub fn with_max_steps(max_steps: usize) -> Self {
        Self { max_steps }
    }

    pub fn unbounded() -> Self {
        Self {
            max_steps: usize::MAX,
        }
    }
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self::with_max_steps(1_000_000)
    }
}

/// Run one activation of `machine` against `env`.
pub fn execute<E: AltEnvironment + ?Sized>(
    machine: &StateMachine,
    env: &mut E,
    limits: &DriverLimits,
) -> Result<Completion, RuntimeError> {
    let mut exec = Execution {
        machine,
        slots: vec![StatusCode::Unchecked; machine.num_slots as usize],
        vars: vec![0; machine.num_state_vars as usize],
    };
    exec.run(env, limits)
}

struct Execution<'m> {
    machine: &'m StateMachine,
    slots: Vec<StatusCode>,
    vars: Vec<u32>,
}

impl<'m> Execution<'m> {
    fn malformed(&self, message: String) -> RuntimeError {
        RuntimeError::Malformed {
            machine: self.machine.name.clone(),
            message,
        }
    }

    fn slot(&self, index: u32) -> Result<StatusCode, RuntimeError> {
        self.slots
            .get(index as usize)
            .copied()
            .ok_or_else(|| self.malformed(format!("status slot f{index} out of range")))
    }

    fn set_slot(&mut self, index: u32, status: StatusCode) -> Result<(), RuntimeError> {
        match self.slots.get_mut(index as usize) {
            Some(s) => {
                *s = status;
                Ok(())
            }
            None => Err(self.malformed(format!("status slot f{index} out of range"))),
        }
    }

    fn var(&self, index: u32) -> Result<u32, RuntimeError> {
        self.vars
            .get(index as usize)
            .copied()
            .ok_or_else(|| self.malformed(format!("state variable s{index} out of range")))
    }

    fn phases_hold(&self, guard: &GuardCond) -> Result<bool, RuntimeError> {
        for test in &guard.phases {
            if self.var(test.var.0)? != test.value {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run<E: AltEnvironment + ?Sized>(
        &mut self,
        env: &mut E,
        limits: &DriverLimits,
    ) -> Result<Completion, RuntimeError> {
        let mut label = self.machine.entry;
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > limits.max_steps {
                return Err(RuntimeError::StepLimitExceeded {
                    machine: self.machine.name.clone(),
                    limit: limits.max_steps,
                });
            }
            let block = self
                .machine
                .block(label)
                .ok_or_else(|| self.malformed(format!("jump to undefined {label}")))?;
            trace!(machine = %self.machine.name, %label, "enter block");
            for instr in &block.instrs {
                self.step(instr, env)?;
            }
            label = match self.transfer(label, &block.terminator, env)? {
                Next::Jump(next) => next,
                Next::Done(completion) => {
                    trace!(machine = %self.machine.name, ?completion, "execution complete");
                    return Ok(completion);
                }
            };
        }
    }

    fn step<E: AltEnvironment + ?Sized>(
        &mut self,
        instr: &Instr,
        env: &mut E,
    ) -> Result<(), RuntimeError> {
        match instr {
            Instr::SetStatus { slot, status } => self.set_slot(slot.0, *status)?,
            Instr::EvalGuard { slot, guard } => {
                let holds = self.phases_hold(guard)?
                    && match &guard.expr {
                        Some(expr) => env.evaluate(expr)?,
                        None => true,
                    };
                let status = if holds {
                    StatusCode::Maybe
                } else {
                    StatusCode::No
                };
                self.set_slot(slot.0, status)?;
            }
            Instr::Attempt { slot, op } => {
                let mut status = env.attempt(op)?;
                if status == StatusCode::Unchecked {
                    warn!(%op, "attempt reported UNCHECKED, treating it as MAYBE");
                    status = StatusCode::Maybe;
                }
                trace!(%op, %status, "attempted");
                self.set_slot(slot.0, status)?;
            }
            Instr::TryDefaults { slot } => {
                let mut status = env.try_defaults()?;
                if status == StatusCode::Unchecked {
                    warn!("defaults reported UNCHECKED, treating it as MAYBE");
                    status = StatusCode::Maybe;
                }
                trace!(%status, "consulted defaults");
                self.set_slot(slot.0, status)?;
            }
            Instr::Snapshot { blocking } => {
                trace!(blocking, "snapshot");
                env.snapshot(*blocking)?;
            }
            Instr::SetState { var, value } => match self.vars.get_mut(var.0 as usize) {
                Some(v) => *v = *value,
                None => return Err(self.malformed(format!("state variable {var} out of range"))),
            },
        }
        Ok(())
    }

    fn transfer<E: AltEnvironment + ?Sized>(
        &mut self,
        from: Label,
        terminator: &Terminator,
        env: &mut E,
    ) -> Result<Next, RuntimeError> {
        let next = match terminator {
            Terminator::Goto(l) => *l,
            Terminator::Branch { cond, then, else_ } => {
                if env.evaluate(cond)? {
                    *then
                } else {
                    *else_
                }
            }
            Terminator::IfStatus {
                slot,
                status,
                then,
                else_,
            } => {
                if self.slot(slot.0)? == *status {
                    *then
                } else {
                    *else_
                }
            }
            Terminator::Dispatch {
                slot,
                on_yes,
                on_repeat,
                on_break,
                otherwise,
            } => match self.slot(slot.0)? {
                StatusCode::Yes => *on_yes,
                StatusCode::Repeat => on_repeat.unwrap_or_else(|| {
                    warn!(%slot, "REPEAT from an operation that cannot repeat, ignored");
                    *otherwise
                }),
                StatusCode::Break => on_break.unwrap_or_else(|| {
                    warn!(%slot, "BREAK from a non-altstep operation, ignored");
                    *otherwise
                }),
                _ => *otherwise,
            },
            Terminator::IfAllNo { slots, then, else_ } => {
                let mut all_no = true;
                for slot in slots {
                    if self.slot(slot.0)? != StatusCode::No {
                        all_no = false;
                        break;
                    }
                }
                if all_no {
                    *then
                } else {
                    *else_
                }
            }
            Terminator::IfStates { tests, then, else_ } => {
                let mut holds = true;
                for test in tests {
                    if self.var(test.var.0)? != test.value {
                        holds = false;
                        break;
                    }
                }
                if holds {
                    *then
                } else {
                    *else_
                }
            }
            Terminator::Run {
                code,
                next,
                targets,
            } => {
                let outcome = env.run(code)?;
                trace!(%code, ?outcome, "ran");
                return self.route_outcome(from, outcome, *next, targets);
            }
            Terminator::NoMatch { span } => {
                return Err(RuntimeError::NoBranchCanMatch { span: *span });
            }
            Terminator::Finish(status) => {
                if self.machine.kind != MachineKind::Altstep {
                    warn!(machine = %self.machine.name, %status, "finish outside an altstep");
                }
                return Ok(Next::Done(Completion::Status(*status)));
            }
            Terminator::Exit => return Ok(Next::Done(Completion::Finished)),
            Terminator::Unreachable => {
                return Err(self.malformed(format!("reached unreachable block {from}")));
            }
        };
        Ok(Next::Jump(next))
    }

    fn route_outcome(
        &self,
        from: Label,
        outcome: ControlOutcome,
        next: Label,
        targets: &ControlTargets,
    ) -> Result<Next, RuntimeError> {
        let target = match outcome {
            ControlOutcome::FallThrough => Some(next),
            ControlOutcome::Return => match targets.on_return {
                Some(l) => Some(l),
                None => return Ok(Next::Done(Completion::Returned)),
            },
            ControlOutcome::Break => targets.on_break,
            ControlOutcome::Continue => targets.on_continue,
            ControlOutcome::Repeat => targets.on_repeat,
        };
        target.map(Next::Jump).ok_or_else(|| RuntimeError::UnhandledOutcome {
            machine: self.machine.name.clone(),
            label: from,
            outcome,
        })
    }
}

enum Next {
    Jump(Label),
    Done(Completion),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedEnvironment;
    use ttcn_ast::build::*;
    use ttcn_lower::{compile, compile_function, LoweringOptions};

    #[test]
    fn plain_function_runs_once_and_finishes() {
        let m = compile_function(&function("f", vec![plain("x := 1")]), &LoweringOptions::default())
            .unwrap();
        let mut env = ScriptedEnvironment::new();
        assert_eq!(
            execute(&m, &mut env, &DriverLimits::default()).unwrap(),
            Completion::Finished
        );
    }

    #[test]
    fn return_without_target_returns_from_machine() {
        let def = function("f", vec![if_else("c", vec![return_stmt(None)], None), plain("y")]);
        let m = compile_function(&def, &LoweringOptions::default()).unwrap();
        let mut env = ScriptedEnvironment::new().outcome("if", ControlOutcome::Return);
        assert_eq!(
            execute(&m, &mut env, &DriverLimits::default()).unwrap(),
            Completion::Returned
        );
    }

    #[test]
    fn unhandled_break_is_reported() {
        let def = function("f", vec![if_else("c", vec![plain("x")], None)]);
        let m = compile_function(&def, &LoweringOptions::default()).unwrap();
        let mut env = ScriptedEnvironment::new().outcome("if", ControlOutcome::Break);
        let err = execute(&m, &mut env, &DriverLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::UnhandledOutcome {
                outcome: ControlOutcome::Break,
                ..
            }
        ));
    }

    #[test]
    fn all_no_raises_no_match_at_construct_span() {
        let span = Span::new(40, 90);
        let stmt = alt(vec![
            guarded("g", receive("p", "a"), vec![]),
            branch(receive("q", "b"), vec![]),
        ])
        .at(span);
        let m = compile(&stmt, &LoweringOptions::without_defaults()).unwrap();
        let mut env = ScriptedEnvironment::new()
            .guard("g", false)
            .attempts("q.receive(b)", [StatusCode::No]);
        let err = execute(&m, &mut env, &DriverLimits::default()).unwrap_err();
        assert_eq!(err, RuntimeError::NoBranchCanMatch { span });
    }

    #[test]
    fn step_limit_stops_endless_waiting() {
        let m = compile(
            &alt(vec![branch(receive("p", "a"), vec![])]),
            &LoweringOptions::default(),
        )
        .unwrap();
        let mut env = ScriptedEnvironment::new();
        let err = execute(&m, &mut env, &DriverLimits::with_max_steps(50)).unwrap_err();
        assert!(matches!(err, RuntimeError::StepLimitExceeded { limit: 50, .. }));
    }

    #[test]
    fn undefined_entry_is_malformed() {
        let mut m = compile_function(&function("f", vec![plain("x")]), &LoweringOptions::default())
            .unwrap();
        m.entry = Label(999);
        let err = execute(&m, &mut ScriptedEnvironment::new(), &DriverLimits::default())
            .unwrap_err();
        assert!(err.to_string().contains("undefined L999"));
    }
}
