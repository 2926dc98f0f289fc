//! A collaborator that answers from fixed scripts.

use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::trace;
use ttcn_ast::ast::{Block, Expr};
use ttcn_lower::machine::{ControlOutcome, Operation, StatusCode};

use crate::env::{AltEnvironment, EnvironmentError};

/// Scripted answers keyed by rendered text.
///
/// - attempts are keyed by the operation as displayed (`p.receive(a)`,
///   `T.timeout`, `as_guard()`); an exhausted or missing script answers
///   MAYBE, or whatever [`ScriptedEnvironment::when_exhausted`] sets;
/// - guards answer a constant, conditions answer a sequence and then
///   `false`, unknown expressions are `true`;
/// - run outcomes are keyed by a fragment of the rendered block and
///   consumed in order, falling through once exhausted;
/// - the default registry answers its script and then NO.
#[derive(Debug, Clone)]
pub struct ScriptedEnvironment {
    attempts: IndexMap<String, VecDeque<StatusCode>>,
    exhausted: StatusCode,
    guards: IndexMap<String, bool>,
    conditions: IndexMap<String, VecDeque<bool>>,
    outcomes: Vec<(String, VecDeque<ControlOutcome>)>,
    defaults: VecDeque<StatusCode>,
    max_blocking: Option<usize>,
    blocking: usize,
}

impl Default for ScriptedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self {
            attempts: IndexMap::new(),
            exhausted: StatusCode::Maybe,
            guards: IndexMap::new(),
            conditions: IndexMap::new(),
            outcomes: Vec::new(),
            defaults: VecDeque::new(),
            max_blocking: None,
            blocking: 0,
        }
    }

    pub fn attempts(
        mut self,
        op: &str,
        results: impl IntoIterator<Item = StatusCode>,
    ) -> Self {
        self.attempts
            .entry(op.to_string())
            .or_default()
            .extend(results);
        self
    }

    pub fn when_exhausted(mut self, status: StatusCode) -> Self {
        self.exhausted = status;
        self
    }

    pub fn guard(mut self, expr: &str, value: bool) -> Self {
        self.guards.insert(expr.to_string(), value);
        self
    }

    pub fn condition(mut self, expr: &str, values: impl IntoIterator<Item = bool>) -> Self {
        self.conditions
            .entry(expr.to_string())
            .or_default()
            .extend(values);
        self
    }

    pub fn outcome(mut self, fragment: &str, outcome: ControlOutcome) -> Self {
        match self.outcomes.iter_mut().find(|(f, _)| f == fragment) {
            Some((_, queue)) => queue.push_back(outcome),
            None => self
                .outcomes
                .push((fragment.to_string(), VecDeque::from([outcome]))),
        }
        self
    }

    pub fn defaults(mut self, results: impl IntoIterator<Item = StatusCode>) -> Self {
        self.defaults.extend(results);
        self
    }

    /// Fail with [`EnvironmentError::Starved`] on the blocking snapshot
    /// after the first `n`.
    pub fn max_blocking_snapshots(mut self, n: usize) -> Self {
        self.max_blocking = Some(n);
        self
    }

    pub fn blocking_snapshots(&self) -> usize {
        self.blocking
    }
}

impl AltEnvironment for ScriptedEnvironment {
    fn evaluate(&mut self, expr: &Expr) -> Result<bool, EnvironmentError> {
        if let Some(queue) = self.conditions.get_mut(&expr.text) {
            return Ok(queue.pop_front().unwrap_or(false));
        }
        Ok(self.guards.get(&expr.text).copied().unwrap_or(true))
    }

    fn attempt(&mut self, op: &Operation) -> Result<StatusCode, EnvironmentError> {
        let key = op.to_string();
        let status = self
            .attempts
            .get_mut(&key)
            .and_then(|q| q.pop_front())
            .unwrap_or(self.exhausted);
        trace!(op = %key, %status, "scripted attempt");
        Ok(status)
    }

    fn snapshot(&mut self, blocking: bool) -> Result<(), EnvironmentError> {
        if blocking {
            if self.max_blocking.is_some_and(|max| self.blocking >= max) {
                return Err(EnvironmentError::Starved {
                    snapshots: self.blocking,
                });
            }
            self.blocking += 1;
        }
        Ok(())
    }

    fn try_defaults(&mut self) -> Result<StatusCode, EnvironmentError> {
        Ok(self.defaults.pop_front().unwrap_or(StatusCode::No))
    }

    fn run(&mut self, code: &Block) -> Result<ControlOutcome, EnvironmentError> {
        let text = code.to_string();
        let outcome = self
            .outcomes
            .iter_mut()
            .find(|(fragment, queue)| !queue.is_empty() && text.contains(fragment.as_str()))
            .and_then(|(_, queue)| queue.pop_front())
            .unwrap_or_default();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttcn_ast::build::*;

    fn op_of(o: ttcn_ast::ast::ReceivingOp) -> Operation {
        Operation::Receiving(o)
    }

    #[test]
    fn attempt_scripts_are_consumed_then_exhausted() {
        let mut env = ScriptedEnvironment::new()
            .attempts("p.receive(a)", [StatusCode::No, StatusCode::Yes])
            .when_exhausted(StatusCode::No);
        let op = op_of(receive("p", "a"));
        assert_eq!(env.attempt(&op).unwrap(), StatusCode::No);
        assert_eq!(env.attempt(&op).unwrap(), StatusCode::Yes);
        assert_eq!(env.attempt(&op).unwrap(), StatusCode::No);
        assert_eq!(env.attempt(&op_of(timeout("T"))).unwrap(), StatusCode::No);
    }

    #[test]
    fn conditions_run_out_to_false() {
        let mut env = ScriptedEnvironment::new()
            .condition("more()", [true, true])
            .guard("g", false);
        let more = expr("more()");
        assert!(env.evaluate(&more).unwrap());
        assert!(env.evaluate(&more).unwrap());
        assert!(!env.evaluate(&more).unwrap());
        assert!(!env.evaluate(&expr("g")).unwrap());
        assert!(env.evaluate(&expr("unknown")).unwrap());
    }

    #[test]
    fn outcomes_match_fragments_in_order() {
        let mut env = ScriptedEnvironment::new()
            .outcome("step", ControlOutcome::Continue)
            .outcome("step", ControlOutcome::Break);
        let code = block(vec![plain("step()")]);
        assert_eq!(env.run(&code).unwrap(), ControlOutcome::Continue);
        assert_eq!(env.run(&code).unwrap(), ControlOutcome::Break);
        assert_eq!(env.run(&code).unwrap(), ControlOutcome::FallThrough);
    }

    #[test]
    fn starves_after_blocking_limit() {
        let mut env = ScriptedEnvironment::new().max_blocking_snapshots(1);
        env.snapshot(false).unwrap();
        env.snapshot(true).unwrap();
        assert_eq!(
            env.snapshot(true).unwrap_err(),
            EnvironmentError::Starved { snapshots: 1 }
        );
        assert_eq!(env.blocking_snapshots(), 1);
    }
}
