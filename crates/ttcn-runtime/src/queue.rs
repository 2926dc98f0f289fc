//! A collaborator backed by per-port message queues.
//!
//! Ports, timers and components are all modelled as named queues of event
//! texts. Events listed with [`QueueEnvironment::pending`] are visible from
//! the start; events listed with [`QueueEnvironment::arriving`] are
//! delivered one per blocking snapshot, in order.

use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::{trace, warn};
use ttcn_ast::ast::{Block, Expr, ReceiveKind, ReceivingOp};
use ttcn_lower::machine::{ControlOutcome, Operation, StatusCode};

use crate::env::{AltEnvironment, EnvironmentError};

/// Event text a timer queue holds once the timer expired.
pub const TIMEOUT_EVENT: &str = "timeout";

#[derive(Debug, Clone, Default)]
pub struct QueueEnvironment {
    queues: IndexMap<String, VecDeque<String>>,
    incoming: VecDeque<(String, String)>,
    values: IndexMap<String, bool>,
    consumed: Vec<(String, String)>,
    executed: Vec<String>,
    blocking: usize,
}

fn matches(template: Option<&Expr>, event: &str) -> bool {
    match template.map(|t| t.text.trim()) {
        None | Some("?") | Some("*") => true,
        Some(t) => t == event,
    }
}

impl QueueEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(mut self, queue: &str, event: &str) -> Self {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(event.to_string());
        self
    }

    pub fn arriving(mut self, queue: &str, event: &str) -> Self {
        self.queues.entry(queue.to_string()).or_default();
        self.incoming
            .push_back((queue.to_string(), event.to_string()));
        self
    }

    /// Timer `timer` expires at the next free blocking snapshot.
    pub fn expires(self, timer: &str) -> Self {
        self.arriving(timer, TIMEOUT_EVENT)
    }

    pub fn value(mut self, expr: &str, value: bool) -> Self {
        self.values.insert(expr.to_string(), value);
        self
    }

    /// Events removed from their queues, in order.
    pub fn consumed(&self) -> &[(String, String)] {
        &self.consumed
    }

    /// Rendered code blocks run so far.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn blocking_snapshots(&self) -> usize {
        self.blocking
    }

    fn candidates(&self, op: &ReceivingOp) -> Vec<String> {
        match &op.subject {
            Some(s) => vec![s.clone()],
            None => self.queues.keys().cloned().collect(),
        }
    }

    fn head(&self, queue: &str) -> Option<&str> {
        self.queues
            .get(queue)
            .and_then(|q| q.front())
            .map(String::as_str)
    }

    fn pop(&mut self, queue: &str) {
        if let Some(event) = self.queues.get_mut(queue).and_then(|q| q.pop_front()) {
            self.consumed.push((queue.to_string(), event));
        }
    }

    fn attempt_receiving(&mut self, op: &ReceivingOp) -> StatusCode {
        let template = op.matching.as_ref();
        for queue in self.candidates(op) {
            let Some(head) = self.head(&queue) else {
                continue;
            };
            match op.kind {
                ReceiveKind::Timeout => {
                    if head == TIMEOUT_EVENT {
                        self.pop(&queue);
                        return StatusCode::Yes;
                    }
                }
                ReceiveKind::Done | ReceiveKind::Killed => return StatusCode::Yes,
                ReceiveKind::CatchTimeout => {
                    if head == TIMEOUT_EVENT {
                        self.pop(&queue);
                        return StatusCode::Yes;
                    }
                }
                ReceiveKind::Trigger => {
                    let hit = matches(template, head);
                    self.pop(&queue);
                    return if hit {
                        StatusCode::Yes
                    } else {
                        StatusCode::Repeat
                    };
                }
                ReceiveKind::Check
                | ReceiveKind::CheckReceive
                | ReceiveKind::CheckGetcall
                | ReceiveKind::CheckGetreply
                | ReceiveKind::CheckCatch => {
                    if matches(template, head) {
                        return StatusCode::Yes;
                    }
                }
                ReceiveKind::Receive
                | ReceiveKind::Getcall
                | ReceiveKind::Getreply
                | ReceiveKind::Catch => {
                    if matches(template, head) {
                        self.pop(&queue);
                        return StatusCode::Yes;
                    }
                }
            }
        }
        StatusCode::Maybe
    }
}

impl AltEnvironment for QueueEnvironment {
    fn evaluate(&mut self, expr: &Expr) -> Result<bool, EnvironmentError> {
        Ok(self.values.get(&expr.text).copied().unwrap_or(true))
    }

    fn attempt(&mut self, op: &Operation) -> Result<StatusCode, EnvironmentError> {
        let status = match op {
            Operation::Receiving(r) => self.attempt_receiving(r),
            Operation::AltstepInstance(_) | Operation::AltstepInvocation(_) => {
                warn!(%op, "no altstep table attached, the branch can never match");
                StatusCode::No
            }
        };
        trace!(%op, %status, "queue attempt");
        Ok(status)
    }

    fn snapshot(&mut self, blocking: bool) -> Result<(), EnvironmentError> {
        if !blocking {
            return Ok(());
        }
        let Some((queue, event)) = self.incoming.pop_front() else {
            return Err(EnvironmentError::Starved {
                snapshots: self.blocking,
            });
        };
        self.blocking += 1;
        trace!(%queue, %event, "delivered");
        self.queues.entry(queue).or_default().push_back(event);
        Ok(())
    }

    fn try_defaults(&mut self) -> Result<StatusCode, EnvironmentError> {
        Ok(StatusCode::No)
    }

    fn run(&mut self, code: &Block) -> Result<ControlOutcome, EnvironmentError> {
        self.executed.push(code.to_string());
        Ok(ControlOutcome::FallThrough)
    }
}
