//! Recording of collaborator interactions.

use ttcn_ast::ast::{Block, Expr};
use ttcn_lower::machine::{ControlOutcome, Operation, StatusCode};

use crate::env::{AltEnvironment, EnvironmentError};

/// One call the driver made into its collaborator, with the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(tag = "event", rename_all = "snake_case"))]
pub enum TraceEvent {
    Evaluate { expr: String, value: bool },
    Attempt { op: String, status: StatusCode },
    Snapshot { blocking: bool },
    Defaults { status: StatusCode },
    Run { code: String, outcome: ControlOutcome },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Trace {
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn blocking_snapshots(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Snapshot { blocking: true }))
            .count()
    }

    pub fn evaluations_of(&self, expr: &str) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Evaluate { expr: x, .. } if x == expr))
            .count()
    }

    /// Operations attempted, in order.
    pub fn attempts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Attempt { op, .. } => Some(op.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Operations whose attempt reported YES, in order.
    pub fn matched(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Attempt {
                    op,
                    status: StatusCode::Yes,
                } => Some(op.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Rendered code blocks handed to `run`, in order.
    pub fn runs(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Run { code, .. } => Some(code.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether some executed block contains `fragment`.
    pub fn ran(&self, fragment: &str) -> bool {
        self.runs().iter().any(|code| code.contains(fragment))
    }
}

/// Wraps a collaborator and records every interaction into a [`Trace`].
#[derive(Debug, Clone, Default)]
pub struct Recorder<E> {
    inner: E,
    trace: Trace,
}

impl<E> Recorder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            trace: Trace::default(),
        }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    pub fn into_parts(self) -> (E, Trace) {
        (self.inner, self.trace)
    }
}

impl<E: AltEnvironment> AltEnvironment for Recorder<E> {
    fn evaluate(&mut self, expr: &Expr) -> Result<bool, EnvironmentError> {
        let value = self.inner.evaluate(expr)?;
        self.trace.events.push(TraceEvent::Evaluate {
            expr: expr.text.clone(),
            value,
        });
        Ok(value)
    }

    fn attempt(&mut self, op: &Operation) -> Result<StatusCode, EnvironmentError> {
        let status = self.inner.attempt(op)?;
        self.trace.events.push(TraceEvent::Attempt {
            op: op.to_string(),
            status,
        });
        Ok(status)
    }

    fn snapshot(&mut self, blocking: bool) -> Result<(), EnvironmentError> {
        self.inner.snapshot(blocking)?;
        self.trace.events.push(TraceEvent::Snapshot { blocking });
        Ok(())
    }

    fn try_defaults(&mut self) -> Result<StatusCode, EnvironmentError> {
        let status = self.inner.try_defaults()?;
        self.trace.events.push(TraceEvent::Defaults { status });
        Ok(status)
    }

    fn run(&mut self, code: &Block) -> Result<ControlOutcome, EnvironmentError> {
        let outcome = self.inner.run(code)?;
        self.trace.events.push(TraceEvent::Run {
            code: code.to_string(),
            outcome,
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedEnvironment;
    use ttcn_ast::build::*;

    #[test]
    fn recorder_keeps_call_order() {
        let mut rec = Recorder::new(
            ScriptedEnvironment::new().attempts("p.receive(a)", [StatusCode::Yes]),
        );
        rec.snapshot(false).unwrap();
        rec.evaluate(&expr("g")).unwrap();
        rec.attempt(&Operation::Receiving(receive("p", "a"))).unwrap();
        rec.run(&block(vec![plain("f()")])).unwrap();
        let trace = rec.trace();
        assert_eq!(trace.events.len(), 4);
        assert_eq!(trace.matched(), vec!["p.receive(a)"]);
        assert_eq!(trace.evaluations_of("g"), 1);
        assert!(trace.ran("f()"));
        assert_eq!(trace.blocking_snapshots(), 0);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn trace_serializes_with_tagged_events() {
        let trace = Trace {
            events: vec![
                TraceEvent::Snapshot { blocking: true },
                TraceEvent::Attempt {
                    op: "p.receive(a)".into(),
                    status: StatusCode::Yes,
                },
            ],
        };
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["events"][0]["event"], "snapshot");
        assert_eq!(json["events"][1]["op"], "p.receive(a)");
        let back: Trace = serde_json::from_value(json).unwrap();
        assert_eq!(back, trace);
    }
}
