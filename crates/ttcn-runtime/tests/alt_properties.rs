//! Randomized alts checked against a direct model of the pass loop:
//! first match in declaration order, guards evaluated once, blocking
//! snapshots only for passes that ended unresolved.

use std::collections::VecDeque;

use proptest::prelude::*;
use ttcn_lower::machine::StatusCode;
use ttcn_lower::proptest_generators::{arb_alt_scenario, AltScenario};
use ttcn_lower::{compile, LoweringOptions};
use ttcn_runtime::{execute, DriverLimits, Recorder, RuntimeError, ScriptedEnvironment};

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// The body with this rendered text ran.
    Body(String),
    /// The default registry resolved the alt.
    Default,
    NoMatch,
}

#[derive(Debug)]
struct Expected {
    outcome: Outcome,
    attempts: Vec<String>,
    blocking: usize,
}

fn model(s: &AltScenario) -> Expected {
    let n = s.operation_branches();
    let mut scripts: Vec<VecDeque<StatusCode>> =
        s.attempts.iter().map(|a| a.iter().copied().collect()).collect();
    let mut defaults: VecDeque<StatusCode> = s.defaults.iter().copied().collect();
    let mut status: Vec<StatusCode> = s
        .guards
        .iter()
        .map(|g| match g {
            Some(false) => StatusCode::No,
            _ => StatusCode::Maybe,
        })
        .collect();
    let mut default_status = if s.has_else {
        StatusCode::No
    } else {
        StatusCode::Maybe
    };
    let mut attempts = Vec::new();
    let mut blocking = 0;
    let done = |outcome, attempts, blocking| Expected {
        outcome,
        attempts,
        blocking,
    };

    'pass: loop {
        for i in 0..n {
            if status[i] != StatusCode::Maybe {
                continue;
            }
            let result = scripts[i].pop_front().unwrap_or(StatusCode::No);
            attempts.push(s.branches[i].operation.to_string());
            status[i] = result;
            match result {
                StatusCode::Yes => {
                    return done(Outcome::Body(format!("{{ body{i} }}")), attempts, blocking)
                }
                StatusCode::Repeat => {
                    status[i] = StatusCode::Maybe;
                    continue 'pass;
                }
                _ => {}
            }
        }
        if s.has_else {
            return done(Outcome::Body("{ else_body }".into()), attempts, blocking);
        }
        if default_status == StatusCode::Maybe {
            default_status = defaults.pop_front().unwrap_or(StatusCode::No);
            match default_status {
                StatusCode::Yes | StatusCode::Break => {
                    return done(Outcome::Default, attempts, blocking)
                }
                StatusCode::Repeat => {
                    default_status = StatusCode::Maybe;
                    continue 'pass;
                }
                _ => {}
            }
        }
        if default_status == StatusCode::No && status.iter().all(|s| *s == StatusCode::No) {
            return done(Outcome::NoMatch, attempts, blocking);
        }
        blocking += 1;
    }
}

fn environment(s: &AltScenario) -> ScriptedEnvironment {
    let mut env = ScriptedEnvironment::new()
        .when_exhausted(StatusCode::No)
        .defaults(s.defaults.iter().copied());
    for (i, script) in s.attempts.iter().enumerate() {
        env = env.attempts(&s.branches[i].operation.to_string(), script.iter().copied());
        if let Some(value) = s.guards[i] {
            env = env.guard(&format!("g{i}"), value);
        }
    }
    env
}

proptest! {
    #[test]
    fn driver_agrees_with_pass_model(s in arb_alt_scenario(4)) {
        let machine = compile(&s.statement(), &LoweringOptions::default()).unwrap();
        let mut rec = Recorder::new(environment(&s));
        let result = execute(&machine, &mut rec, &DriverLimits::default());
        let trace = rec.trace();
        let expected = model(&s);

        let outcome = match result {
            Ok(_) => match trace.runs().as_slice() {
                [] => Outcome::Default,
                [body] => Outcome::Body(body.to_string()),
                more => panic!("more than one body ran: {more:?}"),
            },
            Err(RuntimeError::NoBranchCanMatch { .. }) => Outcome::NoMatch,
            Err(other) => panic!("unexpected runtime error: {other}"),
        };
        prop_assert_eq!(outcome, expected.outcome);
        let expected_attempts: Vec<&str> = expected.attempts.iter().map(String::as_str).collect();
        prop_assert_eq!(trace.attempts(), expected_attempts);
        prop_assert_eq!(trace.blocking_snapshots(), expected.blocking);
    }

    #[test]
    fn guards_are_evaluated_at_most_once(s in arb_alt_scenario(4)) {
        let machine = compile(&s.statement(), &LoweringOptions::default()).unwrap();
        let mut rec = Recorder::new(environment(&s));
        let _ = execute(&machine, &mut rec, &DriverLimits::default());
        for (i, guard) in s.guards.iter().enumerate() {
            let expected = usize::from(guard.is_some());
            prop_assert_eq!(rec.trace().evaluations_of(&format!("g{i}")), expected);
        }
    }

    #[test]
    fn else_never_blocks_or_fails(s in arb_alt_scenario(4)) {
        prop_assume!(s.has_else);
        let machine = compile(&s.statement(), &LoweringOptions::default()).unwrap();
        prop_assert_eq!(machine.suspension_points(), 0);
        let mut rec = Recorder::new(environment(&s));
        prop_assert!(execute(&machine, &mut rec, &DriverLimits::default()).is_ok());
        prop_assert_eq!(rec.trace().blocking_snapshots(), 0);
    }
}
