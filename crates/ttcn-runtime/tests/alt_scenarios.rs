//! Scheduling behaviour of single alts, driven by scripted collaborators.

use ttcn_ast::ast::Span;
use ttcn_ast::build::*;
use ttcn_lower::machine::{StateMachine, StatusCode};
use ttcn_lower::{compile, LoweringOptions};
use ttcn_runtime::{
    execute, Completion, DriverLimits, Recorder, RuntimeError, ScriptedEnvironment, Trace,
    TraceEvent,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn lower(stmt: ttcn_ast::ast::Statement) -> StateMachine {
    compile(&stmt, &LoweringOptions::default()).expect("lower alt")
}

fn run(
    machine: &StateMachine,
    env: ScriptedEnvironment,
) -> (Result<Completion, RuntimeError>, Trace) {
    init_tracing();
    let mut rec = Recorder::new(env);
    let result = execute(machine, &mut rec, &DriverLimits::default());
    let (_, trace) = rec.into_parts();
    (result, trace)
}

fn nonblocking_snapshots(trace: &Trace) -> usize {
    trace
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::Snapshot { blocking: false }))
        .count()
}

// -----------------------------------------------------------------------
// Reference scenarios
// -----------------------------------------------------------------------

#[test]
fn guarded_branch_matches_on_third_pass() {
    let m = lower(alt(vec![guarded(
        "x > 0",
        receive("p", "a"),
        vec![plain("on_a()")],
    )]));
    let env = ScriptedEnvironment::new()
        .guard("x > 0", true)
        .attempts(
            "p.receive(a)",
            [StatusCode::Maybe, StatusCode::Maybe, StatusCode::Yes],
        );
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.blocking_snapshots(), 2);
    assert_eq!(trace.evaluations_of("x > 0"), 1);
    assert_eq!(trace.runs(), vec!["{ on_a() }"]);
    assert_eq!(trace.matched(), vec!["p.receive(a)"]);
}

#[test]
fn false_guard_with_else_runs_else_without_waiting() {
    let m = lower(alt(vec![
        guarded("ready", receive("p", "a"), vec![plain("b1()")]),
        else_branch(vec![plain("b2()")]),
    ]));
    let env = ScriptedEnvironment::new().guard("ready", false);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert!(trace.attempts().is_empty());
    assert_eq!(trace.blocking_snapshots(), 0);
    assert_eq!(trace.runs(), vec!["{ b2() }"]);
}

#[test]
fn trigger_repeat_restarts_pass_without_blocking() {
    let m = lower(alt(vec![branch(trigger("p", "t"), vec![plain("hit()")])]));
    let env = ScriptedEnvironment::new()
        .attempts("p.trigger(t)", [StatusCode::Repeat, StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.attempts(), vec!["p.trigger(t)", "p.trigger(t)"]);
    assert_eq!(trace.blocking_snapshots(), 0);
    assert_eq!(nonblocking_snapshots(&trace), 1);
    assert!(trace.ran("hit()"));
}

#[test]
fn altstep_break_leaves_alt_without_body() {
    let stmt = alt(vec![
        branch(altstep_ref("as_stop"), vec![plain("after_as()")]),
        branch(receive("p", "a"), vec![plain("got_a()")]),
    ]);
    let def = function("f", vec![stmt, plain("next()")]);
    let m = ttcn_lower::compile_function(&def, &LoweringOptions::default()).unwrap();
    let env = ScriptedEnvironment::new()
        .attempts("as_stop()", [StatusCode::Break])
        .attempts("p.receive(a)", [StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.attempts(), vec!["as_stop()"]);
    assert_eq!(trace.runs(), vec!["{ next() }"]);
}

// -----------------------------------------------------------------------
// Pass structure
// -----------------------------------------------------------------------

#[test]
fn first_match_in_declaration_order_wins() {
    let m = lower(alt(vec![
        branch(receive("p", "a"), vec![plain("first()")]),
        branch(receive("q", "b"), vec![plain("second()")]),
        branch(receive("r", "c"), vec![plain("third()")]),
    ]));
    let env = ScriptedEnvironment::new()
        .attempts("p.receive(a)", [StatusCode::Maybe])
        .attempts("q.receive(b)", [StatusCode::Yes])
        .attempts("r.receive(c)", [StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.attempts(), vec!["p.receive(a)", "q.receive(b)"]);
    assert_eq!(trace.runs(), vec!["{ second() }"]);
}

#[test]
fn permanently_disabled_branch_is_not_retried() {
    let m = lower(alt(vec![
        branch(receive("p", "a"), vec![]),
        branch(receive("q", "b"), vec![plain("b()")]),
    ]));
    let env = ScriptedEnvironment::new()
        .attempts("p.receive(a)", [StatusCode::No])
        .attempts("q.receive(b)", [StatusCode::Maybe, StatusCode::Maybe, StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(
        trace.attempts(),
        vec!["p.receive(a)", "q.receive(b)", "q.receive(b)", "q.receive(b)"]
    );
    assert_eq!(trace.blocking_snapshots(), 2);
}

#[test]
fn guard_is_evaluated_once_per_activation() {
    let m = lower(alt(vec![
        guarded("g", receive("p", "a"), vec![]),
        guarded("h", timeout("T"), vec![]),
    ]));
    let env = ScriptedEnvironment::new().attempts(
        "T.timeout",
        [StatusCode::Maybe, StatusCode::Maybe, StatusCode::Maybe, StatusCode::Yes],
    );
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.blocking_snapshots(), 3);
    assert_eq!(trace.evaluations_of("g"), 1);
    assert_eq!(trace.evaluations_of("h"), 1);
}

#[test]
fn else_never_blocks_even_when_branches_may_match_later() {
    let m = lower(alt(vec![
        branch(receive("p", "a"), vec![]),
        branch(timeout("T"), vec![]),
        else_branch(vec![plain("idle()")]),
    ]));
    let (result, trace) = run(&m, ScriptedEnvironment::new());
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.blocking_snapshots(), 0);
    assert_eq!(trace.runs(), vec!["{ idle() }"]);
    assert!(!trace
        .events
        .iter()
        .any(|e| matches!(e, TraceEvent::Defaults { .. })));
}

#[test]
fn repeat_statement_reactivates_with_fresh_snapshot() {
    let m = lower(alt(vec![
        branch(receive("p", "a"), vec![plain("n := n + 1"), repeat()]),
        guarded("armed", timeout("T"), vec![plain("timed_out()")]),
    ]));
    let env = ScriptedEnvironment::new()
        .attempts("p.receive(a)", [StatusCode::Yes, StatusCode::Yes])
        .attempts("T.timeout", [StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(
        trace.runs(),
        vec!["{ n := n + 1 }", "{ n := n + 1 }", "{ timed_out() }"]
    );
    assert_eq!(nonblocking_snapshots(&trace), 3);
    assert_eq!(trace.evaluations_of("armed"), 3);
    assert_eq!(trace.blocking_snapshots(), 0);
}

// -----------------------------------------------------------------------
// Default registry
// -----------------------------------------------------------------------

#[test]
fn default_yes_completes_the_alt() {
    let m = lower(alt(vec![branch(receive("p", "a"), vec![plain("a()")])]));
    let env = ScriptedEnvironment::new().defaults([StatusCode::Maybe, StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert!(trace.runs().is_empty());
    assert_eq!(trace.blocking_snapshots(), 1);
}

#[test]
fn default_repeat_restarts_without_blocking() {
    let m = lower(alt(vec![branch(receive("p", "a"), vec![plain("a()")])]));
    let env = ScriptedEnvironment::new()
        .attempts("p.receive(a)", [StatusCode::Maybe, StatusCode::Yes])
        .defaults([StatusCode::Repeat]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.blocking_snapshots(), 0);
    assert_eq!(trace.runs(), vec!["{ a() }"]);
}

#[test]
fn defaults_are_skipped_when_disabled() {
    let stmt = alt(vec![branch(receive("p", "a"), vec![])]);
    let m = compile(&stmt, &LoweringOptions::without_defaults()).unwrap();
    let env = ScriptedEnvironment::new()
        .attempts("p.receive(a)", [StatusCode::Maybe, StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert!(!trace
        .events
        .iter()
        .any(|e| matches!(e, TraceEvent::Defaults { .. })));
}

// -----------------------------------------------------------------------
// Match failure
// -----------------------------------------------------------------------

#[test]
fn all_branches_and_defaults_no_is_a_match_failure() {
    let span = Span::new(120, 180);
    let m = lower(
        alt(vec![
            guarded("false_guard", receive("p", "a"), vec![]),
            branch(timeout("T"), vec![]),
        ])
        .at(span),
    );
    let env = ScriptedEnvironment::new()
        .guard("false_guard", false)
        .attempts("T.timeout", [StatusCode::Maybe, StatusCode::No]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap_err(), RuntimeError::NoBranchCanMatch { span });
    assert_eq!(trace.blocking_snapshots(), 1);
}

#[test]
fn standalone_receive_waits_like_single_branch_alt() {
    let def = function(
        "f",
        vec![plain("send()"), receive_stmt(receive("p", "ack")), plain("done()")],
    );
    let m = ttcn_lower::compile_function(&def, &LoweringOptions::default()).unwrap();
    let env = ScriptedEnvironment::new()
        .attempts("p.receive(ack)", [StatusCode::Maybe, StatusCode::Yes]);
    let (result, trace) = run(&m, env);
    assert_eq!(result.unwrap(), Completion::Finished);
    assert_eq!(trace.runs(), vec!["{ send() }", "{ done() }"]);
    assert_eq!(trace.blocking_snapshots(), 1);
}
