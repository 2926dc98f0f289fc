//! Proptest strategies for behaviour trees and collaborator scripts.

use proptest::prelude::*;

use ttcn_ast::ast::{AltBranch, ReceiveKind, ReceivingOp, Span, Statement, StatementKind};
use ttcn_ast::build::*;

use crate::machine::StatusCode;

/// Any receiving kind that is valid as an alt branch operation outside a
/// call response part.
pub fn arb_receive_kind() -> impl Strategy<Value = ReceiveKind> {
    proptest::sample::select(
        ReceiveKind::ALL
            .iter()
            .copied()
            .filter(|k| *k != ReceiveKind::CatchTimeout)
            .collect::<Vec<_>>(),
    )
}

/// A receiving operation on subject `p{index}`, so that operations built
/// for different indices never render the same text.
pub fn arb_receiving_op(index: usize) -> impl Strategy<Value = ReceivingOp> {
    arb_receive_kind().prop_map(move |kind| {
        let subject = format!("p{index}");
        match kind {
            ReceiveKind::Timeout | ReceiveKind::Done | ReceiveKind::Killed => {
                op(kind, &subject, None)
            }
            _ => op(kind, &subject, Some(&format!("m{index}"))),
        }
    })
}

/// A result an attempt of `kind` may legally report.
pub fn arb_attempt_result(kind: ReceiveKind) -> impl Strategy<Value = StatusCode> {
    if kind.can_repeat() {
        prop_oneof![
            3 => Just(StatusCode::Maybe),
            2 => Just(StatusCode::Yes),
            1 => Just(StatusCode::No),
            1 => Just(StatusCode::Repeat),
        ]
        .boxed()
    } else {
        prop_oneof![
            3 => Just(StatusCode::Maybe),
            2 => Just(StatusCode::Yes),
            1 => Just(StatusCode::No),
        ]
        .boxed()
    }
}

/// Result reported by the default registry.
pub fn arb_default_result() -> impl Strategy<Value = StatusCode> {
    prop_oneof![
        4 => Just(StatusCode::Maybe),
        2 => Just(StatusCode::No),
        1 => Just(StatusCode::Yes),
        1 => Just(StatusCode::Repeat),
        1 => Just(StatusCode::Break),
    ]
}

/// An alt together with everything a scripted collaborator needs to run it.
///
/// Branch `i` attempts an operation on `p{i}`, is guarded by `g{i}` when
/// `guards[i]` is set, and runs `body{i}`. An else branch, if present, is
/// last and runs `else_body`.
#[derive(Debug, Clone)]
pub struct AltScenario {
    pub branches: Vec<AltBranch>,
    pub kinds: Vec<ReceiveKind>,
    /// Value of each branch's boolean guard; `None` for unguarded branches.
    pub guards: Vec<Option<bool>>,
    /// Attempt results per branch, consumed in order.
    pub attempts: Vec<Vec<StatusCode>>,
    pub defaults: Vec<StatusCode>,
    pub has_else: bool,
}

impl AltScenario {
    pub fn statement(&self) -> Statement {
        alt(self.branches.clone())
    }

    /// Number of branches with an operation (the else branch excluded).
    pub fn operation_branches(&self) -> usize {
        self.kinds.len()
    }
}

fn arb_scenario_branch(
    index: usize,
) -> impl Strategy<Value = (ReceivingOp, Option<bool>, Vec<StatusCode>)> {
    arb_receiving_op(index).prop_flat_map(|op| {
        let kind = op.kind;
        (
            Just(op),
            proptest::option::weighted(0.4, any::<bool>()),
            proptest::collection::vec(arb_attempt_result(kind), 0..6),
        )
    })
}

/// An else-less or else-terminated alt with 1 to `max_branches` operation
/// branches and finite attempt scripts.
pub fn arb_alt_scenario(max_branches: usize) -> impl Strategy<Value = AltScenario> {
    (1..=max_branches.max(1), any::<bool>())
        .prop_flat_map(|(n, has_else)| {
            let branches: Vec<_> = (0..n).map(arb_scenario_branch).collect();
            (
                branches,
                Just(has_else),
                proptest::collection::vec(arb_default_result(), 0..4),
            )
        })
        .prop_map(|(parts, has_else, defaults)| {
            let mut branches = Vec::new();
            let mut kinds = Vec::new();
            let mut guards = Vec::new();
            let mut attempts = Vec::new();
            for (i, (op, guard, script)) in parts.into_iter().enumerate() {
                kinds.push(op.kind);
                let body = vec![plain(&format!("body{i}"))];
                branches.push(match guard {
                    Some(_) => guarded(&format!("g{i}"), op, body),
                    None => branch(op, body),
                });
                guards.push(guard);
                attempts.push(script);
            }
            if has_else {
                branches.push(else_branch(vec![plain("else_body")]));
            }
            AltScenario {
                branches,
                kinds,
                guards,
                attempts,
                defaults,
                has_else,
            }
        })
}

/// Interleave arm lengths: each arm `a` is a sequence of receives on
/// `q{a}` with templates `m0`, `m1`, ... in order.
pub fn arb_interleave_shape(max_arms: usize, max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1..=max_len.max(1), 1..=max_arms.max(1))
}

/// Build the interleave described by an [`arb_interleave_shape`] value.
pub fn interleave_from_shape(shape: &[usize]) -> Statement {
    let arms = shape
        .iter()
        .enumerate()
        .map(|(a, &len)| {
            let port = format!("q{a}");
            let rest = (1..len)
                .map(|i| receive_stmt(receive(&port, &format!("m{i}"))))
                .collect();
            branch(receive(&port, "m0"), rest)
        })
        .collect();
    interleave(arms)
}

/// Well-formed behaviour: plain code, receiving statements, alts,
/// interleaves, conditionals and loops nested up to `depth` levels.
pub fn arb_behaviour(depth: u32) -> impl Strategy<Value = Statement> {
    let leaf = prop_oneof![
        (0..4usize).prop_map(|i| plain(&format!("x{i} := x{i} + 1"))),
        (0..4usize).prop_map(|i| receive_stmt(receive(&format!("p{i}"), "?"))),
        (0..2usize).prop_map(|i| receive_stmt(timeout(&format!("T{i}")))),
    ];
    leaf.prop_recursive(depth, 24, 4, |inner| {
        let arm = (arb_receiving_op(0), proptest::collection::vec(inner.clone(), 0..3))
            .prop_map(|(op, body)| branch(op, body))
            .boxed();
        prop_oneof![
            (proptest::collection::vec(arm.clone(), 1..4), any::<bool>()).prop_map(
                |(mut branches, with_else)| {
                    if with_else {
                        branches.push(else_branch(vec![plain("log(\"else\")")]));
                    }
                    alt(branches)
                }
            ),
            proptest::collection::vec(arm, 1..4).prop_map(interleave),
            (
                proptest::collection::vec(inner.clone(), 1..3),
                proptest::option::of(proptest::collection::vec(inner.clone(), 1..3)),
            )
                .prop_map(|(then, else_)| if_else("c", then, else_)),
            proptest::collection::vec(inner.clone(), 1..3)
                .prop_map(|body| while_loop("more()", body)),
            proptest::collection::vec(inner, 1..3).prop_map(statement_block),
        ]
    })
}

fn statement_block(body: Vec<Statement>) -> Statement {
    Statement::new(StatementKind::Block(block(body)), Span::synthetic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::contains_receiving;
    use crate::lowering::{compile_function, validate_machine, LoweringOptions};
    use ttcn_ast::checker::check_function;

    proptest! {
        #[test]
        fn generated_scenarios_are_consistent(s in arb_alt_scenario(4)) {
            prop_assert_eq!(s.kinds.len(), s.guards.len());
            prop_assert_eq!(s.kinds.len(), s.attempts.len());
            prop_assert_eq!(s.branches.len(), s.kinds.len() + usize::from(s.has_else));
            for (kind, script) in s.kinds.iter().zip(&s.attempts) {
                if !kind.can_repeat() {
                    prop_assert!(!script.contains(&StatusCode::Repeat));
                }
            }
        }

        #[test]
        fn generated_behaviour_checks_and_lowers(stmt in arb_behaviour(3)) {
            let mut def = function("f", vec![stmt]);
            let report = check_function(&mut def);
            prop_assert!(report.is_ok(), "{:?}", report.errors);
            let machine = compile_function(&def, &LoweringOptions::default());
            prop_assert!(machine.is_ok(), "{:?}", machine.err());
            let machine = machine.unwrap();
            prop_assert!(validate_machine(&machine).is_ok());
            if def.body.statements.iter().any(contains_receiving) {
                prop_assert!(!machine.constructs.is_empty());
            }
        }
    }
}
