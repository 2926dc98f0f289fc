//! Guard-operation classification.
//!
//! Pure queries over checked statements: which statements can block
//! (receiving statements), whether a block contains one anywhere below it,
//! and whether a branch operation may report REPEAT.

use ttcn_ast::ast::*;

use crate::lowering::LoweringError;

/// Category of a branch operation as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardClass {
    Receiving { kind: ReceiveKind, can_repeat: bool },
    AltstepInstance,
    AltstepInvocation,
    Else,
}

pub fn classify_operation(op: &GuardOperation) -> GuardClass {
    match op {
        GuardOperation::Receiving(r) => GuardClass::Receiving {
            kind: r.kind,
            can_repeat: r.kind.can_repeat(),
        },
        GuardOperation::AltstepInstance(_) => GuardClass::AltstepInstance,
        GuardOperation::AltstepInvocation(_) => GuardClass::AltstepInvocation,
        GuardOperation::Else => GuardClass::Else,
    }
}

/// The guard operation a standalone statement performs, if it is one.
pub fn guard_operation_of(stmt: &Statement) -> Option<GuardOperation> {
    match &stmt.kind {
        StatementKind::Receive(op) => Some(GuardOperation::Receiving(op.clone())),
        StatementKind::Altstep(r) => Some(GuardOperation::AltstepInstance(r.clone())),
        StatementKind::AltstepInvoke(e) => Some(GuardOperation::AltstepInvocation(e.clone())),
        _ => None,
    }
}

/// Whether `stmt` itself may suspend the execution context.
pub fn is_receiving_statement(stmt: &Statement) -> bool {
    match &stmt.kind {
        StatementKind::Alt(_)
        | StatementKind::Interleave(_)
        | StatementKind::Receive(_)
        | StatementKind::Altstep(_)
        | StatementKind::AltstepInvoke(_) => true,
        StatementKind::Call(call) => !call.response.is_empty(),
        StatementKind::Plain(_)
        | StatementKind::Block(_)
        | StatementKind::If { .. }
        | StatementKind::While { .. }
        | StatementKind::DoWhile { .. }
        | StatementKind::For { .. }
        | StatementKind::Select { .. }
        | StatementKind::Repeat
        | StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Return(_) => false,
    }
}

/// Whether `stmt` is, or structurally contains, a receiving statement.
pub fn contains_receiving(stmt: &Statement) -> bool {
    if is_receiving_statement(stmt) {
        return true;
    }
    match &stmt.kind {
        StatementKind::Block(b) => has_receiving_statement(b),
        StatementKind::If {
            then_block,
            else_block,
            ..
        } => {
            has_receiving_statement(then_block)
                || else_block.as_ref().is_some_and(has_receiving_statement)
        }
        StatementKind::While { body, .. } | StatementKind::DoWhile { body, .. } => {
            has_receiving_statement(body)
        }
        StatementKind::For {
            init, step, body, ..
        } => {
            init.as_deref().is_some_and(contains_receiving)
                || step.as_deref().is_some_and(contains_receiving)
                || has_receiving_statement(body)
        }
        StatementKind::Select { cases } => cases.iter().any(|c| has_receiving_statement(&c.body)),
        _ => false,
    }
}

/// Decides whether a block is emitted as plain sequential code or goes
/// through the scheduler.
pub fn has_receiving_statement(block: &Block) -> bool {
    block.statements.iter().any(contains_receiving)
}

/// Whether an attempt of `op` may come back REPEAT.
pub fn can_repeat(op: &GuardOperation) -> bool {
    match classify_operation(op) {
        GuardClass::Receiving { can_repeat, .. } => can_repeat,
        GuardClass::AltstepInstance | GuardClass::AltstepInvocation | GuardClass::Else => false,
    }
}

/// `can_repeat` for a statement that must be a direct guard operation.
pub fn statement_can_repeat(stmt: &Statement) -> Result<bool, LoweringError> {
    match guard_operation_of(stmt) {
        Some(op) => Ok(can_repeat(&op)),
        None => Err(LoweringError::InvariantViolation {
            message: format!(
                "{} is not a guard operation; repeat classification is undefined",
                stmt.kind.name()
            ),
            span: stmt.span,
        }),
    }
}

/// Whether the scheduler needs a REPEAT exit for this branch operation.
/// Altstep operations propagate whatever their own branches report.
pub fn needs_repeat_exit(op: &GuardOperation) -> bool {
    can_repeat(op) || op.is_altstep()
}

/// Whether a `repeat` statement occurs in `block` at a level that targets the
/// construct owning the block. Nested alt-like constructs own their repeats.
pub fn contains_repeat_statement(block: &Block) -> bool {
    block.statements.iter().any(|s| match &s.kind {
        StatementKind::Repeat => true,
        StatementKind::Block(b) => contains_repeat_statement(b),
        StatementKind::If {
            then_block,
            else_block,
            ..
        } => {
            contains_repeat_statement(then_block)
                || else_block.as_ref().is_some_and(contains_repeat_statement)
        }
        StatementKind::While { body, .. }
        | StatementKind::DoWhile { body, .. }
        | StatementKind::For { body, .. } => contains_repeat_statement(body),
        StatementKind::Select { cases } => cases.iter().any(|c| contains_repeat_statement(&c.body)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttcn_ast::build::*;

    #[test]
    fn receiving_statements() {
        assert!(is_receiving_statement(&receive_stmt(receive("p", "a"))));
        assert!(is_receiving_statement(&altstep_call("as_default")));
        assert!(is_receiving_statement(&alt(vec![])));
        assert!(is_receiving_statement(&interleave(vec![])));
        assert!(is_receiving_statement(&call(
            "p.call(S:{})",
            None,
            vec![branch(op(ReceiveKind::Getreply, "p", None), vec![])]
        )));
        assert!(!is_receiving_statement(&call("p.call(S:{}, nowait)", None, vec![])));
        assert!(!is_receiving_statement(&plain("p.send(m)")));
        assert!(!is_receiving_statement(&while_loop(
            "true",
            vec![receive_stmt(receive("p", "a"))]
        )));
    }

    #[test]
    fn has_receiving_statement_descends_into_structured_statements() {
        let nested = block(vec![
            plain("x := 0"),
            if_else(
                "x > 0",
                vec![],
                Some(vec![for_loop(
                    "i := 0",
                    "i < 3",
                    "i := i + 1",
                    vec![select(vec![(Some("1"), vec![receive_stmt(timeout("T"))])])],
                )]),
            ),
        ]);
        assert!(has_receiving_statement(&nested));

        let flat = block(vec![
            plain("x := 0"),
            while_loop("x < 3", vec![plain("x := x + 1"), break_stmt()]),
        ]);
        assert!(!has_receiving_statement(&flat));
    }

    #[test]
    fn only_trigger_done_killed_repeat() {
        for kind in ReceiveKind::ALL {
            let op: GuardOperation = op(kind, "p", None).into();
            let expected = matches!(
                kind,
                ReceiveKind::Trigger | ReceiveKind::Done | ReceiveKind::Killed
            );
            assert_eq!(can_repeat(&op), expected, "{kind:?}");
        }
        assert!(!can_repeat(&GuardOperation::Else));
        assert!(!can_repeat(&altstep_ref("as_x").into()));
        assert!(needs_repeat_exit(&altstep_ref("as_x").into()));
    }

    #[test]
    fn statement_can_repeat_rejects_non_operations() {
        assert!(statement_can_repeat(&receive_stmt(trigger("p", "t"))).unwrap());
        assert!(!statement_can_repeat(&altstep_call("as_x")).unwrap());
        let err = statement_can_repeat(&plain("x := 1")).unwrap_err();
        assert!(matches!(err, LoweringError::InvariantViolation { .. }));
    }

    #[test]
    fn repeat_statement_search_stops_at_nested_alts() {
        let own = block(vec![if_else("c", vec![repeat()], None)]);
        assert!(contains_repeat_statement(&own));
        let nested = block(vec![alt(vec![branch(receive("p", "a"), vec![repeat()])])]);
        assert!(!contains_repeat_statement(&nested));
    }

    #[test]
    fn classification_is_exhaustive() {
        assert_eq!(classify_operation(&GuardOperation::Else), GuardClass::Else);
        assert_eq!(
            classify_operation(&GuardOperation::AltstepInvocation(expr("v_as"))),
            GuardClass::AltstepInvocation
        );
        assert_eq!(
            classify_operation(&trigger("p", "t").into()),
            GuardClass::Receiving {
                kind: ReceiveKind::Trigger,
                can_repeat: true
            }
        );
    }
}
