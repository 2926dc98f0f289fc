//! Span lookup and validation helpers for lowering diagnostics.

use ttcn_ast::ast::{Block, Span, Statement, StatementKind};

use crate::machine::{Instr, StateMachine, Terminator};

use super::LoweringError;

/// Best-effort span for a lowering error; errors without a location of
/// their own point at the compiled definition.
pub fn find_span_for_error(err: &LoweringError, fallback: Span) -> Option<Span> {
    match err.span() {
        Some(span) if !span.is_empty() => Some(span),
        _ if fallback.is_empty() => None,
        _ => Some(fallback),
    }
}

/// The first statement at or below `stmt` marked erroneous by the checker.
pub fn find_erroneous(stmt: &Statement) -> Option<&Statement> {
    if stmt.erroneous {
        return Some(stmt);
    }
    match &stmt.kind {
        StatementKind::Block(b)
        | StatementKind::While { body: b, .. }
        | StatementKind::DoWhile { body: b, .. } => in_block(b),
        StatementKind::If {
            then_block,
            else_block,
            ..
        } => in_block(then_block).or_else(|| else_block.as_ref().and_then(in_block)),
        StatementKind::For {
            init, step, body, ..
        } => init
            .as_deref()
            .and_then(find_erroneous)
            .or_else(|| step.as_deref().and_then(find_erroneous))
            .or_else(|| in_block(body)),
        StatementKind::Select { cases } => cases.iter().find_map(|c| in_block(&c.body)),
        StatementKind::Alt(c) => c.branches.iter().find_map(|b| in_block(&b.body)),
        StatementKind::Interleave(c) => c.branches.iter().find_map(|b| in_block(&b.body)),
        StatementKind::Call(c) => c.response.iter().find_map(|b| in_block(&b.body)),
        _ => None,
    }
}

fn in_block(block: &Block) -> Option<&Statement> {
    block.statements.iter().find_map(find_erroneous)
}

/// Check that every jump target exists and every slot and state variable
/// is within the allocated range.
pub fn validate_machine(machine: &StateMachine) -> Result<(), LoweringError> {
    let violation = |message: String| LoweringError::InvariantViolation {
        message: format!("machine '{}': {message}", machine.name),
        span: Span::synthetic(),
    };
    if !machine.blocks.contains_key(&machine.entry) {
        return Err(violation(format!("entry {} has no block", machine.entry)));
    }
    for block in machine.blocks.values() {
        for target in block.terminator.successors() {
            if !machine.blocks.contains_key(&target) {
                return Err(violation(format!(
                    "{} jumps to undefined {target}",
                    block.label
                )));
            }
        }
        for instr in &block.instrs {
            let out_of_range = match instr {
                Instr::SetStatus { slot, .. }
                | Instr::EvalGuard { slot, .. }
                | Instr::Attempt { slot, .. }
                | Instr::TryDefaults { slot } => slot.0 >= machine.num_slots,
                Instr::SetState { var, .. } => var.0 >= machine.num_state_vars,
                Instr::Snapshot { .. } => false,
            };
            if out_of_range {
                return Err(violation(format!(
                    "{} uses unallocated storage in '{instr}'",
                    block.label
                )));
            }
        }
        let bad_slot = match &block.terminator {
            Terminator::IfStatus { slot, .. } | Terminator::Dispatch { slot, .. } => {
                slot.0 >= machine.num_slots
            }
            Terminator::IfAllNo { slots, .. } => slots.iter().any(|s| s.0 >= machine.num_slots),
            Terminator::IfStates { tests, .. } => {
                tests.iter().any(|t| t.var.0 >= machine.num_state_vars)
            }
            _ => false,
        };
        if bad_slot {
            return Err(violation(format!(
                "{} tests unallocated storage",
                block.label
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::*;
    use indexmap::IndexMap;
    use ttcn_ast::build::*;

    #[test]
    fn erroneous_statement_is_found_below_plain_code() {
        let mut inner = break_stmt();
        inner.erroneous = true;
        let stmt = if_else("c", vec![plain("x := 1")], Some(vec![inner]));
        let found = find_erroneous(&stmt).unwrap();
        assert!(matches!(found.kind, StatementKind::Break));
        assert!(find_erroneous(&plain("x := 1")).is_none());
    }

    #[test]
    fn dangling_jump_is_rejected() {
        let mut blocks = IndexMap::new();
        blocks.insert(
            Label(0),
            BasicBlock {
                label: Label(0),
                instrs: vec![],
                terminator: Terminator::Goto(Label(7)),
            },
        );
        let machine = StateMachine {
            name: "broken".into(),
            kind: MachineKind::Construct,
            entry: Label(0),
            blocks,
            num_slots: 0,
            num_state_vars: 0,
            constructs: vec![],
            interleaves: vec![],
        };
        let err = validate_machine(&machine).unwrap_err();
        assert!(err.to_string().contains("undefined L7"));
    }

    #[test]
    fn span_falls_back_to_definition() {
        let err = LoweringError::Unsupported("x".into());
        assert_eq!(find_span_for_error(&err, Span::new(3, 9)), Some(Span::new(3, 9)));
        assert_eq!(find_span_for_error(&err, Span::synthetic()), None);
        let err = LoweringError::EmptyConstruct {
            kind: "alt",
            span: Span::new(1, 2),
        };
        assert_eq!(find_span_for_error(&err, Span::new(3, 9)), Some(Span::new(1, 2)));
    }
}
