//! Sequential statements: batching of plain code into `Run` blocks and the
//! label structure of conditionals, loops and selects that contain
//! receiving statements.

use tracing::trace;

use ttcn_ast::ast::*;

use crate::classify::{contains_receiving, guard_operation_of};
use crate::machine::{AltKind, ControlTargets, Label, Terminator};

use super::{find_erroneous, Lowerer, LoweringError};

impl Lowerer<'_> {
    pub(crate) fn lower_block(
        &mut self,
        block: &Block,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        self.lower_statements(&block.statements, targets)
    }

    pub(crate) fn lower_statements(
        &mut self,
        statements: &[Statement],
        mut targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        let mut pending: Vec<Statement> = Vec::new();
        for (i, stmt) in statements.iter().enumerate() {
            if stmt.erroneous {
                return Err(LoweringError::ErroneousStatement {
                    kind: stmt.kind.name(),
                    span: stmt.span,
                });
            }
            match &stmt.kind {
                StatementKind::Break | StatementKind::Continue | StatementKind::Repeat => {
                    self.flush(&mut pending, targets);
                    self.jump(stmt, targets)?;
                    let rest = statements.len() - i - 1;
                    if rest > 0 {
                        trace!(
                            skipped = rest,
                            "statements after {} are unreachable",
                            stmt.kind.name()
                        );
                    }
                    return Ok(());
                }
                _ if !contains_receiving(stmt) => {
                    if let Some(bad) = find_erroneous(stmt) {
                        return Err(LoweringError::ErroneousStatement {
                            kind: bad.kind.name(),
                            span: bad.span,
                        });
                    }
                    pending.push(stmt.clone());
                }
                _ => {
                    self.flush(&mut pending, targets);
                    self.lower_receiving(stmt, targets)?;
                    if let Some(rearm) = self.current_rearm() {
                        targets.on_repeat = Some(rearm);
                    }
                }
            }
        }
        self.flush(&mut pending, targets);
        Ok(())
    }

    /// Hand accumulated plain statements to the collaborator as one `Run`.
    fn flush(&mut self, pending: &mut Vec<Statement>, targets: ControlTargets) {
        if pending.is_empty() {
            return;
        }
        let statements = std::mem::take(pending);
        let span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => Span::new(first.span.start, last.span.end),
            _ => Span::synthetic(),
        };
        let next = self.fresh_label();
        self.terminate(Terminator::Run {
            code: Block::new(statements, span),
            next,
            targets,
        });
        self.start_block(next);
    }

    fn jump(&mut self, stmt: &Statement, targets: ControlTargets) -> Result<(), LoweringError> {
        let target = match stmt.kind {
            StatementKind::Break => targets.on_break,
            StatementKind::Continue => targets.on_continue,
            _ => targets.on_repeat,
        };
        let Some(target) = target else {
            return Err(LoweringError::MissingControlTarget {
                statement: stmt.kind.name(),
                span: stmt.span,
            });
        };
        self.terminate(Terminator::Goto(target));
        Ok(())
    }

    fn lower_receiving(
        &mut self,
        stmt: &Statement,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        match &stmt.kind {
            StatementKind::Block(b) => self.lower_block(b, targets),
            StatementKind::If {
                cond,
                then_block,
                else_block,
            } => self.lower_if(cond, then_block, else_block.as_ref(), targets),
            StatementKind::While { cond, body } => {
                self.enter(stmt.span)?;
                let head = self.fresh_label();
                let body_label = self.fresh_label();
                let exit = self.fresh_label();
                self.start_block(head);
                self.terminate(Terminator::Branch {
                    cond: cond.clone(),
                    then: body_label,
                    else_: exit,
                });
                self.start_block(body_label);
                self.lower_block(body, loop_targets(targets, exit, head))?;
                self.seal(Terminator::Goto(head));
                self.start_block(exit);
                self.leave();
                Ok(())
            }
            StatementKind::DoWhile { body, cond } => {
                self.enter(stmt.span)?;
                let body_label = self.fresh_label();
                let test = self.fresh_label();
                let exit = self.fresh_label();
                self.start_block(body_label);
                self.lower_block(body, loop_targets(targets, exit, test))?;
                self.start_block(test);
                self.terminate(Terminator::Branch {
                    cond: cond.clone(),
                    then: body_label,
                    else_: exit,
                });
                self.start_block(exit);
                self.leave();
                Ok(())
            }
            StatementKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.enter(stmt.span)?;
                if let Some(init) = init {
                    self.lower_statements(std::slice::from_ref(init.as_ref()), targets)?;
                }
                let head = self.fresh_label();
                let body_label = self.fresh_label();
                let step_label = self.fresh_label();
                let exit = self.fresh_label();
                self.start_block(head);
                self.terminate(Terminator::Branch {
                    cond: cond.clone(),
                    then: body_label,
                    else_: exit,
                });
                self.start_block(body_label);
                let inner = loop_targets(targets, exit, step_label);
                self.lower_block(body, inner)?;
                self.start_block(step_label);
                if let Some(step) = step {
                    self.lower_statements(std::slice::from_ref(step.as_ref()), inner)?;
                }
                self.seal(Terminator::Goto(head));
                self.start_block(exit);
                self.leave();
                Ok(())
            }
            StatementKind::Select { cases } => self.lower_select(cases, targets),
            StatementKind::Alt(construct) => {
                if self.in_interleave_arm() {
                    self.lower_point_alt(AltKind::Alt, &construct.branches, construct.span, targets)
                } else {
                    self.lower_alt(AltKind::Alt, &construct.branches, construct.span, targets)
                }
            }
            StatementKind::Interleave(construct) => self.lower_interleave(construct, targets),
            StatementKind::Receive(_)
            | StatementKind::Altstep(_)
            | StatementKind::AltstepInvoke(_) => {
                let operation = guard_operation_of(stmt).ok_or_else(|| {
                    LoweringError::InvariantViolation {
                        message: format!("{} carries no guard operation", stmt.kind.name()),
                        span: stmt.span,
                    }
                })?;
                if self.in_interleave_arm() {
                    self.lower_point_operation(operation, stmt.span)
                } else {
                    // A standalone receiving operation behaves as a one-branch alt.
                    let branch = AltBranch {
                        guard: None,
                        operation,
                        body: Block::empty(),
                        span: stmt.span,
                    };
                    self.lower_alt(AltKind::Alt, std::slice::from_ref(&branch), stmt.span, targets)
                }
            }
            StatementKind::Call(call) => {
                let next = self.fresh_label();
                let invocation =
                    Statement::new(StatementKind::Plain(call.call.clone()), call.call.span);
                self.terminate(Terminator::Run {
                    code: Block::new(vec![invocation], call.call.span),
                    next,
                    targets,
                });
                self.start_block(next);
                if self.in_interleave_arm() {
                    self.lower_point_alt(AltKind::CallResponse, &call.response, call.span, targets)
                } else {
                    self.lower_alt(AltKind::CallResponse, &call.response, call.span, targets)
                }
            }
            StatementKind::Plain(_)
            | StatementKind::Repeat
            | StatementKind::Break
            | StatementKind::Continue
            | StatementKind::Return(_) => Err(LoweringError::InvariantViolation {
                message: format!("{} routed to receiving-statement lowering", stmt.kind.name()),
                span: stmt.span,
            }),
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        let then_label = self.fresh_label();
        let join = self.fresh_label();
        let else_label = match else_block {
            Some(_) => self.fresh_label(),
            None => join,
        };
        self.terminate(Terminator::Branch {
            cond: cond.clone(),
            then: then_label,
            else_: else_label,
        });
        self.start_block(then_label);
        self.lower_block(then_block, targets)?;
        self.seal(Terminator::Goto(join));
        if let Some(else_block) = else_block {
            self.start_block(else_label);
            self.lower_block(else_block, targets)?;
            self.seal(Terminator::Goto(join));
        }
        self.start_block(join);
        Ok(())
    }

    fn lower_select(
        &mut self,
        cases: &[SelectCase],
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        let join = self.fresh_label();
        let mut bodies = Vec::with_capacity(cases.len());
        for case in cases {
            let body = self.fresh_label();
            bodies.push((body, &case.body));
            match &case.condition {
                Some(cond) => {
                    let next = self.fresh_label();
                    self.terminate(Terminator::Branch {
                        cond: cond.clone(),
                        then: body,
                        else_: next,
                    });
                    self.start_block(next);
                }
                None => {
                    // `case else` catches everything; later cases are dead.
                    self.terminate(Terminator::Goto(body));
                    break;
                }
            }
        }
        self.seal(Terminator::Goto(join));
        for (label, body) in bodies {
            self.start_block(label);
            self.lower_block(body, targets)?;
            self.seal(Terminator::Goto(join));
        }
        self.start_block(join);
        Ok(())
    }
}

fn loop_targets(outer: ControlTargets, exit: Label, cont: Label) -> ControlTargets {
    ControlTargets {
        on_break: Some(exit),
        on_continue: Some(cont),
        ..outer
    }
}
