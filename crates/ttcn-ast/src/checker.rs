//! Context checks for control-transfer statements and guard operations.
//!
//! The checker walks a body with a stack of enclosing constructs and flags
//! statements whose meaning depends on a construct that is not there:
//! `repeat` needs an alt-like construct, `break` a loop or alt-like
//! construct, `continue` a loop, and `catch(timeout)` a timed call. The
//! offending statement is marked erroneous and checking continues with its
//! siblings, so one pass reports every problem of a body.

use tracing::debug;

use crate::ast::*;
use crate::errors::{
    SemanticDiagnostic, SemanticError, SemanticErrors, SemanticSeverity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Loop,
    Alt,
    Interleave,
    AltstepBody,
    CallResponse,
}

impl Frame {
    fn accepts_repeat(self) -> bool {
        !matches!(self, Frame::Loop)
    }
}

/// Outcome of checking one function or altstep body.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<SemanticDiagnostic>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<SemanticDiagnostic>, SemanticErrors> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(SemanticErrors {
                errors: self.errors,
            })
        }
    }
}

pub fn check_function(def: &mut FunctionDef) -> CheckReport {
    let mut checker = Checker::default();
    checker.block(&mut def.body);
    debug!(
        function = %def.name,
        errors = checker.report.errors.len(),
        warnings = checker.report.warnings.len(),
        "checked function body"
    );
    checker.report
}

pub fn check_altstep(def: &mut AltstepDef) -> CheckReport {
    let mut checker = Checker::default();
    // Errors in branch operations have no enclosing statement to mark, so
    // the flag only shows up in the log.
    let invalid_operations = checker.branches(&mut def.branches, Frame::AltstepBody, None);
    debug!(
        altstep = %def.name,
        errors = checker.report.errors.len(),
        invalid_operations,
        "checked altstep body"
    );
    checker.report
}

/// Check a free-standing block as if it were a function body.
pub fn check_block(block: &mut Block) -> CheckReport {
    let mut checker = Checker::default();
    checker.block(block);
    checker.report
}

#[derive(Default)]
struct Checker {
    stack: Vec<Frame>,
    report: CheckReport,
}

impl Checker {
    fn error(&mut self, err: SemanticError) {
        self.report.errors.push(err);
    }

    fn any(&self, pred: impl Fn(Frame) -> bool) -> bool {
        self.stack.iter().any(|f| pred(*f))
    }

    fn block(&mut self, block: &mut Block) {
        for stmt in &mut block.statements {
            self.statement(stmt);
        }
    }

    fn nested(&mut self, frame: Frame, block: &mut Block) {
        self.stack.push(frame);
        self.block(block);
        self.stack.pop();
    }

    fn statement(&mut self, stmt: &mut Statement) {
        let span = stmt.span;
        let mut erroneous = false;
        match &mut stmt.kind {
            StatementKind::Plain(_) | StatementKind::Return(_) => {}
            StatementKind::Repeat => {
                if !self.any(Frame::accepts_repeat) {
                    self.error(SemanticError::repeat_outside_alt(span));
                    erroneous = true;
                }
            }
            StatementKind::Break => {
                if self.stack.is_empty() {
                    self.error(SemanticError::break_outside_loop(span));
                    erroneous = true;
                }
            }
            StatementKind::Continue => {
                if !self.any(|f| f == Frame::Loop) {
                    self.error(SemanticError::continue_outside_loop(span));
                    erroneous = true;
                }
            }
            StatementKind::Block(b) => self.block(b),
            StatementKind::If {
                then_block,
                else_block,
                ..
            } => {
                self.block(then_block);
                if let Some(b) = else_block {
                    self.block(b);
                }
            }
            StatementKind::While { body, .. } | StatementKind::DoWhile { body, .. } => {
                self.nested(Frame::Loop, body)
            }
            StatementKind::For {
                init, step, body, ..
            } => {
                if let Some(init) = init {
                    self.statement(init);
                }
                self.stack.push(Frame::Loop);
                if let Some(step) = step {
                    self.statement(step);
                }
                self.block(body);
                self.stack.pop();
            }
            StatementKind::Select { cases } => {
                for case in cases {
                    self.block(&mut case.body);
                }
            }
            StatementKind::Alt(construct) => {
                erroneous = self.branches(&mut construct.branches, Frame::Alt, None);
            }
            StatementKind::Interleave(construct) => {
                for branch in &construct.branches {
                    match &branch.operation {
                        GuardOperation::Else => {
                            self.error(SemanticError::else_in_interleave(branch.span));
                            erroneous = true;
                        }
                        GuardOperation::AltstepInstance(r) => {
                            self.error(SemanticError::altstep_in_interleave(&r.name, branch.span));
                            erroneous = true;
                        }
                        GuardOperation::AltstepInvocation(e) => {
                            self.error(SemanticError::altstep_in_interleave(&e.text, branch.span));
                            erroneous = true;
                        }
                        GuardOperation::Receiving(_) => {}
                    }
                }
                erroneous |= self.branches(&mut construct.branches, Frame::Interleave, None);
            }
            StatementKind::Receive(op) => {
                if op.kind == ReceiveKind::CatchTimeout {
                    self.error(SemanticError::catch_timeout_without_timed_call(op.span));
                    erroneous = true;
                }
            }
            StatementKind::Altstep(_) | StatementKind::AltstepInvoke(_) => {}
            StatementKind::Call(call) => {
                for branch in &call.response {
                    if branch.operation.is_else() {
                        self.error(SemanticError::else_in_call_response(branch.span));
                        erroneous = true;
                    }
                }
                let timed = call.timeout.is_some();
                erroneous |=
                    self.branches(&mut call.response, Frame::CallResponse, Some(timed));
            }
        }
        if erroneous {
            stmt.erroneous = true;
        }
    }

    /// Check the branches of an alt-like construct. Returns whether a branch
    /// operation was invalid, in which case the enclosing statement is marked.
    fn branches(
        &mut self,
        branches: &mut [AltBranch],
        frame: Frame,
        timed_call: Option<bool>,
    ) -> bool {
        let mut invalid = false;
        let mut seen_else = false;
        for branch in branches.iter_mut() {
            if seen_else {
                self.report.warnings.push(SemanticDiagnostic {
                    code: "ttcn::semantic::unreachable_branch".into(),
                    severity: SemanticSeverity::Warning,
                    message: format!(
                        "branch `{}` follows an else branch and can never be chosen",
                        branch.operation
                    ),
                    span: Some(branch.span),
                });
            }
            if let GuardOperation::Receiving(op) = &branch.operation {
                if op.kind == ReceiveKind::CatchTimeout && timed_call != Some(true) {
                    self.error(SemanticError::catch_timeout_without_timed_call(op.span));
                    invalid = true;
                }
            }
            seen_else |= branch.operation.is_else();

            self.nested(frame, &mut branch.body);
        }
        invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;

    fn span(start: usize) -> Span {
        Span::new(start, start + 1)
    }

    #[test]
    fn valid_alt_body_passes() {
        let mut f = function(
            "f",
            vec![while_loop(
                "true",
                vec![alt(vec![
                    branch(receive("p", "a"), vec![repeat()]),
                    branch(timeout("T"), vec![break_stmt()]),
                    branch(receive("p", "b"), vec![continue_stmt()]),
                ])],
            )],
        );
        let report = check_function(&mut f);
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn repeat_outside_alt_is_reported_and_marked() {
        let mut f = function(
            "f",
            vec![
                plain("x := 1"),
                repeat().at(span(5)),
                while_loop("c", vec![repeat().at(span(9))]),
            ],
        );
        let report = check_function(&mut f);
        assert_eq!(report.errors.len(), 2);
        assert!(f.body.statements[1].erroneous);
        assert!(!f.body.statements[0].erroneous);
        match &f.body.statements[2].kind {
            StatementKind::While { body, .. } => assert!(body.statements[0].erroneous),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.errors[0].span(), span(5));
    }

    #[test]
    fn break_and_continue_context() {
        let mut f = function(
            "f",
            vec![
                break_stmt(),
                continue_stmt(),
                alt(vec![branch(receive("p", "a"), vec![break_stmt(), continue_stmt()])]),
            ],
        );
        let report = check_function(&mut f);
        let kinds: Vec<_> = report
            .errors
            .iter()
            .map(|e| match e {
                SemanticError::BreakOutsideLoop { .. } => "break",
                SemanticError::ContinueOutsideLoop { .. } => "continue",
                _ => "other",
            })
            .collect();
        // break inside the alt body is fine, continue is not
        assert_eq!(kinds, vec!["break", "continue", "continue"]);
    }

    #[test]
    fn catch_timeout_requires_timed_call() {
        let catch_timeout = op(ReceiveKind::CatchTimeout, "p", None);
        let mut f = function(
            "f",
            vec![
                call(
                    "p.call(S:{})",
                    None,
                    vec![
                        branch(op(ReceiveKind::Getreply, "p", Some("S:{}")), vec![]),
                        branch(catch_timeout.clone(), vec![]),
                    ],
                ),
                call(
                    "p.call(S:{}, 1.0)",
                    Some("1.0"),
                    vec![branch(catch_timeout.clone(), vec![])],
                ),
                alt(vec![branch(catch_timeout, vec![])]),
            ],
        );
        let report = check_function(&mut f);
        assert_eq!(report.errors.len(), 2);
        assert!(f.body.statements[0].erroneous);
        assert!(!f.body.statements[1].erroneous);
        assert!(f.body.statements[2].erroneous);
    }

    #[test]
    fn interleave_rejects_else_and_altsteps() {
        let mut f = function(
            "f",
            vec![interleave(vec![
                branch(receive("p", "a"), vec![]),
                branch(altstep_ref("as_x"), vec![]),
                else_branch(vec![]),
            ])],
        );
        let report = check_function(&mut f);
        assert_eq!(report.errors.len(), 2);
        assert!(f.body.statements[0].erroneous);
        assert!(matches!(
            &report.errors[0],
            SemanticError::AltstepInInterleave { name, .. } if name == "as_x"
        ));
    }

    #[test]
    fn repeat_in_interleave_and_altstep_is_allowed() {
        let mut f = function(
            "f",
            vec![interleave(vec![branch(receive("p", "a"), vec![repeat()])])],
        );
        assert!(check_function(&mut f).is_ok());

        let mut a = altstep(
            "as_guard",
            vec![
                branch(timeout("T"), vec![repeat()]),
                branch(receive("p", "x"), vec![break_stmt()]),
            ],
        );
        assert!(check_altstep(&mut a).is_ok());
    }

    #[test]
    fn altstep_reports_invalid_operations_and_keeps_checking_bodies() {
        let mut a = altstep(
            "as_bad",
            vec![
                branch(op(ReceiveKind::CatchTimeout, "p", None), vec![]),
                branch(receive("p", "x"), vec![continue_stmt()]),
            ],
        );
        let report = check_altstep(&mut a);
        assert_eq!(report.errors.len(), 2);
        assert!(a.branches[1].body.statements[0].erroneous);
    }

    #[test]
    fn branches_after_else_are_warned() {
        let mut f = function(
            "f",
            vec![alt(vec![
                branch(receive("p", "a"), vec![]),
                else_branch(vec![]),
                branch(receive("p", "b"), vec![]),
            ])],
        );
        let report = check_function(&mut f);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, "ttcn::semantic::unreachable_branch");
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn errors_are_batched_across_siblings() {
        let mut block = block(vec![
            repeat(),
            plain("log(1)"),
            continue_stmt(),
            if_else("c", vec![break_stmt()], Some(vec![repeat()])),
        ]);
        let report = check_block(&mut block);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.errors.len(), 4);
    }
}
