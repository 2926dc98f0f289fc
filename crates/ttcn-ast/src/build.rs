//! Convenience constructors for behaviour trees.
//!
//! Front ends produce these trees from parsed and checked source; tests,
//! benches and tools use the helpers here to write them down compactly.
//! Every node gets a synthetic span unless one is attached explicitly.

use crate::ast::*;

pub fn expr(text: &str) -> Expr {
    Expr::new(text, Span::synthetic())
}

pub fn block(statements: Vec<Statement>) -> Block {
    Block::new(statements, Span::synthetic())
}

fn stmt(kind: StatementKind) -> Statement {
    Statement::new(kind, Span::synthetic())
}

pub fn plain(text: &str) -> Statement {
    stmt(StatementKind::Plain(expr(text)))
}

pub fn op(kind: ReceiveKind, subject: &str, matching: Option<&str>) -> ReceivingOp {
    ReceivingOp {
        kind,
        subject: Some(subject.to_string()),
        matching: matching.map(expr),
        span: Span::synthetic(),
    }
}

pub fn receive(port: &str, matching: &str) -> ReceivingOp {
    op(ReceiveKind::Receive, port, Some(matching))
}

pub fn trigger(port: &str, matching: &str) -> ReceivingOp {
    op(ReceiveKind::Trigger, port, Some(matching))
}

pub fn timeout(timer: &str) -> ReceivingOp {
    op(ReceiveKind::Timeout, timer, None)
}

pub fn altstep_ref(name: &str) -> AltstepRef {
    AltstepRef {
        name: name.to_string(),
        args: Vec::new(),
        span: Span::synthetic(),
    }
}

impl From<ReceivingOp> for GuardOperation {
    fn from(op: ReceivingOp) -> Self {
        GuardOperation::Receiving(op)
    }
}

impl From<AltstepRef> for GuardOperation {
    fn from(r: AltstepRef) -> Self {
        GuardOperation::AltstepInstance(r)
    }
}

pub fn branch(operation: impl Into<GuardOperation>, body: Vec<Statement>) -> AltBranch {
    AltBranch {
        guard: None,
        operation: operation.into(),
        body: block(body),
        span: Span::synthetic(),
    }
}

pub fn guarded(
    guard: &str,
    operation: impl Into<GuardOperation>,
    body: Vec<Statement>,
) -> AltBranch {
    AltBranch {
        guard: Some(expr(guard)),
        ..branch(operation, body)
    }
}

pub fn else_branch(body: Vec<Statement>) -> AltBranch {
    branch(GuardOperation::Else, body)
}

pub fn alt(branches: Vec<AltBranch>) -> Statement {
    stmt(StatementKind::Alt(AltConstruct {
        branches,
        span: Span::synthetic(),
    }))
}

pub fn interleave(branches: Vec<AltBranch>) -> Statement {
    stmt(StatementKind::Interleave(InterleaveConstruct {
        branches,
        span: Span::synthetic(),
    }))
}

pub fn receive_stmt(op: ReceivingOp) -> Statement {
    stmt(StatementKind::Receive(op))
}

pub fn altstep_call(name: &str) -> Statement {
    stmt(StatementKind::Altstep(altstep_ref(name)))
}

pub fn call(call: &str, timeout: Option<&str>, response: Vec<AltBranch>) -> Statement {
    stmt(StatementKind::Call(CallStatement {
        call: expr(call),
        timeout: timeout.map(expr),
        response,
        span: Span::synthetic(),
    }))
}

pub fn if_else(
    cond: &str,
    then_block: Vec<Statement>,
    else_block: Option<Vec<Statement>>,
) -> Statement {
    stmt(StatementKind::If {
        cond: expr(cond),
        then_block: block(then_block),
        else_block: else_block.map(block),
    })
}

pub fn while_loop(cond: &str, body: Vec<Statement>) -> Statement {
    stmt(StatementKind::While {
        cond: expr(cond),
        body: block(body),
    })
}

pub fn do_while(body: Vec<Statement>, cond: &str) -> Statement {
    stmt(StatementKind::DoWhile {
        body: block(body),
        cond: expr(cond),
    })
}

pub fn for_loop(init: &str, cond: &str, step: &str, body: Vec<Statement>) -> Statement {
    stmt(StatementKind::For {
        init: Some(Box::new(plain(init))),
        cond: expr(cond),
        step: Some(Box::new(plain(step))),
        body: block(body),
    })
}

pub fn select(cases: Vec<(Option<&str>, Vec<Statement>)>) -> Statement {
    stmt(StatementKind::Select {
        cases: cases
            .into_iter()
            .map(|(condition, body)| SelectCase {
                condition: condition.map(expr),
                body: block(body),
                span: Span::synthetic(),
            })
            .collect(),
    })
}

pub fn repeat() -> Statement {
    stmt(StatementKind::Repeat)
}

pub fn break_stmt() -> Statement {
    stmt(StatementKind::Break)
}

pub fn continue_stmt() -> Statement {
    stmt(StatementKind::Continue)
}

pub fn return_stmt(value: Option<&str>) -> Statement {
    stmt(StatementKind::Return(value.map(expr)))
}

pub fn function(name: &str, body: Vec<Statement>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        body: block(body),
        span: Span::synthetic(),
    }
}

pub fn altstep(name: &str, branches: Vec<AltBranch>) -> AltstepDef {
    AltstepDef {
        name: name.to_string(),
        branches,
        span: Span::synthetic(),
    }
}

impl Statement {
    /// Attach a source span, also to the construct node the statement wraps.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        match &mut self.kind {
            StatementKind::Alt(c) => c.span = span,
            StatementKind::Interleave(c) => c.span = span,
            StatementKind::Call(c) => c.span = span,
            StatementKind::Receive(op) => op.span = span,
            StatementKind::Altstep(r) => r.span = span,
            _ => {}
        }
        self
    }
}
