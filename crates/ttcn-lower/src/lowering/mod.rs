#![allow(unused_assignments)]

mod config;
mod interleave;
mod scheduler;
mod statements;
mod validation;

use indexmap::IndexMap;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::debug;

use ttcn_ast::ast::{self, AltstepDef, FunctionDef, Span, Statement};

use crate::alloc::Allocator;
use crate::classify::contains_receiving;
use crate::machine::*;

pub use config::LoweringOptions;
pub use validation::{find_erroneous, find_span_for_error, validate_machine};

#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("Lowering invariant violated: {message}")]
    InvariantViolation { message: String, span: Span },
    #[error("{kind} at {span} was rejected by the context checker")]
    ErroneousStatement { kind: &'static str, span: Span },
    #[error("{statement} at {span} has no enclosing construct to transfer control to")]
    MissingControlTarget { statement: &'static str, span: Span },
    #[error("{kind} at {span} contains no receiving statement and cannot be compiled on its own")]
    NotACompilableConstruct { kind: &'static str, span: Span },
    #[error("Nesting depth {depth} exceeds the limit of {limit}")]
    NestingTooDeep {
        depth: usize,
        limit: usize,
        span: Span,
    },
    #[error("{kind} at {span} has no branches")]
    EmptyConstruct { kind: &'static str, span: Span },
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LoweringError {
    pub fn span(&self) -> Option<Span> {
        match self {
            LoweringError::InvariantViolation { span, .. }
            | LoweringError::ErroneousStatement { span, .. }
            | LoweringError::MissingControlTarget { span, .. }
            | LoweringError::NotACompilableConstruct { span, .. }
            | LoweringError::NestingTooDeep { span, .. }
            | LoweringError::EmptyConstruct { span, .. } => Some(*span),
            LoweringError::Unsupported(_) => None,
        }
    }
}

/// A lowering error enriched with source span information for pretty-printed diagnostics.
#[derive(Debug, Error, Diagnostic)]
#[error("{inner}")]
#[allow(unused_assignments)]
pub struct SpannedLoweringError {
    #[source_code]
    pub src: NamedSource<String>,
    pub inner: LoweringError,
    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl SpannedLoweringError {
    fn new(err: LoweringError, source: &str, filename: &str, span: Option<Span>) -> Self {
        Self {
            src: NamedSource::new(filename, source.to_string()),
            inner: err,
            span: span.map(|s| SourceSpan::new(s.start.into(), s.len())),
        }
    }
}

/// Compile one alt-like statement (or a structured statement containing
/// one) into a stand-alone machine.
pub fn compile(stmt: &Statement, options: &LoweringOptions) -> Result<StateMachine, LoweringError> {
    if !contains_receiving(stmt) {
        return Err(LoweringError::NotACompilableConstruct {
            kind: stmt.kind.name(),
            span: stmt.span,
        });
    }
    let mut alloc = Allocator::new();
    let mut lowerer = Lowerer::new(&mut alloc, options);
    let entry = lowerer.open_entry();
    lowerer.lower_statements(std::slice::from_ref(stmt), ControlTargets::default())?;
    lowerer.seal(Terminator::Exit);
    lowerer.finish(stmt.kind.name().to_string(), MachineKind::Construct, entry)
}

/// Compile a function, testcase or control body.
pub fn compile_function(
    def: &FunctionDef,
    options: &LoweringOptions,
) -> Result<StateMachine, LoweringError> {
    let mut alloc = Allocator::new();
    let mut lowerer = Lowerer::new(&mut alloc, options);
    let entry = lowerer.open_entry();
    lowerer.lower_block(&def.body, ControlTargets::default())?;
    lowerer.seal(Terminator::Exit);
    lowerer.finish(def.name.clone(), MachineKind::Function, entry)
}

/// Compile an altstep into a machine that runs one pass of its branches
/// and finishes with the resulting status.
pub fn compile_altstep(
    def: &AltstepDef,
    options: &LoweringOptions,
) -> Result<StateMachine, LoweringError> {
    let mut alloc = Allocator::new();
    let mut lowerer = Lowerer::new(&mut alloc, options);
    let entry = lowerer.open_entry();
    lowerer.lower_altstep_body(def)?;
    lowerer.finish(def.name.clone(), MachineKind::Altstep, entry)
}

/// [`compile`] with rich source-span diagnostics via miette.
#[allow(clippy::result_large_err)]
pub fn compile_with_source(
    stmt: &Statement,
    options: &LoweringOptions,
    source: &str,
    filename: &str,
) -> Result<StateMachine, SpannedLoweringError> {
    compile(stmt, options).map_err(|err| {
        let span = find_span_for_error(&err, stmt.span);
        SpannedLoweringError::new(err, source, filename, span)
    })
}

#[allow(clippy::result_large_err)]
pub fn compile_function_with_source(
    def: &FunctionDef,
    options: &LoweringOptions,
    source: &str,
    filename: &str,
) -> Result<StateMachine, SpannedLoweringError> {
    compile_function(def, options).map_err(|err| {
        let span = find_span_for_error(&err, def.span);
        SpannedLoweringError::new(err, source, filename, span)
    })
}

#[allow(clippy::result_large_err)]
pub fn compile_altstep_with_source(
    def: &AltstepDef,
    options: &LoweringOptions,
    source: &str,
    filename: &str,
) -> Result<StateMachine, SpannedLoweringError> {
    compile_altstep(def, options).map_err(|err| {
        let span = find_span_for_error(&err, def.span);
        SpannedLoweringError::new(err, source, filename, span)
    })
}

/// Per-function lowering state: the block table under construction and the
/// open block that instructions are appended to.
pub(crate) struct Lowerer<'a> {
    alloc: &'a mut Allocator,
    options: &'a LoweringOptions,
    blocks: IndexMap<Label, BasicBlock>,
    current: Option<(Label, Vec<Instr>)>,
    constructs: Vec<ConstructInfo>,
    interleaves: Vec<InterleaveTable>,
    /// The outermost interleave being flattened, if any.
    flat: Option<interleave::FlatInterleave>,
    /// Interleave arms enclosing the statement being lowered, innermost last.
    arms: Vec<interleave::ArmContext>,
    depth: usize,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(alloc: &'a mut Allocator, options: &'a LoweringOptions) -> Self {
        Self {
            alloc,
            options,
            blocks: IndexMap::new(),
            current: None,
            constructs: Vec::new(),
            interleaves: Vec::new(),
            flat: None,
            arms: Vec::new(),
            depth: 0,
        }
    }

    fn fresh_label(&mut self) -> Label {
        self.alloc.new_label()
    }

    fn open_entry(&mut self) -> Label {
        let entry = self.fresh_label();
        self.start_block(entry);
        entry
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Open `label`; an open block falls through into it.
    fn start_block(&mut self, label: Label) {
        if self.is_open() {
            self.terminate(Terminator::Goto(label));
        }
        self.current = Some((label, Vec::new()));
    }

    fn ensure_open(&mut self) {
        if !self.is_open() {
            let label = self.fresh_label();
            self.current = Some((label, Vec::new()));
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.ensure_open();
        if let Some((_, instrs)) = self.current.as_mut() {
            instrs.push(instr);
        }
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.ensure_open();
        if let Some((label, instrs)) = self.current.take() {
            self.blocks.insert(
                label,
                BasicBlock {
                    label,
                    instrs,
                    terminator,
                },
            );
        }
    }

    /// Terminate the open block, if any; used where control may already
    /// have left through a break, continue or repeat.
    fn seal(&mut self, terminator: Terminator) {
        if self.is_open() {
            self.terminate(terminator);
        }
    }

    /// Add a complete block without disturbing the open one.
    fn detached(&mut self, instrs: Vec<Instr>, terminator: Terminator) -> Label {
        let label = self.fresh_label();
        self.blocks.insert(
            label,
            BasicBlock {
                label,
                instrs,
                terminator,
            },
        );
        label
    }

    fn enter(&mut self, span: Span) -> Result<(), LoweringError> {
        self.depth += 1;
        if self.depth > self.options.max_nesting_depth {
            return Err(LoweringError::NestingTooDeep {
                depth: self.depth,
                limit: self.options.max_nesting_depth,
                span,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn finish(
        self,
        name: String,
        kind: MachineKind,
        entry: Label,
    ) -> Result<StateMachine, LoweringError> {
        if let Some((label, _)) = &self.current {
            return Err(LoweringError::InvariantViolation {
                message: format!("block {label} left without terminator"),
                span: Span::synthetic(),
            });
        }
        let machine = StateMachine {
            name,
            kind,
            entry,
            blocks: self.blocks,
            num_slots: self.alloc.status_slots_allocated(),
            num_state_vars: self.alloc.state_variables_allocated(),
            constructs: self.constructs,
            interleaves: self.interleaves,
        };
        validate_machine(&machine)?;
        debug!(
            machine = %machine.name,
            blocks = machine.blocks.len(),
            constructs = machine.constructs.len(),
            interleaves = machine.interleaves.len(),
            slots = machine.num_slots,
            state_vars = machine.num_state_vars,
            "lowered machine"
        );
        Ok(machine)
    }
}

/// Conjunction of two optional guard expressions.
fn conjoin(a: Option<ast::Expr>, b: Option<ast::Expr>) -> Option<ast::Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(ast::Expr::new(format!("({a}) and ({b})"), a.span)),
        (a, None) => a,
        (None, b) => b,
    }
}
