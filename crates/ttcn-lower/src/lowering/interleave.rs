//! Interleave flattening.
//!
//! Every arm of an interleave gets a state variable holding its phase:
//! 0 before the arm has started, `p` while it waits at its `p`-th receiving
//! point, and a terminal value once it ran to the end. The arms' code is
//! emitted once; each receiving point stores its phase and jumps to the
//! shared head, and contributes a synthetic branch guarded by that phase to
//! one merged alt. Taking the branch resumes the arm right after the point.
//!
//! ```text
//! head:  start rows       (arm not started -> run it up to its first point)
//!        completion rows  (nested interleave done -> continue its arm)
//!        all arms terminal -> exit, otherwise -> merged alt
//! ```
//!
//! Nested alts contribute one branch per alternative under a single point;
//! nested interleaves get private state variables qualified by the phase of
//! the arm that contains them.

use tracing::debug;

use ttcn_ast::ast::*;

use crate::classify::{contains_receiving, contains_repeat_statement};
use crate::machine::*;

use super::scheduler::{kind_name, reachable_branches, AltBlock, Exits, ScheduledBranch};
use super::{conjoin, Lowerer, LoweringError};

/// One statement sequence running interleaved with its siblings.
#[derive(Debug, Clone)]
pub(crate) struct Arm {
    /// Qualifies the arm's first receiving point.
    pub guard: Option<Expr>,
    pub statements: Vec<Statement>,
    pub span: Span,
}

impl Arm {
    pub(crate) fn from_branch(branch: &AltBranch) -> Result<Self, LoweringError> {
        let kind = match &branch.operation {
            GuardOperation::Receiving(op) => StatementKind::Receive(op.clone()),
            GuardOperation::AltstepInstance(r) => StatementKind::Altstep(r.clone()),
            GuardOperation::AltstepInvocation(e) => StatementKind::AltstepInvoke(e.clone()),
            GuardOperation::Else => {
                return Err(LoweringError::InvariantViolation {
                    message: "else branch inside interleave".into(),
                    span: branch.span,
                })
            }
        };
        let mut statements = Vec::with_capacity(branch.body.statements.len() + 1);
        statements.push(Statement::new(kind, branch.span));
        statements.extend(branch.body.statements.iter().cloned());
        Ok(Self {
            guard: branch.guard.clone(),
            statements,
            span: branch.span,
        })
    }

    fn is_stateful(&self) -> bool {
        self.statements.iter().any(contains_receiving)
    }
}

/// Collects the merged alt of the outermost interleave.
#[derive(Debug)]
pub(crate) struct FlatInterleave {
    head: Label,
    branches: Vec<ScheduledBranch>,
    rows: Vec<(Vec<PhaseTest>, Label)>,
}

#[derive(Debug)]
pub(crate) struct ArmContext {
    var: StateVar,
    next_phase: u32,
    prefix: Vec<PhaseTest>,
    pending_guard: Option<Expr>,
    /// Re-arms the innermost receiving point lowered so far.
    rearm: Option<Label>,
}

struct Point {
    var: StateVar,
    phase: u32,
    phases: Vec<PhaseTest>,
    guard: Option<Expr>,
}

fn outside_interleave(span: Span) -> LoweringError {
    LoweringError::InvariantViolation {
        message: "receiving point lowered outside an interleave arm".into(),
        span,
    }
}

impl Lowerer<'_> {
    pub(crate) fn in_interleave_arm(&self) -> bool {
        !self.arms.is_empty()
    }

    pub(crate) fn current_rearm(&self) -> Option<Label> {
        self.arms.last().and_then(|a| a.rearm)
    }

    fn flat_mut(&mut self, span: Span) -> Result<&mut FlatInterleave, LoweringError> {
        self.flat.as_mut().ok_or_else(|| outside_interleave(span))
    }

    fn next_point(&mut self, span: Span) -> Result<Point, LoweringError> {
        let ctx = self.arms.last_mut().ok_or_else(|| outside_interleave(span))?;
        let phase = ctx.next_phase;
        ctx.next_phase += 1;
        let mut phases = ctx.prefix.clone();
        phases.push(PhaseTest {
            var: ctx.var,
            value: phase,
        });
        Ok(Point {
            var: ctx.var,
            phase,
            phases,
            guard: ctx.pending_guard.take(),
        })
    }

    /// Store the point's phase and yield to the head. Returns the block that
    /// re-arms the point.
    fn suspend_at(&mut self, point: &Point, span: Span) -> Result<Label, LoweringError> {
        let head = self.flat_mut(span)?.head;
        let set = Instr::SetState {
            var: point.var,
            value: point.phase,
        };
        self.emit(set.clone());
        self.terminate(Terminator::Goto(head));
        Ok(self.detached(vec![set], Terminator::Goto(head)))
    }

    fn set_rearm(&mut self, rearm: Label) {
        if let Some(ctx) = self.arms.last_mut() {
            ctx.rearm = Some(rearm);
        }
    }

    /// A standalone receiving operation or altstep call inside an arm.
    pub(crate) fn lower_point_operation(
        &mut self,
        operation: GuardOperation,
        span: Span,
    ) -> Result<(), LoweringError> {
        let point = self.next_point(span)?;
        let rearm = self.suspend_at(&point, span)?;
        let resume = self.fresh_label();
        self.flat_mut(span)?.branches.push(ScheduledBranch {
            guard: GuardCond {
                phases: point.phases,
                expr: point.guard,
            },
            operation,
            body: resume,
            on_break: Some(resume),
            span,
        });
        self.set_rearm(rearm);
        self.start_block(resume);
        Ok(())
    }

    /// An alt or call response part inside an arm: one point, one merged
    /// branch per alternative.
    pub(crate) fn lower_point_alt(
        &mut self,
        kind: AltKind,
        branches: &[AltBranch],
        span: Span,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        self.enter(span)?;
        if branches.is_empty() {
            return Err(LoweringError::EmptyConstruct {
                kind: kind_name(kind),
                span,
            });
        }
        let branches = reachable_branches(branches);
        let point = self.next_point(span)?;
        let rearm = self.suspend_at(&point, span)?;
        let join = self.fresh_label();
        let bodies: Vec<Label> = branches.iter().map(|_| self.fresh_label()).collect();
        for (branch, body) in branches.iter().zip(&bodies) {
            let scheduled = ScheduledBranch {
                guard: GuardCond {
                    phases: point.phases.clone(),
                    expr: conjoin(point.guard.clone(), branch.guard.clone()),
                },
                operation: branch.operation.clone(),
                body: *body,
                on_break: Some(join),
                span: branch.span,
            };
            self.flat_mut(span)?.branches.push(scheduled);
        }
        let body_targets = ControlTargets {
            on_break: Some(join),
            on_repeat: Some(rearm),
            ..targets
        };
        for (branch, body) in branches.iter().zip(bodies) {
            self.start_block(body);
            self.lower_block(&branch.body, body_targets)?;
            self.seal(Terminator::Goto(join));
        }
        self.start_block(join);
        self.set_rearm(rearm);
        self.leave();
        Ok(())
    }

    pub(crate) fn lower_interleave(
        &mut self,
        construct: &InterleaveConstruct,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        if construct.branches.is_empty() {
            return Err(LoweringError::EmptyConstruct {
                kind: "interleave",
                span: construct.span,
            });
        }
        let mut arms = construct
            .branches
            .iter()
            .map(Arm::from_branch)
            .collect::<Result<Vec<_>, _>>()?;
        let has_repeat_statement = construct
            .branches
            .iter()
            .any(|b| contains_repeat_statement(&b.body));

        if self.flat.is_none() {
            return self.flatten(&arms, construct.span, has_repeat_statement, targets);
        }

        // Nested: the enclosing arm waits at one point until every inner arm
        // is terminal.
        self.enter(construct.span)?;
        let point = self.next_point(construct.span)?;
        self.emit(Instr::SetState {
            var: point.var,
            value: point.phase,
        });
        if point.guard.is_some() {
            for arm in &mut arms {
                arm.guard = conjoin(point.guard.clone(), arm.guard.take());
            }
        }
        let exit = self.fresh_label();
        let table = self.lower_arms(&arms, point.phases.clone(), exit, construct.span, targets)?;
        let mut done = point.phases;
        done.extend(terminal_tests(&table));
        self.flat_mut(construct.span)?.rows.push((done, exit));
        self.start_block(exit);
        self.leave();
        Ok(())
    }

    /// Flatten an outermost set of interleaved arms into the head dispatch
    /// and one merged alt.
    pub(crate) fn flatten(
        &mut self,
        arms: &[Arm],
        span: Span,
        has_repeat_statement: bool,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        self.enter(span)?;
        let head = self.fresh_label();
        let exit = self.fresh_label();
        let merged = self.fresh_label();
        self.flat = Some(FlatInterleave {
            head,
            branches: Vec::new(),
            rows: Vec::new(),
        });
        let lowered = self.lower_arms(arms, Vec::new(), exit, span, targets);
        let flat = self.flat.take().ok_or_else(|| outside_interleave(span))?;
        let table = lowered?;

        self.start_block(head);
        for (tests, target) in flat.rows {
            let next = self.fresh_label();
            self.terminate(Terminator::IfStates {
                tests,
                then: target,
                else_: next,
            });
            self.start_block(next);
        }
        let terminal = terminal_tests(&table);
        if terminal.is_empty() {
            self.terminate(Terminator::Goto(exit));
        } else {
            self.terminate(Terminator::IfStates {
                tests: terminal,
                then: exit,
                else_: merged,
            });
            // Else rows of nested alts are phase-guarded: they only fire while
            // their point is live, so the merged alt still consults defaults.
            let has_else = flat
                .branches
                .iter()
                .any(|b| b.operation.is_else() && b.guard.is_trivial());
            self.generate(
                AltBlock {
                    kind: AltKind::Interleave,
                    branches: flat.branches,
                    entry: merged,
                    has_else,
                    has_repeat_statement,
                    span,
                },
                Exits {
                    on_break: exit,
                    after_default: head,
                    on_repeat: None,
                    on_unresolved: None,
                },
            )?;
        }
        self.start_block(exit);
        self.leave();
        Ok(())
    }

    /// Emit the entry code of one interleave (stateless arms, state reset)
    /// followed by the code of every stateful arm.
    fn lower_arms(
        &mut self,
        arms: &[Arm],
        prefix: Vec<PhaseTest>,
        exit: Label,
        span: Span,
        targets: ControlTargets,
    ) -> Result<InterleaveTable, LoweringError> {
        let head = self.flat_mut(span)?.head;
        let branches_before = self.flat_mut(span)?.branches.len();
        let arm_targets = ControlTargets {
            on_break: Some(exit),
            on_repeat: None,
            ..targets
        };

        for arm in arms.iter().filter(|a| !a.is_stateful()) {
            match &arm.guard {
                Some(guard) => {
                    let run = self.fresh_label();
                    let after = self.fresh_label();
                    self.terminate(Terminator::Branch {
                        cond: guard.clone(),
                        then: run,
                        else_: after,
                    });
                    self.start_block(run);
                    self.lower_statements(&arm.statements, arm_targets)?;
                    self.seal(Terminator::Goto(after));
                    self.start_block(after);
                }
                None => self.lower_statements(&arm.statements, arm_targets)?,
            }
        }

        let vars: Vec<Option<StateVar>> = arms
            .iter()
            .map(|a| a.is_stateful().then(|| self.alloc.new_state_variable()))
            .collect();
        for var in vars.iter().flatten() {
            self.emit(Instr::SetState {
                var: *var,
                value: 0,
            });
        }
        self.terminate(Terminator::Goto(head));

        let mut infos = Vec::with_capacity(arms.len());
        for (arm, var) in arms.iter().zip(vars) {
            let Some(var) = var else {
                infos.push(InterleaveArm {
                    var: None,
                    terminal: 0,
                    span: arm.span,
                });
                continue;
            };
            let start = self.fresh_label();
            let mut not_started = prefix.clone();
            not_started.push(PhaseTest { var, value: 0 });
            self.flat_mut(span)?.rows.push((not_started, start));

            self.arms.push(ArmContext {
                var,
                next_phase: 1,
                prefix: prefix.clone(),
                pending_guard: arm.guard.clone(),
                rearm: None,
            });
            self.start_block(start);
            let lowered = self.lower_statements(&arm.statements, arm_targets);
            let ctx = self.arms.pop().ok_or_else(|| outside_interleave(arm.span))?;
            lowered?;
            let terminal = ctx.next_phase;
            if self.is_open() {
                self.emit(Instr::SetState {
                    var,
                    value: terminal,
                });
                self.terminate(Terminator::Goto(head));
            }
            infos.push(InterleaveArm {
                var: Some(var),
                terminal,
                span: arm.span,
            });
        }

        let branches = self.flat_mut(span)?.branches.len() - branches_before;
        let table = InterleaveTable {
            span,
            head,
            exit,
            arms: infos,
            prefix,
            branches,
        };
        debug!(
            span = %span,
            arms = table.arms.len(),
            state_vars = table.vars().count(),
            branches,
            nested = !table.prefix.is_empty(),
            "flattened interleave"
        );
        self.interleaves.push(table.clone());
        Ok(table)
    }
}

fn terminal_tests(table: &InterleaveTable) -> Vec<PhaseTest> {
    table
        .arms
        .iter()
        .filter_map(|a| {
            a.var.map(|var| PhaseTest {
                var,
                value: a.terminal,
            })
        })
        .collect()
}
