//! The per-construct scheduling loop.
//!
//! One generated construct looks like this:
//!
//! ```text
//! entry:   evaluate every guard once, mark the default registry MAYBE,
//!          take a non-blocking snapshot
//! pass:    for each branch in declaration order:
//!              if MAYBE: attempt; YES -> body, REPEAT -> pass, BREAK -> exit
//!          else branch: go to its body
//!          defaults (else-less alt and interleave only), handled like an
//!          altstep branch
//! check:   all NO -> no-match error, otherwise blocking snapshot -> pass
//! ```
//!
//! Altstep bodies run a single pass and finish with their status instead of
//! waiting; call response parts have no defaults.

use tracing::{debug, warn};

use ttcn_ast::ast::{AltBranch, AltstepDef, GuardOperation, Span};

use crate::classify::{contains_repeat_statement, needs_repeat_exit};
use crate::machine::*;

use super::{Lowerer, LoweringError};

/// One branch as the scheduler sees it.
#[derive(Debug, Clone)]
pub(crate) struct ScheduledBranch {
    pub guard: GuardCond,
    pub operation: GuardOperation,
    pub body: Label,
    /// BREAK target of this branch's altstep operation, if it differs from
    /// the construct's.
    pub on_break: Option<Label>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct AltBlock {
    pub kind: AltKind,
    pub branches: Vec<ScheduledBranch>,
    pub entry: Label,
    pub has_else: bool,
    pub has_repeat_statement: bool,
    pub span: Span,
}

/// Where the generated pass loop leaves to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exits {
    /// BREAK from an altstep operation or from the default registry.
    pub on_break: Label,
    /// The default registry matched.
    pub after_default: Label,
    /// REPEAT from an attempt; `None` restarts the pass in place.
    pub on_repeat: Option<Label>,
    /// Unresolved pass for single-pass bodies: (all NO, otherwise).
    /// `None` suspends on a blocking snapshot instead.
    pub on_unresolved: Option<(Label, Label)>,
}

impl Lowerer<'_> {
    /// Emit the scheduling loop of `alt`, starting at `alt.entry`. Branch
    /// bodies are left to the caller.
    pub(crate) fn generate(&mut self, alt: AltBlock, exits: Exits) -> Result<(), LoweringError> {
        if alt.branches.is_empty() {
            return Err(LoweringError::EmptyConstruct {
                kind: kind_name(alt.kind),
                span: alt.span,
            });
        }
        let consult_defaults = self.options.consult_defaults
            && !alt.has_else
            && matches!(alt.kind, AltKind::Alt | AltKind::Interleave);

        let slots: Vec<StatusSlot> = alt
            .branches
            .iter()
            .map(|_| self.alloc.new_status_slot())
            .collect();
        let default_slot = consult_defaults.then(|| self.alloc.new_status_slot());

        self.start_block(alt.entry);
        for (branch, slot) in alt.branches.iter().zip(&slots) {
            if branch.guard.is_trivial() {
                self.emit(Instr::SetStatus {
                    slot: *slot,
                    status: StatusCode::Maybe,
                });
            } else {
                self.emit(Instr::EvalGuard {
                    slot: *slot,
                    guard: branch.guard.clone(),
                });
            }
        }
        if let Some(slot) = default_slot {
            self.emit(Instr::SetStatus {
                slot,
                status: StatusCode::Maybe,
            });
        }
        if alt.kind != AltKind::AltstepBody {
            self.emit(Instr::Snapshot { blocking: false });
        }
        let pass = self.fresh_label();
        self.start_block(pass);

        let mut resolved_by_else = false;
        for (i, (branch, slot)) in alt.branches.iter().zip(&slots).enumerate() {
            let slot = *slot;
            let next = self.fresh_label();
            match Operation::from_guard(&branch.operation) {
                None if branch.guard.is_trivial() => {
                    self.terminate(Terminator::Goto(branch.body));
                    let dropped = alt.branches.len() - i - 1;
                    if dropped > 0 && self.options.warn_unreachable_branches {
                        warn!(
                            construct = %alt.kind,
                            span = %alt.span,
                            dropped,
                            "branches after else can never be chosen"
                        );
                    }
                    resolved_by_else = true;
                    break;
                }
                None => {
                    self.terminate(Terminator::IfStatus {
                        slot,
                        status: StatusCode::Maybe,
                        then: branch.body,
                        else_: next,
                    });
                }
                Some(op) => {
                    let attempt = self.fresh_label();
                    self.terminate(Terminator::IfStatus {
                        slot,
                        status: StatusCode::Maybe,
                        then: attempt,
                        else_: next,
                    });
                    self.start_block(attempt);
                    let is_altstep = op.is_altstep();
                    self.emit(Instr::Attempt { slot, op });
                    let on_repeat = if needs_repeat_exit(&branch.operation) {
                        Some(self.repeat_exit(slot, pass, exits.on_repeat))
                    } else {
                        None
                    };
                    let on_break = is_altstep.then(|| branch.on_break.unwrap_or(exits.on_break));
                    self.terminate(Terminator::Dispatch {
                        slot,
                        on_yes: branch.body,
                        on_repeat,
                        on_break,
                        otherwise: next,
                    });
                }
            }
            self.start_block(next);
        }

        let mut all_slots = slots.clone();
        if !resolved_by_else {
            if let Some(slot) = default_slot {
                let attempt = self.fresh_label();
                let check = self.fresh_label();
                self.terminate(Terminator::IfStatus {
                    slot,
                    status: StatusCode::Maybe,
                    then: attempt,
                    else_: check,
                });
                self.start_block(attempt);
                self.emit(Instr::TryDefaults { slot });
                let on_repeat = self.repeat_exit(slot, pass, exits.on_repeat);
                self.terminate(Terminator::Dispatch {
                    slot,
                    on_yes: exits.after_default,
                    on_repeat: Some(on_repeat),
                    on_break: Some(exits.on_break),
                    otherwise: check,
                });
                self.start_block(check);
                all_slots.push(slot);
            }
            match exits.on_unresolved {
                Some((all_no, otherwise)) => self.terminate(Terminator::IfAllNo {
                    slots: all_slots,
                    then: all_no,
                    else_: otherwise,
                }),
                None => {
                    let fail = self.detached(Vec::new(), Terminator::NoMatch { span: alt.span });
                    let wait = self.fresh_label();
                    self.terminate(Terminator::IfAllNo {
                        slots: all_slots,
                        then: fail,
                        else_: wait,
                    });
                    self.start_block(wait);
                    self.emit(Instr::Snapshot { blocking: true });
                    self.terminate(Terminator::Goto(pass));
                }
            }
        }

        debug!(
            construct = %alt.kind,
            span = %alt.span,
            branches = alt.branches.len(),
            defaults = default_slot.is_some(),
            "scheduled construct"
        );
        self.constructs.push(ConstructInfo {
            kind: alt.kind,
            span: alt.span,
            entry: alt.entry,
            slots,
            default_slot,
            has_else: alt.has_else,
            has_repeat_statement: alt.has_repeat_statement,
        });
        Ok(())
    }

    /// REPEAT re-arms the reporting slot and restarts the pass without a
    /// new snapshot, unless the construct hands REPEAT to its caller.
    fn repeat_exit(&mut self, slot: StatusSlot, pass: Label, outer: Option<Label>) -> Label {
        match outer {
            Some(label) => label,
            None => self.detached(
                vec![Instr::SetStatus {
                    slot,
                    status: StatusCode::Maybe,
                }],
                Terminator::Goto(pass),
            ),
        }
    }

    /// Lower an `alt` statement or a call response part outside interleaves.
    pub(crate) fn lower_alt(
        &mut self,
        kind: AltKind,
        branches: &[AltBranch],
        span: Span,
        targets: ControlTargets,
    ) -> Result<(), LoweringError> {
        self.enter(span)?;
        let branches = reachable_branches(branches);
        let entry = self.fresh_label();
        let exit = self.fresh_label();
        let bodies: Vec<Label> = branches.iter().map(|_| self.fresh_label()).collect();
        let alt = AltBlock {
            kind,
            branches: branches
                .iter()
                .zip(&bodies)
                .map(|(b, body)| ScheduledBranch {
                    guard: GuardCond::from_expr(b.guard.clone()),
                    operation: b.operation.clone(),
                    body: *body,
                    on_break: None,
                    span: b.span,
                })
                .collect(),
            entry,
            has_else: branches.iter().any(|b| b.operation.is_else()),
            has_repeat_statement: branches.iter().any(|b| contains_repeat_statement(&b.body)),
            span,
        };
        self.generate(
            alt,
            Exits {
                on_break: exit,
                after_default: exit,
                on_repeat: None,
                on_unresolved: None,
            },
        )?;
        // `repeat` in a body re-activates the construct: guards are evaluated
        // again and a fresh snapshot is taken.
        let body_targets = ControlTargets {
            on_break: Some(exit),
            on_repeat: Some(entry),
            ..targets
        };
        for (branch, body) in branches.iter().zip(bodies) {
            self.start_block(body);
            self.lower_block(&branch.body, body_targets)?;
            self.seal(Terminator::Goto(exit));
        }
        self.start_block(exit);
        self.leave();
        Ok(())
    }

    /// Lower an altstep definition: one pass over its branches, finishing
    /// with YES, REPEAT, BREAK, MAYBE or NO.
    pub(crate) fn lower_altstep_body(&mut self, def: &AltstepDef) -> Result<(), LoweringError> {
        self.enter(def.span)?;
        let branches = reachable_branches(&def.branches);
        let finish_yes = self.detached(Vec::new(), Terminator::Finish(StatusCode::Yes));
        let finish_repeat = self.detached(Vec::new(), Terminator::Finish(StatusCode::Repeat));
        let finish_break = self.detached(Vec::new(), Terminator::Finish(StatusCode::Break));
        let finish_no = self.detached(Vec::new(), Terminator::Finish(StatusCode::No));
        let finish_maybe = self.detached(Vec::new(), Terminator::Finish(StatusCode::Maybe));

        let entry = self.fresh_label();
        let bodies: Vec<Label> = branches.iter().map(|_| self.fresh_label()).collect();
        let alt = AltBlock {
            kind: AltKind::AltstepBody,
            branches: branches
                .iter()
                .zip(&bodies)
                .map(|(b, body)| ScheduledBranch {
                    guard: GuardCond::from_expr(b.guard.clone()),
                    operation: b.operation.clone(),
                    body: *body,
                    on_break: None,
                    span: b.span,
                })
                .collect(),
            entry,
            has_else: branches.iter().any(|b| b.operation.is_else()),
            has_repeat_statement: branches.iter().any(|b| contains_repeat_statement(&b.body)),
            span: def.span,
        };
        self.generate(
            alt,
            Exits {
                on_break: finish_break,
                after_default: finish_yes,
                on_repeat: Some(finish_repeat),
                on_unresolved: Some((finish_no, finish_maybe)),
            },
        )?;
        let body_targets = ControlTargets {
            on_break: Some(finish_break),
            on_continue: None,
            on_repeat: Some(finish_repeat),
            on_return: Some(finish_yes),
        };
        for (branch, body) in branches.iter().zip(bodies) {
            self.start_block(body);
            self.lower_block(&branch.body, body_targets)?;
            self.seal(Terminator::Goto(finish_yes));
        }
        self.leave();
        Ok(())
    }
}

/// Branches up to and including the first unguarded else; the rest can
/// never be chosen.
pub(super) fn reachable_branches(branches: &[AltBranch]) -> &[AltBranch] {
    match branches
        .iter()
        .position(|b| b.operation.is_else() && b.guard.is_none())
    {
        Some(i) => &branches[..=i],
        None => branches,
    }
}

pub(super) fn kind_name(kind: AltKind) -> &'static str {
    match kind {
        AltKind::Alt => "alt",
        AltKind::Interleave => "interleave",
        AltKind::AltstepBody => "altstep",
        AltKind::CallResponse => "call",
    }
}
