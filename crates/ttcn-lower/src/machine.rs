use indexmap::IndexMap;
use std::fmt;

use ttcn_ast::ast::{AltstepRef, Block, Expr, GuardOperation, ReceivingOp, Span};

/// A resumption point, unique within one compiled machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Per-arm interleave progress variable. Value 0 means "not started".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StateVar(pub u32);

impl fmt::Display for StateVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Storage for one branch status (or the default-registry status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSlot(pub u32);

impl fmt::Display for StatusSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Status of one branch within one activation of a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    /// Guard not evaluated yet.
    #[default]
    Unchecked,
    /// Permanently disabled for this activation.
    No,
    /// Retry on the next pass.
    Maybe,
    /// Matched; run the body.
    Yes,
    /// Restart the construct without waiting for a new event.
    Repeat,
    /// Abort the construct as if it were a loop break.
    Break,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Unchecked => "UNCHECKED",
            StatusCode::No => "NO",
            StatusCode::Maybe => "MAYBE",
            StatusCode::Yes => "YES",
            StatusCode::Repeat => "REPEAT",
            StatusCode::Break => "BREAK",
        };
        f.write_str(s)
    }
}

/// How a piece of plain code handed to the collaborator finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlOutcome {
    #[default]
    FallThrough,
    Return,
    Break,
    Continue,
    Repeat,
}

/// An operation the collaborator attempts against the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    Receiving(ReceivingOp),
    AltstepInstance(AltstepRef),
    AltstepInvocation(Expr),
}

impl Operation {
    /// `None` for `else`, which is never attempted.
    pub fn from_guard(op: &GuardOperation) -> Option<Self> {
        match op {
            GuardOperation::Receiving(r) => Some(Operation::Receiving(r.clone())),
            GuardOperation::AltstepInstance(r) => Some(Operation::AltstepInstance(r.clone())),
            GuardOperation::AltstepInvocation(e) => Some(Operation::AltstepInvocation(e.clone())),
            GuardOperation::Else => None,
        }
    }

    pub fn is_altstep(&self) -> bool {
        !matches!(self, Operation::Receiving(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Receiving(op) => write!(f, "{op}"),
            Operation::AltstepInstance(r) => write!(f, "{r}"),
            Operation::AltstepInvocation(e) => write!(f, "{e}.apply()"),
        }
    }
}

/// `var == value` on an interleave state variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseTest {
    pub var: StateVar,
    pub value: u32,
}

impl fmt::Display for PhaseTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.var, self.value)
    }
}

/// Branch guard: a conjunction of phase tests and an optional boolean
/// expression. Phase tests are checked first and short-circuit.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GuardCond {
    pub phases: Vec<PhaseTest>,
    pub expr: Option<Expr>,
}

impl GuardCond {
    pub fn from_expr(expr: Option<Expr>) -> Self {
        Self {
            phases: Vec::new(),
            expr,
        }
    }

    /// Always true: no phase test and no expression.
    pub fn is_trivial(&self) -> bool {
        self.phases.is_empty() && self.expr.is_none()
    }
}

impl fmt::Display for GuardCond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.phases.iter().map(|p| p.to_string()).collect();
        if let Some(e) = &self.expr {
            parts.push(e.text.clone());
        }
        if parts.is_empty() {
            f.write_str("true")
        } else {
            write!(f, "[{}]", parts.join(" && "))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Instr {
    SetStatus { slot: StatusSlot, status: StatusCode },
    /// Evaluate a branch guard once: MAYBE when it holds, NO otherwise.
    EvalGuard { slot: StatusSlot, guard: GuardCond },
    Attempt { slot: StatusSlot, op: Operation },
    TryDefaults { slot: StatusSlot },
    Snapshot { blocking: bool },
    SetState { var: StateVar, value: u32 },
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::SetStatus { slot, status } => write!(f, "{slot} := {status}"),
            Instr::EvalGuard { slot, guard } => write!(f, "{slot} := eval {guard}"),
            Instr::Attempt { slot, op } => write!(f, "{slot} := attempt {op}"),
            Instr::TryDefaults { slot } => write!(f, "{slot} := defaults"),
            Instr::Snapshot { blocking: false } => f.write_str("snapshot"),
            Instr::Snapshot { blocking: true } => f.write_str("snapshot blocking"),
            Instr::SetState { var, value } => write!(f, "{var} := {value}"),
        }
    }
}

/// Where control goes when a `Run` reports something other than
/// fall-through. A missing return target means the machine itself returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlTargets {
    pub on_break: Option<Label>,
    pub on_continue: Option<Label>,
    pub on_repeat: Option<Label>,
    pub on_return: Option<Label>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    Goto(Label),
    /// Branch on a plain boolean condition evaluated by the collaborator.
    Branch { cond: Expr, then: Label, else_: Label },
    IfStatus {
        slot: StatusSlot,
        status: StatusCode,
        then: Label,
        else_: Label,
    },
    /// Route on the status an attempt just produced.
    Dispatch {
        slot: StatusSlot,
        on_yes: Label,
        on_repeat: Option<Label>,
        on_break: Option<Label>,
        otherwise: Label,
    },
    IfAllNo {
        slots: Vec<StatusSlot>,
        then: Label,
        else_: Label,
    },
    IfStates {
        tests: Vec<PhaseTest>,
        then: Label,
        else_: Label,
    },
    /// Hand plain sequential code to the collaborator.
    Run {
        code: Block,
        next: Label,
        targets: ControlTargets,
    },
    /// No branch of the construct at `span` can ever match.
    NoMatch { span: Span },
    /// An altstep body reports its status to the caller.
    Finish(StatusCode),
    Exit,
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<Label> {
        match self {
            Terminator::Goto(l) => vec![*l],
            Terminator::Branch { then, else_, .. }
            | Terminator::IfStatus { then, else_, .. }
            | Terminator::IfAllNo { then, else_, .. }
            | Terminator::IfStates { then, else_, .. } => vec![*then, *else_],
            Terminator::Dispatch {
                on_yes,
                on_repeat,
                on_break,
                otherwise,
                ..
            } => {
                let mut out = vec![*on_yes];
                out.extend(*on_repeat);
                out.extend(*on_break);
                out.push(*otherwise);
                out
            }
            Terminator::Run { next, targets, .. } => {
                let mut out = vec![*next];
                out.extend(targets.on_break);
                out.extend(targets.on_continue);
                out.extend(targets.on_repeat);
                out.extend(targets.on_return);
                out
            }
            Terminator::NoMatch { .. }
            | Terminator::Finish(_)
            | Terminator::Exit
            | Terminator::Unreachable => Vec::new(),
        }
    }
}

fn opt_label(l: &Option<Label>) -> String {
    l.map(|l| l.to_string()).unwrap_or_else(|| "-".into())
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto(l) => write!(f, "goto {l}"),
            Terminator::Branch { cond, then, else_ } => {
                write!(f, "if {cond} then {then} else {else_}")
            }
            Terminator::IfStatus {
                slot,
                status,
                then,
                else_,
            } => write!(f, "if {slot} == {status} then {then} else {else_}"),
            Terminator::Dispatch {
                slot,
                on_yes,
                on_repeat,
                on_break,
                otherwise,
            } => write!(
                f,
                "dispatch {slot} yes {on_yes} repeat {} break {} else {otherwise}",
                opt_label(on_repeat),
                opt_label(on_break)
            ),
            Terminator::IfAllNo { slots, then, else_ } => {
                let slots: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
                write!(f, "if all NO [{}] then {then} else {else_}", slots.join(", "))
            }
            Terminator::IfStates { tests, then, else_ } => {
                let tests: Vec<String> = tests.iter().map(|t| t.to_string()).collect();
                write!(f, "if [{}] then {then} else {else_}", tests.join(" && "))
            }
            Terminator::Run {
                code,
                next,
                targets,
            } => write!(
                f,
                "run {code} next {next} (break {}, continue {}, repeat {}, return {})",
                opt_label(&targets.on_break),
                opt_label(&targets.on_continue),
                opt_label(&targets.on_repeat),
                opt_label(&targets.on_return)
            ),
            Terminator::NoMatch { span } => write!(f, "no-match @{span}"),
            Terminator::Finish(status) => write!(f, "finish {status}"),
            Terminator::Exit => f.write_str("exit"),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlock {
    pub label: Label,
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MachineKind {
    Function,
    Altstep,
    /// A single statement compiled on its own.
    Construct,
}

/// The four shapes the scheduler generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AltKind {
    Alt,
    Interleave,
    AltstepBody,
    CallResponse,
}

impl fmt::Display for AltKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AltKind::Alt => write!(f, "alt"),
            AltKind::Interleave => write!(f, "interleave"),
            AltKind::AltstepBody => write!(f, "altstep"),
            AltKind::CallResponse => write!(f, "call-response"),
        }
    }
}

/// Metadata for one scheduled construct.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstructInfo {
    pub kind: AltKind,
    pub span: Span,
    pub entry: Label,
    pub slots: Vec<StatusSlot>,
    pub default_slot: Option<StatusSlot>,
    pub has_else: bool,
    pub has_repeat_statement: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct InterleaveArm {
    /// `None` for arms without receiving statements.
    pub var: Option<StateVar>,
    pub terminal: u32,
    pub span: Span,
}

/// Layout of one flattened interleave.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct InterleaveTable {
    pub span: Span,
    pub head: Label,
    pub exit: Label,
    pub arms: Vec<InterleaveArm>,
    /// Phase condition under which this interleave is live; empty at top level.
    pub prefix: Vec<PhaseTest>,
    /// Number of synthetic branches contributed to the merged alt.
    pub branches: usize,
}

impl InterleaveTable {
    pub fn vars(&self) -> impl Iterator<Item = StateVar> + '_ {
        self.arms.iter().filter_map(|a| a.var)
    }
}

/// A lowered function, altstep or construct: a label-addressable table of
/// basic blocks, kept in emission order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StateMachine {
    pub name: String,
    pub kind: MachineKind,
    pub entry: Label,
    pub blocks: IndexMap<Label, BasicBlock>,
    pub num_slots: u32,
    pub num_state_vars: u32,
    pub constructs: Vec<ConstructInfo>,
    pub interleaves: Vec<InterleaveTable>,
}

impl StateMachine {
    pub fn block(&self, label: Label) -> Option<&BasicBlock> {
        self.blocks.get(&label)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instr> {
        self.blocks.values().flat_map(|b| b.instrs.iter())
    }

    /// Number of blocking snapshot sites, i.e. suspension points.
    pub fn suspension_points(&self) -> usize {
        self.instructions()
            .filter(|i| matches!(i, Instr::Snapshot { blocking: true }))
            .count()
    }
}

impl fmt::Display for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MachineKind::Function => "function",
            MachineKind::Altstep => "altstep",
            MachineKind::Construct => "construct",
        };
        writeln!(f, "{kind} {}:", self.name)?;
        writeln!(
            f,
            "  entry {}, {} status slots, {} state variables",
            self.entry, self.num_slots, self.num_state_vars
        )?;
        for c in &self.constructs {
            let slots: Vec<String> = c.slots.iter().map(|s| s.to_string()).collect();
            writeln!(
                f,
                "  {} @{} entry {} slots [{}]{}{}",
                c.kind,
                c.span,
                c.entry,
                slots.join(", "),
                if c.has_else { " else" } else { "" },
                if c.has_repeat_statement { " repeat" } else { "" }
            )?;
        }
        for il in &self.interleaves {
            let vars: Vec<String> = il
                .arms
                .iter()
                .map(|a| match a.var {
                    Some(v) => format!("{v}<{}", a.terminal),
                    None => "-".into(),
                })
                .collect();
            writeln!(
                f,
                "  interleave @{} head {} exit {} arms [{}] branches {}",
                il.span,
                il.head,
                il.exit,
                vars.join(", "),
                il.branches
            )?;
        }
        for block in self.blocks.values() {
            writeln!(f, "{}:", block.label)?;
            for instr in &block.instrs {
                writeln!(f, "    {instr}")?;
            }
            writeln!(f, "    -> {}", block.terminator)?;
        }
        Ok(())
    }
}
