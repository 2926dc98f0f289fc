use std::fmt;

/// Source span for error reporting (byte offsets into the module text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span for nodes synthesized by tools rather than read from source.
    pub fn synthetic() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// An already type-checked expression.
///
/// The lowering never looks inside an expression; it is handed back to the
/// runtime collaborator verbatim, so only the rendered text is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Expr {
    pub text: String,
    pub span: Span,
}

impl Expr {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Kind of a receiving (event-consuming or event-inspecting) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum ReceiveKind {
    Receive,
    Trigger,
    Getcall,
    Getreply,
    Catch,
    /// `catch(timeout)`: the timer of a timed blocking call expired.
    CatchTimeout,
    Check,
    CheckReceive,
    CheckGetcall,
    CheckGetreply,
    CheckCatch,
    Timeout,
    Done,
    Killed,
}

impl ReceiveKind {
    pub const ALL: [ReceiveKind; 14] = [
        ReceiveKind::Receive,
        ReceiveKind::Trigger,
        ReceiveKind::Getcall,
        ReceiveKind::Getreply,
        ReceiveKind::Catch,
        ReceiveKind::CatchTimeout,
        ReceiveKind::Check,
        ReceiveKind::CheckReceive,
        ReceiveKind::CheckGetcall,
        ReceiveKind::CheckGetreply,
        ReceiveKind::CheckCatch,
        ReceiveKind::Timeout,
        ReceiveKind::Done,
        ReceiveKind::Killed,
    ];

    /// Keyword as written in TTCN-3 source.
    pub fn keyword(&self) -> &'static str {
        match self {
            ReceiveKind::Receive => "receive",
            ReceiveKind::Trigger => "trigger",
            ReceiveKind::Getcall => "getcall",
            ReceiveKind::Getreply => "getreply",
            ReceiveKind::Catch => "catch",
            ReceiveKind::CatchTimeout => "catch",
            ReceiveKind::Check => "check",
            ReceiveKind::CheckReceive => "check(receive)",
            ReceiveKind::CheckGetcall => "check(getcall)",
            ReceiveKind::CheckGetreply => "check(getreply)",
            ReceiveKind::CheckCatch => "check(catch)",
            ReceiveKind::Timeout => "timeout",
            ReceiveKind::Done => "done",
            ReceiveKind::Killed => "killed",
        }
    }

    /// Whether an attempt of this operation may report REPEAT: the operation
    /// discarded an event and the enclosing construct must be re-evaluated
    /// against the same snapshot.
    pub fn can_repeat(&self) -> bool {
        matches!(
            self,
            ReceiveKind::Trigger | ReceiveKind::Done | ReceiveKind::Killed
        )
    }
}

/// A receiving operation such as `p.receive(MsgA:?)` or `T.timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceivingOp {
    pub kind: ReceiveKind,
    /// Port, component or timer reference; `None` stands for `any port`,
    /// `any component` or `any timer`.
    pub subject: Option<String>,
    /// Matching template and redirects, already checked.
    pub matching: Option<Expr>,
    pub span: Span,
}

impl fmt::Display for ReceivingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{subject}.")?,
            None => f.write_str("any.")?,
        }
        match (self.kind, &self.matching) {
            (ReceiveKind::CatchTimeout, _) => f.write_str("catch(timeout)"),
            (kind, Some(matching)) => write!(f, "{}({matching})", kind.keyword()),
            (kind, None) => f.write_str(kind.keyword()),
        }
    }
}

/// Reference to an altstep together with its actual parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AltstepRef {
    pub name: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

impl fmt::Display for AltstepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// The blocking-capable action of one alt branch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum GuardOperation {
    Receiving(ReceivingOp),
    /// Direct reference to a named altstep.
    AltstepInstance(AltstepRef),
    /// Invocation of an altstep held in a variable (`altstep` typed value).
    AltstepInvocation(Expr),
    Else,
}

impl GuardOperation {
    pub fn is_else(&self) -> bool {
        matches!(self, GuardOperation::Else)
    }

    pub fn is_altstep(&self) -> bool {
        matches!(
            self,
            GuardOperation::AltstepInstance(_) | GuardOperation::AltstepInvocation(_)
        )
    }
}

impl fmt::Display for GuardOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardOperation::Receiving(op) => write!(f, "{op}"),
            GuardOperation::AltstepInstance(r) => write!(f, "{r}"),
            GuardOperation::AltstepInvocation(e) => write!(f, "{e}.apply()"),
            GuardOperation::Else => f.write_str("else"),
        }
    }
}

/// One `[guard] operation { body }` alternative.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AltBranch {
    pub guard: Option<Expr>,
    pub operation: GuardOperation,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AltConstruct {
    pub branches: Vec<AltBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct InterleaveConstruct {
    pub branches: Vec<AltBranch>,
    pub span: Span,
}

/// A blocking procedure call with its response and exception handling part.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CallStatement {
    /// The call operation itself (`p.call(sig:{...})`), executed as plain code.
    pub call: Expr,
    /// Call timer value; enables `catch(timeout)` in the response part.
    pub timeout: Option<Expr>,
    pub response: Vec<AltBranch>,
    pub span: Span,
}

/// One `case` of a `select` statement. `condition` is `None` for `case else`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectCase {
    pub condition: Option<Expr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StatementKind {
    /// Any ordinary statement (assignment, send, log, function call, ...).
    Plain(Expr),
    Block(Block),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    For {
        init: Option<Box<Statement>>,
        cond: Expr,
        step: Option<Box<Statement>>,
        body: Block,
    },
    Select {
        cases: Vec<SelectCase>,
    },
    Alt(AltConstruct),
    Interleave(InterleaveConstruct),
    /// Standalone receiving operation (`p.receive(x);`).
    Receive(ReceivingOp),
    /// Standalone altstep call (`as_default();`).
    Altstep(AltstepRef),
    /// Standalone invocation of an altstep variable.
    AltstepInvoke(Expr),
    Call(CallStatement),
    Repeat,
    Break,
    Continue,
    Return(Option<Expr>),
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Plain(_) => "statement",
            StatementKind::Block(_) => "block",
            StatementKind::If { .. } => "if",
            StatementKind::While { .. } => "while",
            StatementKind::DoWhile { .. } => "do-while",
            StatementKind::For { .. } => "for",
            StatementKind::Select { .. } => "select",
            StatementKind::Alt(_) => "alt",
            StatementKind::Interleave(_) => "interleave",
            StatementKind::Receive(_) => "receiving operation",
            StatementKind::Altstep(_) => "altstep call",
            StatementKind::AltstepInvoke(_) => "altstep invocation",
            StatementKind::Call(_) => "call",
            StatementKind::Repeat => "repeat",
            StatementKind::Break => "break",
            StatementKind::Continue => "continue",
            StatementKind::Return(_) => "return",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
    /// Set by the context checker when the statement violates a placement
    /// rule. Lowering refuses erroneous statements.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub erroneous: bool,
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self {
            kind,
            span,
            erroneous: false,
        }
    }
}

/// A statement block.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

impl Block {
    pub fn new(statements: Vec<Statement>, span: Span) -> Self {
        Self { statements, span }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            f.write_str(" ")?;
            match &stmt.kind {
                StatementKind::Plain(e) => write!(f, "{e}")?,
                StatementKind::Return(Some(e)) => write!(f, "return {e}")?,
                other => f.write_str(other.name())?,
            }
        }
        if !self.statements.is_empty() {
            f.write_str(" ")?;
        }
        f.write_str("}")
    }
}

/// A function, testcase or control part body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionDef {
    pub name: String,
    pub body: Block,
    pub span: Span,
}

/// An altstep definition: a named bundle of alt branches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AltstepDef {
    pub name: String,
    pub branches: Vec<AltBranch>,
    pub span: Span,
}
