#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticSeverity {
    Warning,
}

/// A non-fatal finding of the context checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticDiagnostic {
    pub code: String,
    pub severity: SemanticSeverity,
    pub message: String,
    pub span: Option<Span>,
}

fn source_span(span: Span) -> miette::SourceSpan {
    (span.start, span.len()).into()
}

/// Placement errors found while classifying behaviour statements.
///
/// Each error marks the offending statement erroneous; checking of the
/// surrounding statements continues.
#[derive(Debug, Error, Diagnostic)]
pub enum SemanticError {
    #[error("repeat used outside alt, interleave, altstep or call response part")]
    #[diagnostic(
        code(ttcn::semantic::repeat_context),
        help("repeat re-evaluates the innermost alt-like construct; move it into a branch body")
    )]
    RepeatOutsideAlt {
        #[label("repeat here")]
        span: miette::SourceSpan,
    },

    #[error("break used outside a loop, alt or interleave")]
    #[diagnostic(code(ttcn::semantic::break_context))]
    BreakOutsideLoop {
        #[label("break here")]
        span: miette::SourceSpan,
    },

    #[error("continue used outside a loop")]
    #[diagnostic(code(ttcn::semantic::continue_context))]
    ContinueOutsideLoop {
        #[label("continue here")]
        span: miette::SourceSpan,
    },

    #[error("catch(timeout) used without a preceding timed call")]
    #[diagnostic(
        code(ttcn::semantic::catch_timeout),
        help("give the call a timer value: p.call(sig, 5.0) {{ ... }}")
    )]
    CatchTimeoutWithoutTimedCall {
        #[label("catch(timeout) here")]
        span: miette::SourceSpan,
    },

    #[error("else branch is not allowed in an interleave statement")]
    #[diagnostic(code(ttcn::semantic::interleave_else))]
    ElseInInterleave {
        #[label("else branch")]
        span: miette::SourceSpan,
    },

    #[error("altstep '{name}' cannot be used as an interleave branch")]
    #[diagnostic(code(ttcn::semantic::interleave_altstep))]
    AltstepInInterleave {
        name: String,
        #[label("altstep branch")]
        span: miette::SourceSpan,
    },

    #[error("else branch is not allowed in the response part of a call")]
    #[diagnostic(code(ttcn::semantic::call_else))]
    ElseInCallResponse {
        #[label("else branch")]
        span: miette::SourceSpan,
    },
}

impl SemanticError {
    pub fn repeat_outside_alt(span: Span) -> Self {
        SemanticError::RepeatOutsideAlt {
            span: source_span(span),
        }
    }

    pub fn break_outside_loop(span: Span) -> Self {
        SemanticError::BreakOutsideLoop {
            span: source_span(span),
        }
    }

    pub fn continue_outside_loop(span: Span) -> Self {
        SemanticError::ContinueOutsideLoop {
            span: source_span(span),
        }
    }

    pub fn catch_timeout_without_timed_call(span: Span) -> Self {
        SemanticError::CatchTimeoutWithoutTimedCall {
            span: source_span(span),
        }
    }

    pub fn else_in_interleave(span: Span) -> Self {
        SemanticError::ElseInInterleave {
            span: source_span(span),
        }
    }

    pub fn altstep_in_interleave(name: impl Into<String>, span: Span) -> Self {
        SemanticError::AltstepInInterleave {
            name: name.into(),
            span: source_span(span),
        }
    }

    pub fn else_in_call_response(span: Span) -> Self {
        SemanticError::ElseInCallResponse {
            span: source_span(span),
        }
    }

    /// Byte span of the offending node.
    pub fn span(&self) -> Span {
        let s = match self {
            SemanticError::RepeatOutsideAlt { span }
            | SemanticError::BreakOutsideLoop { span }
            | SemanticError::ContinueOutsideLoop { span }
            | SemanticError::CatchTimeoutWithoutTimedCall { span }
            | SemanticError::ElseInInterleave { span }
            | SemanticError::AltstepInInterleave { span, .. }
            | SemanticError::ElseInCallResponse { span } => span,
        };
        Span::new(s.offset(), s.offset() + s.len())
    }
}

/// Wrapper for reporting every semantic error of one body together.
#[derive(Debug, Error)]
#[error("{}", format_semantic_errors(.errors))]
pub struct SemanticErrors {
    pub errors: Vec<SemanticError>,
}

fn format_semantic_errors(errors: &[SemanticError]) -> String {
    if errors.len() == 1 {
        return errors[0].to_string();
    }
    let mut s = format!("{} semantic errors:\n", errors.len());
    for (i, e) in errors.iter().enumerate() {
        s.push_str(&format!("  {}. {}\n", i + 1, e));
    }
    s
}

impl SemanticErrors {
    /// Attach the module text so every error renders with a source snippet.
    pub fn with_source_context(self, source: &str, filename: &str) -> SemanticReport {
        SemanticReport {
            count: self.errors.len(),
            src: miette::NamedSource::new(filename, source.to_owned()),
            errors: self.errors,
        }
    }
}

/// Semantic errors bundled with their source text for CLI rendering.
#[derive(Debug, Error, Diagnostic)]
#[error("{count} semantic error(s)")]
#[diagnostic(code(ttcn::semantic::report))]
pub struct SemanticReport {
    pub count: usize,
    #[source_code]
    pub src: miette::NamedSource<String>,
    #[related]
    pub errors: Vec<SemanticError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_roundtrips_through_source_span() {
        let err = SemanticError::break_outside_loop(Span::new(12, 17));
        assert_eq!(err.span(), Span::new(12, 17));
    }

    #[test]
    fn multiple_errors_are_numbered() {
        let errs = SemanticErrors {
            errors: vec![
                SemanticError::repeat_outside_alt(Span::new(0, 6)),
                SemanticError::continue_outside_loop(Span::new(8, 16)),
            ],
        };
        let text = errs.to_string();
        assert!(text.starts_with("2 semantic errors:"));
        assert!(text.contains("1. repeat used outside alt"));
        assert!(text.contains("2. continue used outside a loop"));
    }

    #[test]
    fn single_error_is_rendered_plainly() {
        let errs = SemanticErrors {
            errors: vec![SemanticError::else_in_interleave(Span::new(3, 7))],
        };
        assert_eq!(
            errs.to_string(),
            "else branch is not allowed in an interleave statement"
        );
        let report = errs.with_source_context("interleave { [else] {} }", "t.ttcn");
        assert_eq!(report.count, 1);
        assert_eq!(report.errors.len(), 1);
    }
}
