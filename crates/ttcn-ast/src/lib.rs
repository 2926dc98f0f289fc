//! Checked TTCN-3 behaviour trees.
//!
//! This crate holds the statement-level AST consumed by the alt/interleave
//! lowering (`alt`, `interleave`, altsteps, blocking calls and the control
//! transfer statements around them), helpers to build such trees, and the
//! context checker that rejects misplaced `repeat`, `break`, `continue` and
//! `catch(timeout)` before lowering.

pub mod ast;
pub mod build;
pub mod checker;
pub mod errors;

pub use checker::{check_altstep, check_block, check_function, CheckReport};
pub use errors::{SemanticError, SemanticErrors};
