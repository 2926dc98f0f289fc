#![doc = include_str!("../README.md")]

//! Lowering of TTCN-3 alternative behaviour.
//!
//! This crate classifies guard operations, allocates labels, status slots
//! and interleave state variables, and lowers `alt`, altstep bodies, call
//! response parts and `interleave` into flat, label-addressable state
//! machines interpreted by a small driver.

pub mod alloc;
pub mod classify;
pub mod lowering;
pub mod machine;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;

pub use lowering::{
    compile, compile_altstep, compile_function, LoweringError, LoweringOptions,
    SpannedLoweringError,
};
pub use machine::StateMachine;
