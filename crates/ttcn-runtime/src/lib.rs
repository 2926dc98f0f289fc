#![doc = include_str!("../README.md")]

//! Execution of lowered TTCN-3 alternative behaviour.
//!
//! This crate interprets a lowered [`StateMachine`](ttcn_lower::machine::StateMachine)
//! against an [`AltEnvironment`], the collaborator that owns ports, timers,
//! components and default activations.

pub mod altsteps;
pub mod driver;
pub mod env;
pub mod queue;
pub mod scripted;
pub mod trace;

pub use altsteps::AltstepEnvironment;
pub use driver::{execute, Completion, DriverLimits, RuntimeError};
pub use env::{AltEnvironment, EnvironmentError};
pub use queue::QueueEnvironment;
pub use scripted::ScriptedEnvironment;
pub use trace::{Recorder, Trace, TraceEvent};
