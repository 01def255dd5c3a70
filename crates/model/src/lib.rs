//! Client-side session model for a debug adapter
//!
//! The [`Model`] owns the threads, breakpoints, watch expressions and REPL output of one debugging
//! session. Tree nodes (threads, stack frames, scopes, variables and expressions) fetch their
//! details lazily from a [`Session`] and cache them until the next stop or continue.
mod breakpoints;
mod call_stack;
mod config;
mod expression;
mod fetch;
mod id;
pub mod memory;
mod model;
mod notify;
mod repl;
mod session;
mod source;
mod values;

pub use breakpoints::{Breakpoint, ExceptionBreakpoint, FunctionBreakpoint, RawBreakpoint};
pub use call_stack::{Scope, StackFrame, StoppedDetails, Thread};
pub use config::ModelConfig;
pub use expression::{Expression, ExpressionParent, Variable, evaluate_expression};
pub use id::ElementId;
pub use model::{FunctionBreakpointUpdate, Model, RawModelUpdate};
pub use notify::ModelEvent;
pub use repl::{KeyValueOutput, ReplBuffer, ReplElement, Severity, ValueOutput};
pub use session::{Session, SessionHandle};
pub use source::Source;
pub use values::{ValueTracker, massage_value};
