//! DAP protocol bodies
//!
//! This crate contains the typed request arguments, response bodies and events that the session
//! model exchanges with a debug adapter. Framing and transport are handled elsewhere.
pub mod events;
pub mod requests;
pub mod responses;
pub mod types;

/// Number of stack frames requested per `stackTrace` page
pub const DEFAULT_STACK_FRAME_PAGE_SIZE: i64 = 20;
