use std::sync::Arc;

use futures::future::BoxFuture;
use protocol::{requests, responses};

/// The requests the model issues against a running debug adapter.
///
/// Implementations own the wire protocol. Every request may fail; the model converts failures
/// into placeholders and never hands them back to its callers.
pub trait Session: Send + Sync {
    /// Children of a variable, expression or scope
    fn variables(
        &self,
        args: requests::Variables,
    ) -> BoxFuture<'_, eyre::Result<responses::VariablesResponse>>;

    /// One page of the call stack of a thread
    fn stack_trace(
        &self,
        args: requests::StackTrace,
    ) -> BoxFuture<'_, eyre::Result<responses::StackTraceResponse>>;

    /// Scopes of a stack frame
    fn scopes(
        &self,
        args: requests::Scopes,
    ) -> BoxFuture<'_, eyre::Result<responses::ScopesResponse>>;

    fn evaluate(
        &self,
        args: requests::Evaluate,
    ) -> BoxFuture<'_, eyre::Result<responses::EvaluateResponse>>;
}

/// Shared handle to the active session
pub type SessionHandle = Arc<dyn Session>;
