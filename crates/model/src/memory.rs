//! In-memory [`Session`] implementation
//!
//! Answers requests from scripted data instead of a running debug adapter, and records every request
//! it receives. Responses can be held back with [`InMemorySession::pause`] to observe the model while
//! requests are in flight.
use std::{collections::HashMap, sync::Mutex};

use futures::{FutureExt, future::BoxFuture};
use protocol::{
    requests, responses,
    types::{self, StackFrameId, ThreadId, VariablesReference},
};
use tokio::sync::watch;

use crate::{Session, fetch::lock};

/// A request received by an [`InMemorySession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Variables(requests::Variables),
    StackTrace(requests::StackTrace),
    Scopes(requests::Scopes),
    Evaluate(requests::Evaluate),
}

#[derive(Default)]
struct Script {
    variables: HashMap<VariablesReference, Result<Vec<types::Variable>, String>>,
    stacks: HashMap<ThreadId, Result<Vec<Option<types::StackFrame>>, String>>,
    scopes: HashMap<StackFrameId, Result<Vec<types::Scope>, String>>,
    evaluate: HashMap<String, Result<responses::EvaluateResponse, String>>,
}

pub struct InMemorySession {
    script: Mutex<Script>,
    calls: Mutex<Vec<SessionCall>>,
    gate: watch::Sender<bool>,
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySession {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
            gate,
        }
    }

    pub fn set_variables(&self, reference: VariablesReference, variables: Vec<types::Variable>) {
        lock(&self.script)
            .variables
            .insert(reference, Ok(variables));
    }

    pub fn fail_variables(&self, reference: VariablesReference, message: impl Into<String>) {
        lock(&self.script)
            .variables
            .insert(reference, Err(message.into()));
    }

    /// The full call stack of a thread; requests are answered page by page
    pub fn set_stack(&self, thread_id: ThreadId, frames: Vec<Option<types::StackFrame>>) {
        lock(&self.script).stacks.insert(thread_id, Ok(frames));
    }

    pub fn fail_stack_trace(&self, thread_id: ThreadId, message: impl Into<String>) {
        lock(&self.script)
            .stacks
            .insert(thread_id, Err(message.into()));
    }

    pub fn set_scopes(&self, frame_id: StackFrameId, scopes: Vec<types::Scope>) {
        lock(&self.script).scopes.insert(frame_id, Ok(scopes));
    }

    pub fn fail_scopes(&self, frame_id: StackFrameId, message: impl Into<String>) {
        lock(&self.script)
            .scopes
            .insert(frame_id, Err(message.into()));
    }

    pub fn set_evaluate(&self, expression: impl Into<String>, response: responses::EvaluateResponse) {
        lock(&self.script)
            .evaluate
            .insert(expression.into(), Ok(response));
    }

    pub fn fail_evaluate(&self, expression: impl Into<String>, message: impl Into<String>) {
        lock(&self.script)
            .evaluate
            .insert(expression.into(), Err(message.into()));
    }

    /// Hold back every response until [`InMemorySession::resume`]
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Every request received so far, in order
    pub fn calls(&self) -> Vec<SessionCall> {
        lock(&self.calls).clone()
    }

    /// References of the `variables` requests received so far
    pub fn variables_calls(&self) -> Vec<VariablesReference> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                SessionCall::Variables(args) => Some(args.variables_reference),
                _ => None,
            })
            .collect()
    }

    pub fn stack_trace_calls(&self) -> Vec<requests::StackTrace> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                SessionCall::StackTrace(args) => Some(*args),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn respond<T>(&self, call: SessionCall, result: eyre::Result<T>) -> BoxFuture<'_, eyre::Result<T>>
    where
        T: Send + 'static,
    {
        tracing::trace!(?call, "in-memory session received request");
        lock(&self.calls).push(call);

        let mut open = self.gate.subscribe();
        async move {
            // the sender lives as long as self, so this only fails during teardown
            let _ = open.wait_for(|open| *open).await;
            result
        }
        .boxed()
    }
}

impl Session for InMemorySession {
    fn variables(
        &self,
        args: requests::Variables,
    ) -> BoxFuture<'_, eyre::Result<responses::VariablesResponse>> {
        let result = match lock(&self.script).variables.get(&args.variables_reference) {
            Some(Ok(variables)) => Ok(responses::VariablesResponse {
                variables: variables.clone(),
            }),
            Some(Err(message)) => Err(eyre::eyre!("{message}")),
            None => Ok(responses::VariablesResponse {
                variables: Vec::new(),
            }),
        };
        self.respond(SessionCall::Variables(args), result)
    }

    fn stack_trace(
        &self,
        args: requests::StackTrace,
    ) -> BoxFuture<'_, eyre::Result<responses::StackTraceResponse>> {
        let result = match lock(&self.script).stacks.get(&args.thread_id) {
            Some(Ok(frames)) => {
                let start = args.start_frame.unwrap_or(0).max(0) as usize;
                let levels = match args.levels {
                    Some(levels) if levels > 0 => levels as usize,
                    _ => frames.len(),
                };
                Ok(responses::StackTraceResponse {
                    stack_frames: frames.iter().skip(start).take(levels).cloned().collect(),
                    total_frames: Some(frames.len()),
                })
            }
            Some(Err(message)) => Err(eyre::eyre!("{message}")),
            None => Ok(responses::StackTraceResponse {
                stack_frames: Vec::new(),
                total_frames: Some(0),
            }),
        };
        self.respond(SessionCall::StackTrace(args), result)
    }

    fn scopes(
        &self,
        args: requests::Scopes,
    ) -> BoxFuture<'_, eyre::Result<responses::ScopesResponse>> {
        let result = match lock(&self.script).scopes.get(&args.frame_id) {
            Some(Ok(scopes)) => Ok(responses::ScopesResponse {
                scopes: scopes.clone(),
            }),
            Some(Err(message)) => Err(eyre::eyre!("{message}")),
            None => Ok(responses::ScopesResponse { scopes: Vec::new() }),
        };
        self.respond(SessionCall::Scopes(args), result)
    }

    fn evaluate(
        &self,
        args: requests::Evaluate,
    ) -> BoxFuture<'_, eyre::Result<responses::EvaluateResponse>> {
        let result = match lock(&self.script).evaluate.get(&args.expression) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(message)) => Err(eyre::eyre!("{message}")),
            None => Err(eyre::eyre!("cannot evaluate '{}'", args.expression)),
        };
        self.respond(SessionCall::Evaluate(args), result)
    }
}
