//! The aggregate state of one debugging session
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use protocol::{
    events::{Event, OutputEventBody, StoppedEventBody},
    requests::EvaluateContext,
    types::{self, BreakpointId, ThreadId},
};

use crate::{
    Breakpoint, ElementId, ExceptionBreakpoint, Expression, FunctionBreakpoint, ModelConfig,
    ModelEvent, RawBreakpoint, ReplBuffer, ReplElement, SessionHandle, Severity, Source,
    StackFrame, StoppedDetails, Thread, ValueTracker, evaluate_expression,
    expression::DEFAULT_VALUE, notify::Notifier,
};

const TELEMETRY_CATEGORY: &str = "telemetry";
const THREAD_EXITED: &str = "exited";

/// A thread sighting, optionally carrying a stop
#[derive(Debug, Clone)]
pub struct RawModelUpdate {
    pub thread_id: ThreadId,
    pub thread: Option<types::Thread>,
    pub stopped_details: Option<StoppedDetails>,
    pub all_threads_stopped: bool,
}

impl RawModelUpdate {
    /// The update for a `stopped` event. Events without a thread id are attributed to thread 0.
    pub fn from_stopped(body: &StoppedEventBody, thread: Option<types::Thread>) -> Self {
        Self {
            thread_id: body
                .thread_id
                .or(thread.as_ref().map(|t| t.id))
                .unwrap_or_default(),
            thread,
            stopped_details: Some(StoppedDetails::from(body)),
            all_threads_stopped: body.all_threads_stopped.unwrap_or(false),
        }
    }
}

/// Adapter-reported state of a function breakpoint
#[derive(Debug, Clone, Default)]
pub struct FunctionBreakpointUpdate {
    pub name: Option<String>,
    pub verified: bool,
    pub id: Option<BreakpointId>,
}

pub struct Model {
    config: ModelConfig,
    threads: BTreeMap<ThreadId, Arc<Thread>>,
    breakpoints: Vec<Breakpoint>,
    breakpoints_activated: bool,
    function_breakpoints: Vec<FunctionBreakpoint>,
    exception_breakpoints: Vec<ExceptionBreakpoint>,
    watch_expressions: Vec<Arc<Expression>>,
    repl: ReplBuffer,
    values: ValueTracker,
    notifier: Notifier,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    pub fn with_config(config: ModelConfig) -> Self {
        let repl = ReplBuffer::new(config.max_repl_length, config.max_key_value_children);
        Self {
            config,
            threads: BTreeMap::new(),
            breakpoints: Vec::new(),
            breakpoints_activated: true,
            function_breakpoints: Vec::new(),
            exception_breakpoints: Vec::new(),
            watch_expressions: Vec::new(),
            repl,
            values: ValueTracker::new(),
            notifier: Notifier::default(),
        }
    }

    pub fn id(&self) -> ElementId {
        ElementId::root()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Last seen values of every tree node, shared with the nodes of this model
    pub fn values(&self) -> &ValueTracker {
        &self.values
    }

    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<ModelEvent> {
        self.notifier.subscribe()
    }

    // Threads

    pub fn threads(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.threads.values()
    }

    pub fn thread(&self, thread_id: ThreadId) -> Option<&Arc<Thread>> {
        self.threads.get(&thread_id)
    }

    /// Apply an event from the debug adapter
    pub fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Stopped(body) => self.raw_update(RawModelUpdate::from_stopped(body, None)),
            Event::Continued(body) => {
                let thread_id = match body.all_threads_continued {
                    Some(true) => None,
                    _ => Some(body.thread_id),
                };
                self.clear_threads(false, thread_id);
            }
            Event::Thread(body) if body.reason == THREAD_EXITED => {
                self.clear_threads(true, Some(body.thread_id));
            }
            Event::Thread(body) => self.raw_update(RawModelUpdate {
                thread_id: body.thread_id,
                thread: Some(body.thread()),
                stopped_details: None,
                all_threads_stopped: false,
            }),
            Event::Output(body) => self.append_output_event(body),
            Event::Terminated => self.clear_threads(true, None),
            other => tracing::trace!(event = ?other, "event does not affect the model"),
        }
    }

    /// Record a thread sighting and apply its stop, if any
    pub fn raw_update(&mut self, update: RawModelUpdate) {
        let thread_id = update.thread_id;
        if !self.threads.contains_key(&thread_id) {
            let name = update
                .thread
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("Thread {thread_id}"));
            tracing::debug!(thread_id, %name, "new thread");
            let thread = Thread::new(name, thread_id, &self.values)
                .with_page_size(self.config.stack_frame_page_size);
            self.threads.insert(thread_id, Arc::new(thread));
        }

        if let Some(details) = update.stopped_details {
            if update.all_threads_stopped {
                tracing::debug!(reason = %details.reason, "all threads stopped");
                for thread in self.threads.values() {
                    thread.set_stopped(details.clone());
                }
            } else if let Some(thread) = self.threads.get(&thread_id) {
                tracing::debug!(thread_id, reason = %details.reason, "thread stopped");
                thread.set_stopped(details);
            }
        }

        self.notifier.fire(ModelEvent::CallStackChanged);
    }

    /// Forget the call stack and stop state of one thread, or of every thread.
    ///
    /// With `remove_threads` the threads themselves are dropped too, and clearing every thread also
    /// forgets all tracked values.
    pub fn clear_threads(&mut self, remove_threads: bool, thread_id: Option<ThreadId>) {
        match thread_id {
            Some(thread_id) => {
                if let Some(thread) = self.threads.get(&thread_id) {
                    thread.set_running();
                    if remove_threads {
                        self.threads.remove(&thread_id);
                    }
                }
            }
            None => {
                for thread in self.threads.values() {
                    thread.set_running();
                }
                if remove_threads {
                    tracing::debug!("removing all threads");
                    self.threads.clear();
                    self.values.clear();
                }
            }
        }

        self.notifier.fire(ModelEvent::CallStackChanged);
    }

    /// Mark the source of every cached frame that shows `source` as unavailable
    pub fn source_is_unavailable(&mut self, source: &Source) {
        for thread in self.threads.values() {
            for frame in thread.cached_call_stack().into_iter().flatten() {
                frame.mark_source_unavailable(source);
            }
        }
        self.notifier.fire(ModelEvent::CallStackChanged);
    }

    // Breakpoints

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn function_breakpoints(&self) -> &[FunctionBreakpoint] {
        &self.function_breakpoints
    }

    pub fn exception_breakpoints(&self) -> &[ExceptionBreakpoint] {
        &self.exception_breakpoints
    }

    pub fn are_breakpoints_activated(&self) -> bool {
        self.breakpoints_activated
    }

    pub fn set_breakpoints_activated(&mut self, activated: bool) {
        self.breakpoints_activated = activated;
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    /// Add line breakpoints, returning their ids. Adding activates breakpoints.
    pub fn add_breakpoints(
        &mut self,
        raw: impl IntoIterator<Item = RawBreakpoint>,
    ) -> Vec<ElementId> {
        self.breakpoints_activated = true;
        let start = self.breakpoints.len();
        self.breakpoints.extend(raw.into_iter().map(Breakpoint::new));
        let ids = self.breakpoints[start..]
            .iter()
            .map(|bp| bp.id().clone())
            .collect();
        self.notifier.fire(ModelEvent::BreakpointsChanged);
        ids
    }

    pub fn remove_breakpoints(&mut self, ids: &[ElementId]) {
        self.breakpoints.retain(|bp| !ids.contains(bp.id()));
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    /// Apply adapter verification results, keyed by breakpoint id
    pub fn update_breakpoints(&mut self, data: &HashMap<ElementId, types::Breakpoint>) {
        for bp in &mut self.breakpoints {
            if let Some(state) = data.get(bp.id()) {
                bp.apply_adapter_state(state);
            }
        }
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    /// Enable or disable the breakpoint of any kind with the given id
    pub fn set_enablement(&mut self, id: &ElementId, enabled: bool) {
        if let Some(bp) = self.breakpoints.iter_mut().find(|bp| bp.id() == id) {
            bp.set_enabled(enabled);
        } else if let Some(fbp) = self
            .function_breakpoints
            .iter_mut()
            .find(|fbp| fbp.id() == id)
        {
            fbp.enabled = enabled;
        } else if let Some(ebp) = self
            .exception_breakpoints
            .iter_mut()
            .find(|ebp| ebp.id() == id)
        {
            ebp.enabled = enabled;
        } else {
            tracing::debug!(%id, "no breakpoint to enable or disable");
        }
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    pub fn enable_or_disable_all_breakpoints(&mut self, enabled: bool) {
        for bp in &mut self.breakpoints {
            bp.set_enabled(enabled);
        }
        for fbp in &mut self.function_breakpoints {
            fbp.enabled = enabled;
        }
        for ebp in &mut self.exception_breakpoints {
            ebp.enabled = enabled;
        }
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    pub fn add_function_breakpoint(&mut self, name: impl Into<String>) -> ElementId {
        let fbp = FunctionBreakpoint::new(name, true);
        let id = fbp.id().clone();
        self.function_breakpoints.push(fbp);
        self.notifier.fire(ModelEvent::BreakpointsChanged);
        id
    }

    pub fn update_function_breakpoints(&mut self, data: &HashMap<ElementId, FunctionBreakpointUpdate>) {
        for fbp in &mut self.function_breakpoints {
            if let Some(update) = data.get(fbp.id()) {
                if let Some(name) = &update.name {
                    fbp.name = name.clone();
                }
                fbp.verified = update.verified;
                fbp.id_from_adapter = update.id;
            }
        }
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    /// Remove one function breakpoint, or all of them
    pub fn remove_function_breakpoints(&mut self, id: Option<&ElementId>) {
        match id {
            Some(id) => self.function_breakpoints.retain(|fbp| fbp.id() != id),
            None => self.function_breakpoints.clear(),
        }
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    /// Replace the exception breakpoints with the filters the adapter offers.
    ///
    /// Filters that were already known keep their id and enablement; new filters start in the
    /// adapter's default state.
    pub fn set_exception_breakpoints(&mut self, filters: &[types::ExceptionBreakpointsFilter]) {
        let previous = std::mem::take(&mut self.exception_breakpoints);
        self.exception_breakpoints = filters
            .iter()
            .map(|filter| {
                match previous.iter().rev().find(|ebp| ebp.filter == filter.filter) {
                    Some(existing) => {
                        let mut ebp = existing.clone();
                        ebp.label = filter.label.clone();
                        ebp
                    }
                    None => ExceptionBreakpoint::new(&filter.filter, &filter.label, filter.default),
                }
            })
            .collect();
        self.notifier.fire(ModelEvent::BreakpointsChanged);
    }

    // REPL

    pub fn repl_elements(&self) -> impl Iterator<Item = &ReplElement> {
        self.repl.elements()
    }

    pub fn repl(&self) -> &ReplBuffer {
        &self.repl
    }

    /// Evaluate `name` in the REPL and append the expression to the output
    pub async fn add_repl_expression(
        &mut self,
        session: Option<&SessionHandle>,
        frame: Option<&StackFrame>,
        name: impl Into<String>,
    ) -> Arc<Expression> {
        let expression = Arc::new(Expression::new(name, true, &self.values));
        self.repl.push_expression(Arc::clone(&expression));
        evaluate_expression(session, frame, &expression, EvaluateContext::Repl).await;
        self.notifier.fire(ModelEvent::ReplElementsChanged);
        expression
    }

    /// Log a message (a JSON string) or a structured value
    pub fn log_to_repl(&mut self, value: impl Into<serde_json::Value>, severity: Severity) {
        self.repl.log(value.into(), severity);
        self.notifier.fire(ModelEvent::ReplElementsChanged);
    }

    pub fn append_repl_output(&mut self, output: &str, severity: Severity) {
        self.repl.append_output(output, severity);
        self.notifier.fire(ModelEvent::ReplElementsChanged);
    }

    /// Append the text of an `output` event; telemetry is not shown
    pub fn append_output_event(&mut self, body: &OutputEventBody) {
        let category = body.category.as_deref();
        if category == Some(TELEMETRY_CATEGORY) {
            tracing::trace!("ignoring telemetry output");
            return;
        }
        self.append_repl_output(&body.output, Severity::from_output_category(category));
    }

    pub fn remove_repl_expressions(&mut self) {
        if self.repl.clear() {
            self.notifier.fire(ModelEvent::ReplElementsChanged);
        }
    }

    // Watch expressions

    pub fn watch_expressions(&self) -> &[Arc<Expression>] {
        &self.watch_expressions
    }

    /// Add a watch expression and evaluate it, unless it is empty
    pub async fn add_watch_expression(
        &mut self,
        session: Option<&SessionHandle>,
        frame: Option<&StackFrame>,
        name: impl Into<String>,
    ) -> Arc<Expression> {
        let expression = Arc::new(Expression::new(name, false, &self.values));
        self.watch_expressions.push(Arc::clone(&expression));

        if expression.name().is_empty() {
            self.notifier.fire(ModelEvent::WatchExpressionsChanged(Some(
                expression.id().clone(),
            )));
        } else {
            self.evaluate_watch_expressions(session, frame, Some(expression.id()))
                .await;
        }
        expression
    }

    pub async fn rename_watch_expression(
        &mut self,
        session: Option<&SessionHandle>,
        frame: Option<&StackFrame>,
        id: &ElementId,
        new_name: impl Into<String>,
    ) {
        let Some(expression) = self.watch_expressions.iter().find(|e| e.id() == id) else {
            tracing::debug!(%id, "no watch expression to rename");
            return;
        };
        expression.set_name(new_name);
        self.evaluate_watch_expressions(session, frame, Some(id)).await;
    }

    /// Re-evaluate one watch expression, or all of them concurrently
    pub async fn evaluate_watch_expressions(
        &mut self,
        session: Option<&SessionHandle>,
        frame: Option<&StackFrame>,
        id: Option<&ElementId>,
    ) {
        match id {
            Some(id) => {
                let Some(expression) = self.watch_expressions.iter().find(|e| e.id() == id) else {
                    tracing::debug!(%id, "no watch expression to evaluate");
                    return;
                };
                evaluate_expression(session, frame, expression, EvaluateContext::Watch).await;
                self.notifier
                    .fire(ModelEvent::WatchExpressionsChanged(Some(id.clone())));
            }
            None => {
                futures::future::join_all(self.watch_expressions.iter().map(|expression| {
                    evaluate_expression(session, frame, expression, EvaluateContext::Watch)
                }))
                .await;
                self.notifier.fire(ModelEvent::WatchExpressionsChanged(None));
            }
        }
    }

    /// Reset every watch expression to the "not available" placeholder
    pub fn clear_watch_expression_values(&mut self) {
        for expression in &self.watch_expressions {
            expression.set_unavailable(DEFAULT_VALUE);
        }
        self.notifier.fire(ModelEvent::WatchExpressionsChanged(None));
    }

    /// Remove one watch expression, or all of them
    pub fn remove_watch_expressions(&mut self, id: Option<&ElementId>) {
        match id {
            Some(id) => self.watch_expressions.retain(|e| e.id() != id),
            None => self.watch_expressions.clear(),
        }
        self.notifier.fire(ModelEvent::WatchExpressionsChanged(None));
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("threads", &self.threads)
            .field("breakpoints", &self.breakpoints)
            .field("watch_expressions", &self.watch_expressions.len())
            .field("repl_elements", &self.repl.len())
            .finish()
    }
}
