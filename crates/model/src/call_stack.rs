//! Threads, their call stacks and the scopes of each stack frame
use std::sync::{Arc, Mutex, Weak};

use futures::{FutureExt, future::BoxFuture};
use protocol::{
    DEFAULT_STACK_FRAME_PAGE_SIZE,
    events::StoppedEventBody,
    requests,
    types::{self, BreakpointId, StackFrameId, ThreadId, VariablesReference},
};

use crate::{
    ElementId, SessionHandle, Source, ValueTracker, Variable,
    expression::{WeakParent, fetch_variables},
    fetch::{Memo, lock},
};

const UNKNOWN_STACK_LOCATION: &str = "Unknown stack location";

/// Why a thread stopped, plus what was learned while fetching its call stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoppedDetails {
    pub reason: String,
    pub description: Option<String>,
    pub text: Option<String>,
    pub hit_breakpoint_ids: Vec<BreakpointId>,
    /// Total number of frames reported by the last `stackTrace` response
    pub total_frames: Option<usize>,
    /// Message of the last failed `stackTrace` request
    pub frames_error_message: Option<String>,
}

impl StoppedDetails {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Default::default()
        }
    }
}

impl From<&StoppedEventBody> for StoppedDetails {
    fn from(body: &StoppedEventBody) -> Self {
        Self {
            reason: body.reason.as_str().to_string(),
            description: body.description.clone(),
            text: body.text.clone(),
            hit_breakpoint_ids: body.hit_breakpoint_ids.clone().unwrap_or_default(),
            total_frames: None,
            frames_error_message: None,
        }
    }
}

#[derive(Debug, Default)]
struct ThreadState {
    stopped: bool,
    stopped_details: Option<StoppedDetails>,
}

/// A thread of the debuggee, with a call stack that is fetched page by page while stopped
pub struct Thread {
    name: String,
    thread_id: ThreadId,
    page_size: i64,
    values: ValueTracker,
    state: Mutex<ThreadState>,
    call_stack: Memo<Vec<Arc<StackFrame>>>,
}

impl Thread {
    pub fn new(name: impl Into<String>, thread_id: ThreadId, values: &ValueTracker) -> Self {
        Self {
            name: name.into(),
            thread_id,
            page_size: DEFAULT_STACK_FRAME_PAGE_SIZE,
            values: values.clone(),
            state: Mutex::new(ThreadState::default()),
            call_stack: Memo::new(),
        }
    }

    /// Number of frames requested per `stackTrace` page, at least one
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn id(&self) -> ElementId {
        ElementId::thread(&self.name, self.thread_id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn stopped(&self) -> bool {
        lock(&self.state).stopped
    }

    pub fn stopped_details(&self) -> Option<StoppedDetails> {
        lock(&self.state).stopped_details.clone()
    }

    /// Mark the thread stopped and drop any frames fetched before this stop
    pub(crate) fn set_stopped(&self, details: StoppedDetails) {
        {
            let mut state = lock(&self.state);
            state.stopped = true;
            state.stopped_details = Some(details);
        }
        self.clear_call_stack();
    }

    /// Mark the thread running: no stop details and no frames
    pub(crate) fn set_running(&self) {
        {
            let mut state = lock(&self.state);
            state.stopped = false;
            state.stopped_details = None;
        }
        self.clear_call_stack();
    }

    /// Forget cached and in-flight frames; the next [`Thread::call_stack`] fetches afresh
    pub fn clear_call_stack(&self) {
        tracing::debug!(thread_id = self.thread_id, "clearing call stack");
        self.call_stack.clear();
    }

    /// Frames of the last completed fetch
    pub fn cached_call_stack(&self) -> Option<Vec<Arc<StackFrame>>> {
        self.call_stack.cached()
    }

    /// The call stack of a stopped thread.
    ///
    /// The first call fetches one page; concurrent callers share that fetch. With `extend`, the
    /// next page (starting after the frames already fetched) is appended to the cached frames.
    #[tracing::instrument(skip(self, session), fields(thread_id = self.thread_id))]
    pub async fn call_stack(
        self: &Arc<Self>,
        session: Option<&SessionHandle>,
        extend: bool,
    ) -> Vec<Arc<StackFrame>> {
        if !self.stopped() {
            return Vec::new();
        }
        let Some(session) = session else {
            return Vec::new();
        };

        let fetch = {
            let thread = Arc::downgrade(self);
            let session = Arc::clone(session);
            move |generation| fetch_page(thread, session, 0, generation).boxed()
        };

        if !extend {
            return self.call_stack.get_or_fetch(fetch).await;
        }

        let thread = Arc::downgrade(self);
        let session = Arc::clone(session);
        self.call_stack
            .extend(fetch, move |previous: BoxFuture<'static, _>, generation| {
                async move {
                    let mut frames: Vec<Arc<StackFrame>> = previous.await;
                    let more = fetch_page(thread, session, frames.len(), generation).await;
                    frames.extend(more);
                    frames
                }
                .boxed()
            })
            .await
    }

    /// Apply `f` to the stop details, unless the call stack was cleared since `generation`
    fn update_details(&self, generation: u64, f: impl FnOnce(&mut StoppedDetails)) {
        if self.call_stack.generation() != generation {
            tracing::debug!(thread_id = self.thread_id, "ignoring details of stale fetch");
            return;
        }
        if let Some(details) = lock(&self.state).stopped_details.as_mut() {
            f(details);
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("state", &*lock(&self.state))
            .finish()
    }
}

/// Fetch one page of frames starting at `start`; failures yield no frames
async fn fetch_page(
    thread: Weak<Thread>,
    session: SessionHandle,
    start: usize,
    generation: u64,
) -> Vec<Arc<StackFrame>> {
    let Some((thread_id, page_size, values)) = thread
        .upgrade()
        .map(|t| (t.thread_id, t.page_size, t.values.clone()))
    else {
        return Vec::new();
    };

    tracing::debug!(thread_id, start, "fetching stack frames");
    let result = session
        .stack_trace(requests::StackTrace {
            thread_id,
            start_frame: Some(start as i64),
            levels: Some(page_size),
        })
        .await;

    match result {
        Ok(response) => {
            if let Some(thread) = thread.upgrade() {
                thread.update_details(generation, |details| {
                    details.total_frames = response.total_frames;
                });
            }
            response
                .stack_frames
                .into_iter()
                .map(|frame| Arc::new(StackFrame::from_response(thread_id, frame, &values)))
                .collect()
        }
        Err(e) => {
            tracing::warn!(error = %e, thread_id, start, "fetching stack frames failed");
            if let Some(thread) = thread.upgrade() {
                thread.update_details(generation, |details| {
                    details.frames_error_message = Some(e.to_string());
                });
            }
            Vec::new()
        }
    }
}

/// One frame of a stopped thread
pub struct StackFrame {
    thread_id: ThreadId,
    frame_id: StackFrameId,
    source: Mutex<Source>,
    name: String,
    line: Option<usize>,
    column: Option<usize>,
    values: ValueTracker,
    scopes: Memo<Vec<Arc<Scope>>>,
}

impl StackFrame {
    pub fn new(
        thread_id: ThreadId,
        frame_id: StackFrameId,
        source: Source,
        name: impl Into<String>,
        line: Option<usize>,
        column: Option<usize>,
        values: &ValueTracker,
    ) -> Self {
        Self {
            thread_id,
            frame_id,
            source: Mutex::new(source),
            name: name.into(),
            line,
            column,
            values: values.clone(),
            scopes: Memo::new(),
        }
    }

    /// Null entries become a placeholder so frame indices stay aligned
    fn from_response(
        thread_id: ThreadId,
        frame: Option<types::StackFrame>,
        values: &ValueTracker,
    ) -> Self {
        match frame {
            Some(frame) => Self::new(
                thread_id,
                frame.id,
                frame.source.map(Source::new).unwrap_or_else(Source::unknown),
                frame.name,
                Some(frame.line),
                Some(frame.column),
                values,
            ),
            None => Self::new(
                thread_id,
                0,
                Source::unknown(),
                UNKNOWN_STACK_LOCATION,
                None,
                None,
                values,
            ),
        }
    }

    pub fn id(&self) -> ElementId {
        ElementId::stack_frame(self.thread_id, self.frame_id)
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn frame_id(&self) -> StackFrameId {
        self.frame_id
    }

    pub fn source(&self) -> Source {
        lock(&self.source).clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// Returns whether the frame's source matched
    pub(crate) fn mark_source_unavailable(&self, source: &Source) -> bool {
        let mut own = lock(&self.source);
        if own.same_origin(source) {
            own.set_available(false);
            true
        } else {
            false
        }
    }

    /// Scopes of this frame, fetched once. A failed fetch yields no scopes.
    #[tracing::instrument(skip(self, session), fields(id = %self.id()))]
    pub async fn scopes(&self, session: Option<&SessionHandle>) -> Vec<Arc<Scope>> {
        let Some(session) = session else {
            return Vec::new();
        };

        let session = Arc::clone(session);
        let thread_id = self.thread_id;
        let frame_id = self.frame_id;
        let values = self.values.clone();
        self.scopes
            .get_or_fetch(move |_| {
                async move {
                    match session.scopes(requests::Scopes { frame_id }).await {
                        Ok(response) => response
                            .scopes
                            .into_iter()
                            .map(|scope| {
                                Arc::new(Scope::new(
                                    thread_id,
                                    scope.name,
                                    scope.variables_reference,
                                    scope.expensive,
                                    &values,
                                ))
                            })
                            .collect(),
                        Err(e) => {
                            tracing::warn!(error = %e, frame_id, "fetching scopes failed");
                            Vec::new()
                        }
                    }
                }
                .boxed()
            })
            .await
    }
}

impl std::fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackFrame")
            .field("thread_id", &self.thread_id)
            .field("frame_id", &self.frame_id)
            .field("name", &self.name)
            .field("line", &self.line)
            .finish()
    }
}

/// A named group of variables of a stack frame
pub struct Scope {
    thread_id: ThreadId,
    name: String,
    reference: VariablesReference,
    expensive: bool,
    values: ValueTracker,
    children: Memo<Vec<Arc<Variable>>>,
}

impl Scope {
    pub fn new(
        thread_id: ThreadId,
        name: impl Into<String>,
        reference: VariablesReference,
        expensive: bool,
        values: &ValueTracker,
    ) -> Self {
        Self {
            thread_id,
            name: name.into(),
            reference,
            expensive,
            values: values.clone(),
            children: Memo::new(),
        }
    }

    pub fn id(&self) -> ElementId {
        ElementId::scope(self.thread_id, &self.name, self.reference)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> VariablesReference {
        self.reference
    }

    pub fn expensive(&self) -> bool {
        self.expensive
    }

    /// Variables of this scope, fetched once. A failed fetch yields no variables.
    #[tracing::instrument(skip_all, fields(id = %self.id()))]
    pub async fn children(self: &Arc<Self>, session: Option<&SessionHandle>) -> Vec<Arc<Variable>> {
        let Some(session) = session.filter(|_| self.reference > 0) else {
            return Vec::new();
        };

        let session = Arc::clone(session);
        let parent = WeakParent::Scope(Arc::downgrade(self));
        let id = self.id();
        let reference = self.reference;
        let values = self.values.clone();
        self.children
            .get_or_fetch(move |_| {
                async move {
                    fetch_variables(session, parent, id, reference, values)
                        .await
                        .unwrap_or_else(|e| {
                            tracing::warn!(error = %e, reference, "fetching scope variables failed");
                            Vec::new()
                        })
                }
                .boxed()
            })
            .await
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("reference", &self.reference)
            .field("expensive", &self.expensive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExpressionParent, memory::InMemorySession};

    fn frames(count: i64) -> Vec<Option<types::StackFrame>> {
        (0..count)
            .map(|i| Some(types::StackFrame::new(i + 1, format!("frame{i}"), i as usize + 1, 1)))
            .collect()
    }

    fn stopped_thread(values: &ValueTracker) -> Arc<Thread> {
        let thread = Arc::new(Thread::new("main", 1, values));
        thread.set_stopped(StoppedDetails::new("breakpoint"));
        thread
    }

    fn session() -> (Arc<InMemorySession>, SessionHandle) {
        let session = Arc::new(InMemorySession::new());
        let handle: SessionHandle = session.clone();
        (session, handle)
    }

    #[tokio::test]
    async fn running_thread_has_no_call_stack() {
        let (backend, handle) = session();
        let thread = Arc::new(Thread::new("main", 1, &ValueTracker::new()));

        assert!(thread.call_stack(Some(&handle), false).await.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn first_page_is_cached() {
        let (backend, handle) = session();
        backend.set_stack(1, frames(30));
        let thread = stopped_thread(&ValueTracker::new());

        let stack = thread.call_stack(Some(&handle), false).await;
        assert_eq!(stack.len(), 20);
        thread.call_stack(Some(&handle), false).await;

        assert_eq!(
            backend.stack_trace_calls(),
            vec![requests::StackTrace {
                thread_id: 1,
                start_frame: Some(0),
                levels: Some(20),
            }]
        );
        assert_eq!(thread.stopped_details().unwrap().total_frames, Some(30));
        assert_eq!(thread.cached_call_stack().map(|s| s.len()), Some(20));
    }

    #[tokio::test]
    async fn extending_fetches_only_new_frames() {
        let (backend, handle) = session();
        backend.set_stack(1, frames(30));
        let thread = stopped_thread(&ValueTracker::new());

        thread.call_stack(Some(&handle), false).await;
        let stack = thread.call_stack(Some(&handle), true).await;

        let ids: Vec<_> = stack.iter().map(|f| f.frame_id()).collect();
        assert_eq!(ids, (1..=30).collect::<Vec<_>>());
        let starts: Vec<_> = backend
            .stack_trace_calls()
            .iter()
            .map(|c| c.start_frame)
            .collect();
        assert_eq!(starts, vec![Some(0), Some(20)]);
    }

    #[tokio::test]
    async fn clearing_forces_a_fresh_fetch() {
        let (backend, handle) = session();
        backend.set_stack(1, frames(3));
        let thread = stopped_thread(&ValueTracker::new());

        thread.call_stack(Some(&handle), false).await;
        thread.clear_call_stack();
        assert!(thread.cached_call_stack().is_none());
        thread.call_stack(Some(&handle), false).await;

        assert_eq!(backend.stack_trace_calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_extension_keeps_cached_frames() {
        let (backend, handle) = session();
        backend.set_stack(1, frames(25));
        let thread = stopped_thread(&ValueTracker::new());
        thread.call_stack(Some(&handle), false).await;

        backend.fail_stack_trace(1, "adapter crashed");
        let stack = thread.call_stack(Some(&handle), true).await;

        assert_eq!(stack.len(), 20);
        assert_eq!(
            thread.stopped_details().unwrap().frames_error_message.as_deref(),
            Some("adapter crashed")
        );
    }

    #[tokio::test]
    async fn null_frames_become_placeholders() {
        let (backend, handle) = session();
        backend.set_stack(
            1,
            vec![Some(types::StackFrame::new(4, "main", 3, 1)), None],
        );
        let thread = stopped_thread(&ValueTracker::new());

        let stack = thread.call_stack(Some(&handle), false).await;
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[1].frame_id(), 0);
        assert_eq!(stack[1].name(), UNKNOWN_STACK_LOCATION);
        assert!(!stack[1].source().available());
        // a frame without a source also gets the placeholder
        assert!(!stack[0].source().available());
    }

    #[tokio::test]
    async fn stale_frames_are_discarded() {
        let (backend, handle) = session();
        backend.set_stack(1, frames(3));
        let thread = stopped_thread(&ValueTracker::new());

        backend.pause();
        let task = {
            let thread = Arc::clone(&thread);
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { thread.call_stack(Some(&handle), false).await.len() })
        };
        while backend.stack_trace_calls().is_empty() {
            tokio::task::yield_now().await;
        }

        // a new stop arrives while the request is in flight
        thread.set_stopped(StoppedDetails::new("step"));
        backend.resume();
        assert_eq!(task.await.unwrap(), 3);

        assert!(thread.cached_call_stack().is_none());
        assert_eq!(thread.stopped_details().unwrap().total_frames, None);
    }

    #[tokio::test]
    async fn frames_arriving_after_continue_are_dropped() {
        let (backend, handle) = session();
        backend.set_stack(1, frames(3));
        let thread = stopped_thread(&ValueTracker::new());

        backend.pause();
        let task = {
            let thread = Arc::clone(&thread);
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { thread.call_stack(Some(&handle), false).await })
        };
        while backend.stack_trace_calls().is_empty() {
            tokio::task::yield_now().await;
        }

        thread.set_running();
        assert!(!thread.stopped());
        assert!(thread.call_stack(Some(&handle), false).await.is_empty());
        backend.resume();
        task.await.unwrap();

        assert!(thread.cached_call_stack().is_none());
        assert!(thread.stopped_details().is_none());
        assert_eq!(backend.stack_trace_calls().len(), 1);
    }

    #[tokio::test]
    async fn scopes_and_variables_are_fetched_once() {
        let (backend, handle) = session();
        let values = ValueTracker::new();
        backend.set_scopes(7, vec![types::Scope::new("Locals", 11)]);
        backend.set_variables(11, vec![types::Variable::new("x", "1", 0)]);
        let frame = StackFrame::new(1, 7, Source::unknown(), "main", Some(1), Some(1), &values);

        let scopes = frame.scopes(Some(&handle)).await;
        assert_eq!(scopes.len(), 1);
        frame.scopes(Some(&handle)).await;

        let scope = &scopes[0];
        let (a, b) = tokio::join!(scope.children(Some(&handle)), scope.children(Some(&handle)));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert!(matches!(a[0].parent(), Some(ExpressionParent::Scope(_))));

        assert_eq!(backend.variables_calls(), vec![11]);
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|c| matches!(c, crate::memory::SessionCall::Scopes(_)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_scope_fetches_are_empty() {
        let (backend, handle) = session();
        let values = ValueTracker::new();
        backend.fail_scopes(7, "no scopes");
        backend.fail_variables(11, "expensive");
        let frame = StackFrame::new(1, 7, Source::unknown(), "main", None, None, &values);
        let scope = Arc::new(Scope::new(1, "Globals", 11, true, &values));

        assert!(frame.scopes(Some(&handle)).await.is_empty());
        assert!(scope.children(Some(&handle)).await.is_empty());
    }

    #[tokio::test]
    async fn variables_report_changes_between_stops() {
        let (backend, handle) = session();
        let values = ValueTracker::new();

        backend.set_variables(11, vec![types::Variable::new("x", "1", 0)]);
        let first = Arc::new(Scope::new(1, "Locals", 11, false, &values));
        assert!(!first.children(Some(&handle)).await[0].value_changed());

        backend.set_variables(11, vec![types::Variable::new("x", "2", 0)]);
        let second = Arc::new(Scope::new(1, "Locals", 11, false, &values));
        assert!(second.children(Some(&handle)).await[0].value_changed());
    }
}
