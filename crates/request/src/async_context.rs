//! Asynchronous processing of a request.
//!
//! A handler suspends the request with `start_async`, which returns an [`AsyncContext`].
//! The context is the only piece of request state that crosses threads: it can be moved
//! to a timer or another task, which later calls [`AsyncContext::dispatch`] or
//! [`AsyncContext::complete`].
//!
//! The container, meanwhile, takes the [`AsyncSpan`] from the request and awaits it.
//! The span resolves once the context is dispatched or completed, or once the timeout
//! elapses, in which case the cycle is forcibly completed. The request itself travels
//! with whoever awaits the span, so exactly one worker owns it at any time.
//!
//! ```text
//! Sync --start--> Started --dispatch--> Dispatched --target returns--> Sync
//!                    |                      |
//!                    |                      +--target starts again--> Started
//!                    +--complete/timeout--> Completed
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::channel::oneshot;
use tracing::{debug, warn};

use crate::attribute::AttrValue;
use crate::dispatch::RequestDispatcher;
use crate::error::RequestError;
use crate::ensure;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsyncState {
    Sync,
    Started,
    Dispatched,
    Completed,
}

/// Why a suspended request was handed back to the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resumption {
    /// Run the request again against the given target.
    Dispatch(RequestDispatcher),
    /// Processing finished, the response can be closed.
    Complete,
    /// Neither dispatch nor complete happened in time, the cycle was completed by force.
    TimedOut,
}

/// The (request, response) pair an async cycle was started with.
///
/// `None` stands for the original object the container created.
#[derive(Clone, Default)]
pub struct AsyncEvent {
    request: Option<AttrValue>,
    response: Option<AttrValue>,
}

impl AsyncEvent {
    pub(crate) fn wrapping(request: AttrValue, response: AttrValue) -> Self {
        Self { request: Some(request), response: Some(response) }
    }

    pub fn request(&self) -> Option<&AttrValue> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&AttrValue> {
        self.response.as_ref()
    }
}

impl fmt::Debug for AsyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEvent")
            .field("wrapped_request", &self.request.is_some())
            .field("wrapped_response", &self.response.is_some())
            .finish()
    }
}

/// Notified of the lifecycle of one async cycle.
#[cfg_attr(test, mockall::automock)]
pub trait AsyncListener: Send + Sync {
    /// The request started a new cycle; this listener belongs to the previous one and is dropped.
    fn on_start_async(&self, _event: &AsyncEvent) {}

    fn on_complete(&self, _event: &AsyncEvent) {}

    /// Called before `on_complete` when the cycle is completed by the timeout.
    fn on_timeout(&self, _event: &AsyncEvent) {}
}

struct Cycle {
    state: AsyncState,
    dispatch_taken: bool,
    superseded: bool,
    timeout: Duration,
    signal: Option<oneshot::Sender<Resumption>>,
    listeners: Vec<Arc<dyn AsyncListener>>,
}

impl Cycle {
    fn ensure_live(&self) -> Result<(), RequestError> {
        ensure!(!self.superseded, RequestError::illegal_state("the async context has been superseded"));
        ensure!(self.state != AsyncState::Completed, RequestError::illegal_state("the async context has completed"));
        Ok(())
    }

    fn signal(&mut self, resumption: Resumption) {
        if let Some(sender) = self.signal.take() {
            if sender.send(resumption).is_err() {
                warn!("async span dropped before the request was resumed");
            }
        }
    }
}

struct Shared {
    id: u64,
    event: AsyncEvent,
    original_path: String,
    cycle: Mutex<Cycle>,
}

/// Handle to one async cycle of a request. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct AsyncContext {
    shared: Arc<Shared>,
}

impl AsyncContext {
    fn cycle(&self) -> MutexGuard<'_, Cycle> {
        self.shared.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AsyncState {
        let cycle = self.cycle();
        if cycle.superseded { AsyncState::Sync } else { cycle.state }
    }

    /// Dispatches the request back to the path it was originally received on.
    pub fn dispatch(&self) -> Result<(), RequestError> {
        let path = self.shared.original_path.clone();
        self.dispatch_to(&path)
    }

    /// Dispatches the request to `path`, resolved against the original request path.
    ///
    /// Allowed once per cycle, before `complete`.
    pub fn dispatch_to(&self, path: &str) -> Result<(), RequestError> {
        let target = RequestDispatcher::resolve(&self.shared.original_path, path)
            .ok_or_else(|| RequestError::illegal_state(format!("invalid dispatch target '{path}'")))?;

        let mut cycle = self.cycle();
        cycle.ensure_live()?;
        ensure!(
            cycle.state == AsyncState::Started,
            RequestError::illegal_state("dispatch has already been called for this async cycle")
        );

        debug!(cycle = self.shared.id, target = target.path(), "async dispatch");
        cycle.state = AsyncState::Dispatched;
        cycle.dispatch_taken = false;
        cycle.signal(Resumption::Dispatch(target));
        Ok(())
    }

    /// Completes the cycle and notifies the listeners.
    pub fn complete(&self) -> Result<(), RequestError> {
        let listeners = {
            let mut cycle = self.cycle();
            cycle.ensure_live()?;
            ensure!(
                cycle.state != AsyncState::Dispatched || cycle.dispatch_taken,
                RequestError::illegal_state("a dispatch is pending, complete from the dispatch target")
            );

            debug!(cycle = self.shared.id, "async complete");
            cycle.state = AsyncState::Completed;
            cycle.signal(Resumption::Complete);
            std::mem::take(&mut cycle.listeners)
        };

        for listener in listeners {
            listener.on_complete(&self.shared.event);
        }
        Ok(())
    }

    /// Forces completion when the span timed out, `false` if the cycle moved on in the meantime.
    fn expire(&self) -> bool {
        let listeners = {
            let mut cycle = self.cycle();
            if cycle.superseded || cycle.state != AsyncState::Started {
                return false;
            }

            warn!(cycle = self.shared.id, timeout = ?cycle.timeout, "async processing timed out");
            cycle.state = AsyncState::Completed;
            cycle.signal.take();
            std::mem::take(&mut cycle.listeners)
        };

        for listener in &listeners {
            listener.on_timeout(&self.shared.event);
        }
        for listener in &listeners {
            listener.on_complete(&self.shared.event);
        }
        true
    }

    pub fn timeout(&self) -> Duration {
        self.cycle().timeout
    }

    /// Changes the timeout of this cycle. `Duration::ZERO` disables it.
    pub fn set_timeout(&self, timeout: Duration) -> Result<(), RequestError> {
        let mut cycle = self.cycle();
        cycle.ensure_live()?;
        cycle.timeout = timeout;
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn AsyncListener>) -> Result<(), RequestError> {
        let mut cycle = self.cycle();
        cycle.ensure_live()?;
        cycle.listeners.push(listener);
        Ok(())
    }

    /// True when the cycle was started without wrapping the request or the response.
    pub fn has_original_request_and_response(&self) -> bool {
        self.shared.event.request.is_none() && self.shared.event.response.is_none()
    }

    /// The request object the cycle was started with, `None` for the original request.
    pub fn request(&self) -> Option<&AttrValue> {
        self.shared.event.request()
    }

    /// The response object the cycle was started with, `None` for the original response.
    pub fn response(&self) -> Option<&AttrValue> {
        self.shared.event.response()
    }
}

impl fmt::Debug for AsyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncContext").field("cycle", &self.shared.id).field("state", &self.state()).finish()
    }
}

/// The suspended part of an async cycle, awaited by the container.
#[derive(Debug)]
pub struct AsyncSpan {
    context: AsyncContext,
    receiver: oneshot::Receiver<Resumption>,
}

impl AsyncSpan {
    /// Waits until the request is dispatched or completed, or until the timeout elapses.
    ///
    /// The timeout is read when the wait begins, so changes made by the handler before
    /// it returned are honored.
    pub async fn resume(mut self) -> Resumption {
        let timeout = self.context.timeout();
        if !timeout.is_zero() {
            match tokio::time::timeout(timeout, &mut self.receiver).await {
                Ok(received) => return received.unwrap_or(Resumption::Complete),
                Err(_elapsed) => {
                    if self.context.expire() {
                        return Resumption::TimedOut;
                    }
                }
            }
        }

        // lost the race against dispatch or complete, the signal is on its way
        self.receiver.await.unwrap_or(Resumption::Complete)
    }
}

/// Per-request async state, owned by the request.
pub(crate) struct AsyncLifecycle {
    supported: bool,
    default_timeout: Duration,
    cycles: u64,
    current: Option<AsyncContext>,
    receiver: Option<oneshot::Receiver<Resumption>>,
}

impl AsyncLifecycle {
    pub(crate) fn new(supported: bool, default_timeout: Duration) -> Self {
        Self { supported, default_timeout, cycles: 0, current: None, receiver: None }
    }

    pub(crate) fn is_supported(&self) -> bool {
        self.supported
    }

    pub(crate) fn state(&self) -> AsyncState {
        self.current.as_ref().map_or(AsyncState::Sync, AsyncContext::state)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state() == AsyncState::Started
    }

    pub(crate) fn start(&mut self, event: AsyncEvent, original_path: &str) -> Result<AsyncContext, RequestError> {
        ensure!(self.supported, RequestError::illegal_state("async processing is not supported for this request"));

        let previous = match (self.state(), &self.current) {
            (AsyncState::Sync, _) => None,
            (AsyncState::Started, _) => return Err(RequestError::illegal_state("async processing has already started")),
            (AsyncState::Completed, _) => {
                return Err(RequestError::illegal_state("async processing has already completed"));
            }
            (AsyncState::Dispatched, Some(context)) => {
                let mut cycle = context.cycle();
                ensure!(cycle.dispatch_taken, RequestError::illegal_state("a dispatch is pending for this request"));
                cycle.superseded = true;
                Some(std::mem::take(&mut cycle.listeners))
            }
            (AsyncState::Dispatched, None) => None,
        };

        self.cycles += 1;
        let (sender, receiver) = oneshot::channel();
        let cycle = Cycle {
            state: AsyncState::Started,
            dispatch_taken: false,
            superseded: false,
            timeout: self.default_timeout,
            signal: Some(sender),
            listeners: Vec::new(),
        };
        let shared =
            Shared { id: self.cycles, event, original_path: original_path.to_string(), cycle: Mutex::new(cycle) };
        let context = AsyncContext { shared: Arc::new(shared) };

        for listener in previous.into_iter().flatten() {
            listener.on_start_async(&context.shared.event);
        }

        debug!(cycle = self.cycles, "async started");
        self.current = Some(context.clone());
        self.receiver = Some(receiver);
        Ok(context)
    }

    pub(crate) fn context(&self) -> Result<AsyncContext, RequestError> {
        match (&self.current, self.state()) {
            (Some(context), AsyncState::Started | AsyncState::Dispatched) => Ok(context.clone()),
            _ => Err(RequestError::illegal_state("the request is not in async mode")),
        }
    }

    pub(crate) fn take_span(&mut self) -> Result<AsyncSpan, RequestError> {
        match (&self.current, self.receiver.take()) {
            (Some(context), Some(receiver)) => Ok(AsyncSpan { context: context.clone(), receiver }),
            _ => Err(RequestError::illegal_state("the request has no suspended async cycle")),
        }
    }

    /// The container starts running a dispatch target for the pending dispatch.
    pub(crate) fn enter_dispatch(&mut self) -> Result<(), RequestError> {
        let context = self.current.as_ref().ok_or_else(|| RequestError::illegal_state("no async dispatch pending"))?;
        let mut cycle = context.cycle();
        ensure!(
            !cycle.superseded && cycle.state == AsyncState::Dispatched && !cycle.dispatch_taken,
            RequestError::illegal_state("no async dispatch pending")
        );
        cycle.dispatch_taken = true;
        Ok(())
    }

    /// The dispatch target returned. Ends the cycle unless the target started a new one or completed it.
    pub(crate) fn exit_dispatch(&mut self) -> AsyncState {
        let Some(context) = self.current.clone() else {
            return AsyncState::Sync;
        };

        let listeners = {
            let mut cycle = context.cycle();
            if cycle.superseded || cycle.state != AsyncState::Dispatched || !cycle.dispatch_taken {
                return if cycle.superseded { AsyncState::Sync } else { cycle.state };
            }
            cycle.superseded = true;
            std::mem::take(&mut cycle.listeners)
        };

        debug!(cycle = context.shared.id, "async dispatch returned, back to sync");
        for listener in listeners {
            listener.on_complete(&context.shared.event);
        }
        self.current = None;
        AsyncState::Sync
    }
}

impl fmt::Debug for AsyncLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncLifecycle")
            .field("supported", &self.supported)
            .field("state", &self.state())
            .field("cycles", &self.cycles)
            .finish()
    }
}
