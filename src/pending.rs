//! Suspendable request/response calls and their completion handles.

#[cfg(feature = "no_std")]
use alloc::boxed::Box;
#[cfg(feature = "no_std")]
use alloc::string::String;
#[cfg(feature = "no_std")]
use alloc::sync::Arc;
#[cfg(not(feature = "no_std"))]
use std::sync::Arc;

use core::future::Future;
use core::marker::PhantomData;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use spin::Mutex;
use tracing::{debug, trace};

use crate::key::SlotKey;
use crate::registry::{CallEntry, ErasedInstance};
use crate::{BindingId, BridgeError, CallId, EffectRegistry, Result};

type CancelHook = Box<dyn FnOnce() + Send>;

struct CallState<T> {
    outcome: Option<Result<T>>,
    finished: bool,
    cancelled: bool,
    attempt: Option<BindingId>,
    on_cancel: Option<CancelHook>,
    waker: Option<Waker>,
}

/// Completion cell shared by the caller, the registry and the responder.
pub(crate) struct CallCell<T> {
    state: Mutex<CallState<T>>,
}

impl<T> CallCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                outcome: None,
                finished: false,
                cancelled: false,
                attempt: None,
                on_cancel: None,
                waker: None,
            }),
        }
    }

    fn is_attempt(&self, binding: BindingId) -> bool {
        let state = self.state.lock();
        !state.finished && state.attempt == Some(binding)
    }

    fn assign(&self, binding: BindingId) -> bool {
        let mut state = self.state.lock();
        if state.finished {
            return false;
        }
        state.attempt = Some(binding);
        state.on_cancel = None;
        true
    }

    fn release(&self, binding: BindingId) {
        let mut state = self.state.lock();
        if state.attempt == Some(binding) {
            state.attempt = None;
            state.on_cancel = None;
        }
    }

    /// Finish the call. With `from` set, only the responder holding the
    /// current attempt may finish it.
    fn complete(&self, from: Option<BindingId>, outcome: Result<T>) -> bool {
        let waker = {
            let mut state = self.state.lock();
            if state.finished || from.is_some_and(|binding| state.attempt != Some(binding)) {
                return false;
            }
            state.finished = true;
            state.outcome = Some(outcome);
            state.on_cancel = None;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Cancel the call and run the implementation's hook, if one is set.
    fn cancel(&self) -> bool {
        let (hook, waker) = {
            let mut state = self.state.lock();
            if state.finished {
                return false;
            }
            state.finished = true;
            state.cancelled = true;
            state.outcome = Some(Err(BridgeError::Cancelled));
            (state.on_cancel.take(), state.waker.take())
        };
        if let Some(hook) = hook {
            hook();
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn set_hook(&self, binding: BindingId, hook: CancelHook) {
        let run_now = {
            let mut state = self.state.lock();
            if state.cancelled && state.attempt == Some(binding) {
                Some(hook)
            } else {
                if !state.finished && state.attempt == Some(binding) {
                    state.on_cancel = Some(hook);
                }
                None
            }
        };
        if let Some(hook) = run_now {
            hook();
        }
    }

    fn poll_outcome(&self, waker: &Waker) -> Poll<Result<T>> {
        let mut state = self.state.lock();
        match state.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None if state.finished => Poll::Ready(Err(BridgeError::Cancelled)),
            None => {
                if !state.waker.as_ref().is_some_and(|w| w.will_wake(waker)) {
                    state.waker = Some(waker.clone());
                }
                Poll::Pending
            }
        }
    }
}

/// Registry-side record of a request issued through a proxy.
pub(crate) struct RequestEntry<E: ?Sized, T, F> {
    id: CallId,
    slot: SlotKey,
    cell: portable_atomic_util::Arc<CallCell<T>>,
    dispatch: F,
    _effect: PhantomData<fn(&E)>,
}

impl<E: ?Sized, T, F> RequestEntry<E, T, F> {
    pub(crate) fn new(
        id: CallId,
        slot: SlotKey,
        cell: portable_atomic_util::Arc<CallCell<T>>,
        dispatch: F,
    ) -> Self {
        Self {
            id,
            slot,
            cell,
            dispatch,
            _effect: PhantomData,
        }
    }
}

impl<E, T, F> CallEntry for RequestEntry<E, T, F>
where
    E: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(&E, Responder<T>) + Send + Sync + 'static,
{
    fn id(&self) -> CallId {
        self.id
    }

    fn assign(&self, binding: BindingId) -> bool {
        self.cell.assign(binding)
    }

    fn release(&self, binding: BindingId) {
        self.cell.release(binding)
    }

    fn dispatch(&self, registry: &EffectRegistry, instance: &ErasedInstance, binding: BindingId) {
        let Some(effect) = instance.downcast_ref::<Arc<E>>() else {
            return;
        };
        if !self.cell.is_attempt(binding) {
            trace!(call = %self.id, %binding, "skipping dispatch of released call");
            return;
        }

        trace!(effect = %self.slot.key, call = %self.id, %binding, "dispatching call");
        let responder = Responder {
            cell: self.cell.clone(),
            registry: registry.clone(),
            slot: self.slot,
            call: self.id,
            binding,
            answered: false,
        };
        (self.dispatch)(effect.as_ref(), responder);
    }

    fn close(&self, error: BridgeError) {
        self.cell.complete(None, Err(error));
    }
}

/// The implementation's handle for answering one pending call.
///
/// A responder belongs to the instance the call was dispatched to. Once that
/// instance is unbound, its responder goes stale: answers are ignored and the
/// call is dispatched again to the next instance bound for the interface.
///
/// Dropping a current responder without answering fails the call with
/// [`BridgeError::Abandoned`], so callers never wait on an answer nobody will
/// give.
pub struct Responder<T> {
    cell: portable_atomic_util::Arc<CallCell<T>>,
    registry: EffectRegistry,
    slot: SlotKey,
    call: CallId,
    binding: BindingId,
    answered: bool,
}

impl<T> Responder<T> {
    /// Complete the call with `value`. Returns `false` if the answer was
    /// ignored because the call already finished or this responder is stale.
    pub fn resolve(mut self, value: T) -> bool {
        self.answer(Ok(value))
    }

    /// Complete the call with [`BridgeError::EffectFailed`].
    pub fn fail<S: Into<String>>(mut self, reason: S) -> bool {
        self.answer(Err(BridgeError::failed(reason)))
    }

    /// Register what to do when the caller gives up, e.g. dismiss a dialog.
    ///
    /// The hook runs at most once. If the caller already cancelled it runs
    /// immediately; if the call completes or this responder goes stale it is
    /// dropped without running.
    pub fn on_cancel<H>(&self, hook: H)
    where
        H: FnOnce() + Send + 'static,
    {
        self.cell.set_hook(self.binding, Box::new(hook));
    }

    /// Whether answers from this responder would still be accepted.
    pub fn is_current(&self) -> bool {
        self.cell.is_attempt(self.binding)
    }

    pub fn call_id(&self) -> CallId {
        self.call
    }

    pub fn binding(&self) -> BindingId {
        self.binding
    }

    fn answer(&mut self, outcome: Result<T>) -> bool {
        self.answered = true;
        let accepted = self.cell.complete(Some(self.binding), outcome);
        if accepted {
            self.registry.forget_call(self.slot, self.call);
        } else {
            debug!(call = %self.call, binding = %self.binding, "ignoring answer from stale responder");
        }
        accepted
    }
}

impl<T> Drop for Responder<T> {
    fn drop(&mut self) {
        if self.answered || !self.cell.is_attempt(self.binding) {
            return;
        }
        let effect = self.slot.key;
        if self.answer(Err(BridgeError::Abandoned { effect })) {
            debug!(%effect, call = %self.call, "responder dropped without answering");
        }
    }
}

/// A suspendable call waiting for an implementation to answer.
///
/// Resolves to the implementation's answer, to [`BridgeError::Cancelled`] if
/// the call was cancelled, or to [`BridgeError::ScopeClosed`] on teardown.
/// There is no built-in timeout: race the call against your runtime's timer
/// and drop it to give up.
///
/// Dropping an unfinished call cancels it. Use [`PendingCall::detach`] to let
/// it complete unobserved instead.
#[must_use = "dropping a pending call cancels it"]
pub struct PendingCall<T> {
    id: CallId,
    issued_at: u64,
    cell: portable_atomic_util::Arc<CallCell<T>>,
    registry: EffectRegistry,
    slot: SlotKey,
    detached: bool,
}

impl<T> PendingCall<T> {
    pub(crate) fn new(
        id: CallId,
        issued_at: u64,
        cell: portable_atomic_util::Arc<CallCell<T>>,
        registry: EffectRegistry,
        slot: SlotKey,
    ) -> Self {
        Self {
            id,
            issued_at,
            cell,
            registry,
            slot,
            detached: false,
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    /// Logical registry time at which the call was issued.
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Cancel the call.
    ///
    /// The implementation's cancellation hook has run by the time this
    /// returns. Returns `false` if the call had already finished, in which
    /// case nothing happens.
    pub fn cancel(&self) -> bool {
        self.cancel_handle().cancel()
    }

    /// A handle that cancels this call from elsewhere, e.g. the task owning
    /// the caller's scope.
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            id: self.id,
            cell: self.cell.clone(),
            registry: self.registry.clone(),
            slot: self.slot,
        }
    }

    /// Let the call run to completion without awaiting it.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl<T> Future for PendingCall<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.cell.poll_outcome(cx.waker())
    }
}

impl<T> Drop for PendingCall<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.cancel();
        }
    }
}

/// Cancels a [`PendingCall`] from outside the task awaiting it.
pub struct CancelHandle<T> {
    id: CallId,
    cell: portable_atomic_util::Arc<CallCell<T>>,
    registry: EffectRegistry,
    slot: SlotKey,
}

impl<T> Clone for CancelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: self.cell.clone(),
            registry: self.registry.clone(),
            slot: self.slot,
        }
    }
}

impl<T> CancelHandle<T> {
    /// See [`PendingCall::cancel`].
    pub fn cancel(&self) -> bool {
        let cancelled = self.cell.cancel();
        if cancelled {
            self.registry.forget_call(self.slot, self.id);
            debug!(effect = %self.slot.key, call = %self.id, "cancelled call");
        }
        cancelled
    }
}
