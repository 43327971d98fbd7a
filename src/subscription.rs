//! Restartable streams fed by whichever implementation is currently bound.

#[cfg(feature = "no_std")]
use alloc::collections::VecDeque;
#[cfg(feature = "no_std")]
use alloc::sync::Arc;
#[cfg(feature = "no_std")]
use alloc::vec::Vec;
#[cfg(not(feature = "no_std"))]
use std::collections::VecDeque;
#[cfg(not(feature = "no_std"))]
use std::sync::Arc;

use core::fmt;
use core::future::Future;
use core::marker::PhantomData;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use futures::Stream;
use spin::Mutex;
use tracing::trace;

use crate::key::SlotKey;
use crate::registry::{ErasedInstance, StreamEntry};
use crate::{BindingId, BufferConfig, EffectRegistry, OverflowPolicy};

/// Why an [`ItemSink`] refused an item. The item is handed back.
#[derive(PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The buffer is full and the overflow policy is [`OverflowPolicy::Suspend`].
    Full(T),
    /// The sink's instance is no longer bound, the subscriber went away or
    /// the scope was closed.
    Detached(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Detached(item) => item,
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached(_))
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Detached(_) => f.write_str("Detached(..)"),
        }
    }
}

struct StreamState<T> {
    buffer: VecDeque<T>,
    config: BufferConfig,
    attached: Option<BindingId>,
    /// Scope torn down: the stream ends once drained.
    closed: bool,
    /// Subscriber dropped.
    abandoned: bool,
    reader: Option<Waker>,
    writers: Vec<Waker>,
}

impl<T> StreamState<T> {
    fn accepts(&self, binding: BindingId) -> bool {
        !self.closed && !self.abandoned && self.attached == Some(binding)
    }

    fn wake_writers(&mut self) -> Vec<Waker> {
        core::mem::take(&mut self.writers)
    }
}

pub(crate) struct StreamCell<T> {
    state: Mutex<StreamState<T>>,
}

impl<T> StreamCell<T> {
    pub(crate) fn new(config: BufferConfig) -> Self {
        // Fields are public, so a literal may bypass the clamp in `BufferConfig::new`.
        let config = BufferConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            state: Mutex::new(StreamState {
                buffer: VecDeque::new(),
                config,
                attached: None,
                closed: false,
                abandoned: false,
                reader: None,
                writers: Vec::new(),
            }),
        }
    }

    /// Offer an item from `binding`. When the buffer is full under
    /// [`OverflowPolicy::Suspend`], `waker` is registered before unlocking.
    fn offer(&self, binding: BindingId, item: T, waker: Option<&Waker>) -> Result<(), TrySendError<T>> {
        let reader = {
            let mut state = self.state.lock();
            if !state.accepts(binding) {
                return Err(TrySendError::Detached(item));
            }

            if state.buffer.len() >= state.config.capacity {
                match state.config.overflow {
                    OverflowPolicy::DropOldest => {
                        state.buffer.pop_front();
                        trace!(%binding, "buffer full, dropped oldest item");
                    }
                    OverflowPolicy::DropLatest => {
                        trace!(%binding, "buffer full, dropped latest item");
                        return Ok(());
                    }
                    OverflowPolicy::Suspend => {
                        if let Some(waker) = waker {
                            if !state.writers.iter().any(|w| w.will_wake(waker)) {
                                state.writers.push(waker.clone());
                            }
                        }
                        return Err(TrySendError::Full(item));
                    }
                }
            }

            state.buffer.push_back(item);
            state.reader.take()
        };
        if let Some(reader) = reader {
            reader.wake();
        }
        Ok(())
    }

    fn is_attached(&self, binding: BindingId) -> bool {
        self.state.lock().accepts(binding)
    }

    fn attach(&self, binding: BindingId) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.abandoned {
            return false;
        }
        state.attached = Some(binding);
        true
    }

    fn detach(&self, binding: BindingId) {
        let writers = {
            let mut state = self.state.lock();
            if state.attached != Some(binding) {
                return;
            }
            state.attached = None;
            state.wake_writers()
        };
        writers.into_iter().for_each(Waker::wake);
    }

    fn close(&self) {
        let (reader, writers) = {
            let mut state = self.state.lock();
            state.closed = true;
            state.attached = None;
            (state.reader.take(), state.wake_writers())
        };
        writers.into_iter().for_each(Waker::wake);
        if let Some(reader) = reader {
            reader.wake();
        }
    }

    fn abandon(&self) {
        let writers = {
            let mut state = self.state.lock();
            state.abandoned = true;
            state.attached = None;
            state.buffer.clear();
            state.wake_writers()
        };
        writers.into_iter().for_each(Waker::wake);
    }

    fn poll_item(&self, waker: &Waker) -> Poll<Option<T>> {
        let (item, writers) = {
            let mut state = self.state.lock();
            match state.buffer.pop_front() {
                Some(item) => (item, state.wake_writers()),
                None if state.closed => return Poll::Ready(None),
                None => {
                    if !state.reader.as_ref().is_some_and(|w| w.will_wake(waker)) {
                        state.reader = Some(waker.clone());
                    }
                    return Poll::Pending;
                }
            }
        };
        writers.into_iter().for_each(Waker::wake);
        Poll::Ready(Some(item))
    }

    fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    #[cfg(test)]
    fn waiting_writers(&self) -> usize {
        self.state.lock().writers.len()
    }
}

/// Registry-side record of a subscription.
pub(crate) struct SubscriptionEntry<E: ?Sized, T, F> {
    id: u64,
    cell: portable_atomic_util::Arc<StreamCell<T>>,
    attach: F,
    _effect: PhantomData<fn(&E)>,
}

impl<E: ?Sized, T, F> SubscriptionEntry<E, T, F> {
    pub(crate) fn new(id: u64, cell: portable_atomic_util::Arc<StreamCell<T>>, attach: F) -> Self {
        Self {
            id,
            cell,
            attach,
            _effect: PhantomData,
        }
    }
}

impl<E, T, F> StreamEntry for SubscriptionEntry<E, T, F>
where
    E: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(&E, ItemSink<T>) + Send + Sync + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn attach(&self, binding: BindingId) -> bool {
        self.cell.attach(binding)
    }

    fn detach(&self, binding: BindingId) {
        self.cell.detach(binding)
    }

    fn start(&self, instance: &ErasedInstance, binding: BindingId) {
        let Some(effect) = instance.downcast_ref::<Arc<E>>() else {
            return;
        };
        if !self.cell.is_attached(binding) {
            return;
        }
        trace!(subscription = self.id, %binding, "attaching subscription");
        (self.attach)(
            effect.as_ref(),
            ItemSink {
                cell: self.cell.clone(),
                binding,
            },
        );
    }

    fn close(&self) {
        self.cell.close()
    }
}

/// The implementation's handle for feeding one subscription.
///
/// A sink is tied to the instance it was handed to. After that instance is
/// unbound every send is refused with [`TrySendError::Detached`]; the next
/// bound instance receives a fresh sink for the same subscription, and items
/// already buffered are kept.
pub struct ItemSink<T> {
    cell: portable_atomic_util::Arc<StreamCell<T>>,
    binding: BindingId,
}

impl<T> Clone for ItemSink<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            binding: self.binding,
        }
    }
}

impl<T> ItemSink<T> {
    /// Send without waiting. Overflow is handled by the buffer's policy;
    /// under [`OverflowPolicy::Suspend`] a full buffer refuses the item.
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        self.cell.offer(self.binding, item, None)
    }

    /// Send, waiting for room under [`OverflowPolicy::Suspend`].
    ///
    /// Resolves to [`TrySendError::Detached`] if the sink detaches while
    /// waiting.
    pub fn send(&self, item: T) -> SendItem<'_, T> {
        SendItem {
            sink: self,
            item: Some(item),
        }
    }

    /// Whether sends from this sink are still accepted.
    pub fn is_attached(&self) -> bool {
        self.cell.is_attached(self.binding)
    }

    pub fn binding(&self) -> BindingId {
        self.binding
    }
}

/// Future returned by [`ItemSink::send`].
#[must_use = "futures do nothing unless polled"]
pub struct SendItem<'a, T> {
    sink: &'a ItemSink<T>,
    item: Option<T>,
}

// The item is moved out by value and never pinned.
impl<T> Unpin for SendItem<'_, T> {}

impl<T> Future for SendItem<'_, T> {
    type Output = Result<(), TrySendError<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(item) = self.item.take() else {
            return Poll::Ready(Ok(()));
        };
        match self.sink.cell.offer(self.sink.binding, item, Some(cx.waker())) {
            Err(TrySendError::Full(item)) => {
                self.item = Some(item);
                Poll::Pending
            }
            result => Poll::Ready(result),
        }
    }
}

/// A lazy, restartable stream of items produced by the bound implementation.
///
/// While nothing is bound the stream is idle. When an implementation is bound
/// it receives an [`ItemSink`] and its items arrive in emission order. The
/// stream only ends when its scope is closed. Dropping the subscription
/// detaches it from the registry.
pub struct Subscription<T> {
    id: u64,
    cell: portable_atomic_util::Arc<StreamCell<T>>,
    registry: EffectRegistry,
    slot: SlotKey,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: u64,
        cell: portable_atomic_util::Arc<StreamCell<T>>,
        registry: EffectRegistry,
        slot: SlotKey,
    ) -> Self {
        Self {
            id,
            cell,
            registry,
            slot,
        }
    }

    /// Items waiting to be consumed.
    pub fn buffered(&self) -> usize {
        self.cell.len()
    }

    /// Whether an implementation is currently feeding this subscription.
    pub fn is_attached(&self) -> bool {
        self.cell.state.lock().attached.is_some()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.cell.poll_item(cx.waker())
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cell.abandon();
        self.registry.forget_subscription(self.slot, self.id);
    }
}
