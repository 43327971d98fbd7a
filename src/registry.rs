//! The registry mapping effect interfaces to their live implementations.

#[cfg(feature = "no_std")]
use alloc::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "no_std")]
use alloc::sync::Arc;
#[cfg(feature = "no_std")]
use alloc::vec::Vec;
#[cfg(not(feature = "no_std"))]
use std::collections::{BTreeMap, BTreeSet};
#[cfg(not(feature = "no_std"))]
use std::sync::Arc;

use core::any::Any;

use spin::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::binder::BindingGuard;
use crate::key::SlotKey;
use crate::pending::{CallCell, PendingCall, RequestEntry};
use crate::proxy::{EffectAccessor, EffectProxy};
use crate::subscription::{StreamCell, Subscription, SubscriptionEntry};
use crate::{
    BindingId, BridgeConfig, BridgeError, BufferConfig, CallId, DuplicateBindPolicy, EffectKey,
    ItemSink, Responder, Result, ScopeId,
};

/// A bound instance with its concrete type erased. Always holds an `Arc<E>`.
pub(crate) type ErasedInstance = Arc<dyn Any + Send + Sync>;

/// A pending call as seen by the registry.
///
/// `assign` and `release` run under the registry lock, `dispatch` and
/// `close` never do.
pub(crate) trait CallEntry: Send + Sync {
    fn id(&self) -> CallId;

    /// Mark the call as handed to `binding`. Returns `false` once the call is
    /// finished.
    fn assign(&self, binding: BindingId) -> bool;

    /// Take the call back from `binding` if it still holds it.
    fn release(&self, binding: BindingId);

    fn dispatch(&self, registry: &EffectRegistry, instance: &ErasedInstance, binding: BindingId);

    fn close(&self, error: BridgeError);
}

/// A subscription as seen by the registry. Same locking rules as [`CallEntry`].
pub(crate) trait StreamEntry: Send + Sync {
    fn id(&self) -> u64;

    fn attach(&self, binding: BindingId) -> bool;

    fn detach(&self, binding: BindingId);

    fn start(&self, instance: &ErasedInstance, binding: BindingId);

    fn close(&self);
}

struct LiveBinding {
    id: BindingId,
    instance: ErasedInstance,
}

#[derive(Default)]
struct Slot {
    binding: Option<LiveBinding>,
    calls: Vec<Arc<dyn CallEntry>>,
    streams: Vec<Arc<dyn StreamEntry>>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.binding.is_none() && self.calls.is_empty() && self.streams.is_empty()
    }
}

#[derive(Default)]
struct State {
    slots: BTreeMap<SlotKey, Slot>,
    /// Closed scopes are remembered for the life of the registry so late
    /// binds and calls keep failing. Scope ids are never reused.
    closed: BTreeSet<ScopeId>,
    next_scope: u64,
    next_id: u64,
    clock: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn prune(&mut self, slot: &SlotKey) {
        if self.slots.get(slot).is_some_and(Slot::is_empty) {
            self.slots.remove(slot);
        }
    }
}

struct Inner {
    config: BridgeConfig,
    state: Mutex<State>,
}

/// Process-wide (or scope-wide) context holding every live binding.
///
/// The registry is an explicit value rather than global state: create one at
/// application start, hand clones to binders and proxies, and close its
/// scopes on teardown. Cloning is cheap and every clone shares the same
/// bindings.
///
/// Each (interface, scope) pair has at most one live binding. Pending calls
/// and subscriptions are routed through the pair rather than the instance, so
/// replacing the instance (a recreated screen, for example) transparently
/// reconnects them.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use effect_bridge::{EffectKey, EffectRegistry, ScopeId};
///
/// trait Toasts: Send + Sync {
///     fn show(&self, message: &str);
/// }
///
/// struct ConsoleToasts;
///
/// impl Toasts for ConsoleToasts {
///     fn show(&self, message: &str) {
///         println!("{message}");
///     }
/// }
///
/// let registry = EffectRegistry::default();
/// let toasts: Arc<dyn Toasts> = Arc::new(ConsoleToasts);
///
/// let binding = registry.bind(ScopeId::ROOT, toasts).unwrap();
/// assert!(registry.lookup::<dyn Toasts>(ScopeId::ROOT).is_some());
///
/// assert!(registry.unbind(EffectKey::of::<dyn Toasts>(), ScopeId::ROOT, binding));
/// assert!(registry.lookup::<dyn Toasts>(ScopeId::ROOT).is_none());
/// ```
#[derive(Clone)]
pub struct EffectRegistry {
    inner: portable_atomic_util::Arc<Inner>,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl EffectRegistry {
    /// Create an empty registry with a single open scope, [`ScopeId::ROOT`].
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            inner: portable_atomic_util::Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Install `instance` as the implementation of `E` in `scope`.
    ///
    /// Every pending call of the pair is dispatched to the new instance and
    /// every subscription is attached to it. If another binding is live it is
    /// replaced or the call fails, depending on
    /// [`BridgeConfig::duplicate_bind`].
    pub fn bind<E>(&self, scope: ScopeId, instance: Arc<E>) -> Result<BindingId>
    where
        E: ?Sized + Send + Sync + 'static,
    {
        let key = EffectKey::of::<E>();
        let slot_key = SlotKey { scope, key };
        let erased: ErasedInstance = Arc::new(instance);

        let (binding, replaced, calls, streams) = {
            let mut state = self.inner.state.lock();
            if state.closed.contains(&scope) {
                return Err(BridgeError::ScopeClosed { scope });
            }

            let binding = BindingId(state.next_id());
            state.tick();
            let slot = state.slots.entry(slot_key).or_default();

            if let Some(previous) = &slot.binding {
                match self.inner.config.duplicate_bind {
                    DuplicateBindPolicy::Reject => {
                        return Err(BridgeError::DuplicateBind { effect: key, scope });
                    }
                    DuplicateBindPolicy::Replace => {
                        warn!(effect = %key, %scope, previous = %previous.id, "replacing live binding");
                    }
                }
            }

            let replaced = slot.binding.take();
            if let Some(previous) = &replaced {
                slot.calls.iter().for_each(|call| call.release(previous.id));
                slot.streams.iter().for_each(|stream| stream.detach(previous.id));
            }

            slot.binding = Some(LiveBinding {
                id: binding,
                instance: erased.clone(),
            });

            let calls: Vec<_> = slot
                .calls
                .iter()
                .filter(|call| call.assign(binding))
                .cloned()
                .collect();
            let streams: Vec<_> = slot
                .streams
                .iter()
                .filter(|stream| stream.attach(binding))
                .cloned()
                .collect();

            (binding, replaced, calls, streams)
        };
        drop(replaced);

        debug!(
            effect = %key,
            %scope,
            %binding,
            calls = calls.len(),
            subscriptions = streams.len(),
            "bound effect"
        );

        for call in calls {
            call.dispatch(self, &erased, binding);
        }
        for stream in streams {
            stream.start(&erased, binding);
        }

        Ok(binding)
    }

    /// Remove `binding` from the pair, if it is still the current one.
    ///
    /// Returns `false` for stale unbinds, which happen routinely when a
    /// recreated component bound itself before its predecessor was torn down.
    /// Calls dispatched to the removed instance wait for the next binding;
    /// subscriptions keep their buffered items.
    pub fn unbind(&self, key: EffectKey, scope: ScopeId, binding: BindingId) -> bool {
        let slot_key = SlotKey { scope, key };

        let removed = {
            let mut state = self.inner.state.lock();
            let removed = match state.slots.get_mut(&slot_key) {
                Some(slot) if slot.binding.as_ref().is_some_and(|live| live.id == binding) => {
                    slot.calls.iter().for_each(|call| call.release(binding));
                    slot.streams.iter().for_each(|stream| stream.detach(binding));
                    slot.binding.take()
                }
                _ => None,
            };
            if removed.is_some() {
                state.tick();
                state.prune(&slot_key);
            }
            removed
        };

        match removed {
            Some(_) => {
                debug!(effect = %key, %scope, %binding, "unbound effect");
                true
            }
            None => {
                debug!(effect = %key, %scope, %binding, "ignoring stale unbind");
                false
            }
        }
    }

    /// [`unbind`](Self::unbind) for callers that only know the binding id.
    pub(crate) fn unbind_binding(&self, scope: ScopeId, binding: BindingId) -> bool {
        let key = {
            let state = self.inner.state.lock();
            state
                .slots
                .iter()
                .find(|(slot_key, slot)| {
                    slot_key.scope == scope
                        && slot.binding.as_ref().is_some_and(|live| live.id == binding)
                })
                .map(|(slot_key, _)| slot_key.key)
        };
        key.is_some_and(|key| self.unbind(key, scope, binding))
    }

    /// The implementation of `E` currently bound in `scope`.
    pub fn lookup<E>(&self, scope: ScopeId) -> Option<Arc<E>>
    where
        E: ?Sized + Send + Sync + 'static,
    {
        let slot_key = SlotKey {
            scope,
            key: EffectKey::of::<E>(),
        };
        let state = self.inner.state.lock();
        state
            .slots
            .get(&slot_key)
            .and_then(|slot| slot.binding.as_ref())
            .and_then(|live| live.instance.downcast_ref::<Arc<E>>())
            .cloned()
    }

    /// Whether an implementation of `key` is currently bound in `scope`.
    pub fn is_bound(&self, key: EffectKey, scope: ScopeId) -> bool {
        self.with_slot(key, scope, |slot| slot.binding.is_some())
    }

    /// Number of unfinished calls waiting on or dispatched to the pair.
    pub fn pending_calls(&self, key: EffectKey, scope: ScopeId) -> usize {
        self.with_slot(key, scope, |slot| slot.calls.len())
    }

    /// Number of live subscriptions on the pair.
    pub fn subscriptions(&self, key: EffectKey, scope: ScopeId) -> usize {
        self.with_slot(key, scope, |slot| slot.streams.len())
    }

    fn with_slot<R: Default>(&self, key: EffectKey, scope: ScopeId, f: impl FnOnce(&Slot) -> R) -> R {
        let state = self.inner.state.lock();
        state
            .slots
            .get(&SlotKey { scope, key })
            .map(f)
            .unwrap_or_default()
    }

    /// Allocate a fresh scope.
    pub fn create_scope(&self) -> ScopeId {
        let mut state = self.inner.state.lock();
        state.next_scope += 1;
        ScopeId(state.next_scope)
    }

    /// Tear `scope` down.
    ///
    /// All bindings of the scope are dropped, pending calls fail with
    /// [`BridgeError::ScopeClosed`] and subscriptions end. Later binds in the
    /// scope are refused and later calls fail immediately.
    #[instrument(level = "debug", skip(self))]
    pub fn close_scope(&self, scope: ScopeId) {
        let slots: Vec<Slot> = {
            let mut state = self.inner.state.lock();
            if !state.closed.insert(scope) {
                return;
            }
            state.tick();
            let keys: Vec<SlotKey> = state
                .slots
                .keys()
                .filter(|slot_key| slot_key.scope == scope)
                .copied()
                .collect();
            keys.iter()
                .filter_map(|slot_key| state.slots.remove(slot_key))
                .collect()
        };

        debug!(slots = slots.len(), "closing scope");

        for slot in slots {
            for call in &slot.calls {
                call.close(BridgeError::ScopeClosed { scope });
            }
            for stream in &slot.streams {
                stream.close();
            }
        }
    }

    /// Whether [`close_scope`](Self::close_scope) was called for `scope`.
    pub fn is_closed(&self, scope: ScopeId) -> bool {
        self.inner.state.lock().closed.contains(&scope)
    }

    /// Bind `instance` for as long as the returned guard lives.
    ///
    /// This is the surface composition scopes use to provide an
    /// implementation to a subtree.
    pub fn provide<E>(&self, scope: ScopeId, instance: Arc<E>) -> Result<BindingGuard<E>>
    where
        E: ?Sized + Send + Sync + 'static,
    {
        let binding = self.bind(scope, instance)?;
        Ok(BindingGuard::new(self.clone(), scope, binding))
    }

    /// The implementation a surrounding composition scope provided, if any.
    pub fn retrieve<E>(&self, scope: ScopeId) -> Option<Arc<E>>
    where
        E: ?Sized + Send + Sync + 'static,
    {
        self.lookup::<E>(scope)
    }

    /// Create the caller-side stand-in for `E` in `scope`.
    pub fn proxy<E>(&self, scope: ScopeId) -> EffectProxy<E>
    where
        E: ?Sized + Send + Sync + 'static,
    {
        EffectProxy::new(self.clone(), scope)
    }

    /// Create a typed accessor wrapping the proxy for its effect.
    pub fn accessor<A: EffectAccessor>(&self, scope: ScopeId) -> A {
        A::from_proxy(self.proxy::<A::Effect>(scope))
    }

    pub(crate) fn issue_request<E, T, F>(&self, scope: ScopeId, dispatch: F) -> PendingCall<T>
    where
        E: ?Sized + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(&E, Responder<T>) + Send + Sync + 'static,
    {
        let key = EffectKey::of::<E>();
        let slot_key = SlotKey { scope, key };

        let (id, issued_at) = {
            let mut state = self.inner.state.lock();
            (CallId(state.next_id()), state.tick())
        };

        let cell = portable_atomic_util::Arc::new(CallCell::new());
        let entry: Arc<dyn CallEntry> = Arc::new(RequestEntry::<E, T, F>::new(
            id,
            slot_key,
            cell.clone(),
            dispatch,
        ));
        let call = PendingCall::new(id, issued_at, cell, self.clone(), slot_key);

        trace!(effect = %key, %scope, call = %id, issued_at, "issuing call");
        self.enqueue_call(slot_key, entry);
        call
    }

    fn enqueue_call(&self, slot_key: SlotKey, entry: Arc<dyn CallEntry>) {
        let ready = {
            let mut state = self.inner.state.lock();
            if state.closed.contains(&slot_key.scope) {
                None
            } else {
                let slot = state.slots.entry(slot_key).or_default();
                slot.calls.push(entry.clone());
                Some(
                    slot.binding
                        .as_ref()
                        .filter(|live| entry.assign(live.id))
                        .map(|live| (live.id, live.instance.clone())),
                )
            }
        };

        match ready {
            None => entry.close(BridgeError::ScopeClosed {
                scope: slot_key.scope,
            }),
            Some(Some((binding, instance))) => entry.dispatch(self, &instance, binding),
            Some(None) => {
                debug!(effect = %slot_key.key, scope = %slot_key.scope, call = %entry.id(), "call waiting for binding");
            }
        }
    }

    pub(crate) fn forget_call(&self, slot_key: SlotKey, id: CallId) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.slots.get_mut(&slot_key) {
            slot.calls.retain(|call| call.id() != id);
            state.prune(&slot_key);
        }
    }

    pub(crate) fn open_subscription<E, T, F>(
        &self,
        scope: ScopeId,
        buffer: BufferConfig,
        attach: F,
    ) -> Subscription<T>
    where
        E: ?Sized + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(&E, ItemSink<T>) + Send + Sync + 'static,
    {
        let key = EffectKey::of::<E>();
        let slot_key = SlotKey { scope, key };
        let cell = portable_atomic_util::Arc::new(StreamCell::new(buffer));

        let ready = {
            let mut state = self.inner.state.lock();
            let id = state.next_id();
            let entry: Arc<dyn StreamEntry> =
                Arc::new(SubscriptionEntry::<E, T, F>::new(id, cell.clone(), attach));

            if state.closed.contains(&scope) {
                Err(entry)
            } else {
                let slot = state.slots.entry(slot_key).or_default();
                slot.streams.push(entry.clone());
                let live = slot
                    .binding
                    .as_ref()
                    .filter(|live| entry.attach(live.id))
                    .map(|live| (live.id, live.instance.clone()));
                Ok((entry, live))
            }
        };

        match ready {
            Err(entry) => {
                entry.close();
                Subscription::new(entry.id(), cell, self.clone(), slot_key)
            }
            Ok((entry, live)) => {
                debug!(effect = %key, %scope, subscription = entry.id(), attached = live.is_some(), "subscribed");
                if let Some((binding, instance)) = live {
                    entry.start(&instance, binding);
                }
                Subscription::new(entry.id(), cell, self.clone(), slot_key)
            }
        }
    }

    pub(crate) fn forget_subscription(&self, slot_key: SlotKey, id: u64) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.slots.get_mut(&slot_key) {
            slot.streams.retain(|stream| stream.id() != id);
            state.prune(&slot_key);
        }
    }
}
