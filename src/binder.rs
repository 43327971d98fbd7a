//! Lifecycle-aware glue installing implementations into the registry.

#[cfg(feature = "no_std")]
use alloc::sync::Arc;
#[cfg(not(feature = "no_std"))]
use std::sync::Arc;

use core::marker::PhantomData;

use tracing::{debug, trace, warn};

use crate::{BindingId, EffectKey, EffectRegistry, LifecycleEvent, LifecycleObserver, ScopeId};

/// Binding state of an [`EffectBinder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinderState {
    Unbound,
    Bound(BindingId),
    Destroyed,
}

/// Ties the binding of one implementation to its component's lifecycle.
///
/// The binder binds its instance when the component starts and unbinds it
/// when the component stops. The unbind is guarded by the binding id, so a
/// recreated component that already bound its own instance is never removed
/// by its predecessor. Once destroyed the binder releases its instance and
/// ignores further signals.
///
/// Pending calls and subscriptions are routed through the registry key, so a
/// stop followed by a start of a replacement component reconnects them
/// without the caller noticing.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use effect_bridge::{EffectBinder, EffectRegistry, LifecycleEvent, ScopeId, TestLifecycle};
///
/// trait Toasts: Send + Sync {
///     fn show(&self, message: &str);
/// }
///
/// struct Screen;
///
/// impl Toasts for Screen {
///     fn show(&self, _message: &str) {}
/// }
///
/// let registry = EffectRegistry::default();
/// let toasts: Arc<dyn Toasts> = Arc::new(Screen);
///
/// let mut lifecycle = TestLifecycle::new();
/// lifecycle.observe(EffectBinder::new(registry.clone(), ScopeId::ROOT, toasts));
///
/// lifecycle.drive(&[LifecycleEvent::Created, LifecycleEvent::Started]);
/// assert!(registry.lookup::<dyn Toasts>(ScopeId::ROOT).is_some());
///
/// lifecycle.drive(&[LifecycleEvent::Stopped, LifecycleEvent::Destroyed]);
/// assert!(registry.lookup::<dyn Toasts>(ScopeId::ROOT).is_none());
/// ```
pub struct EffectBinder<E: ?Sized> {
    registry: EffectRegistry,
    scope: ScopeId,
    instance: Option<Arc<E>>,
    state: BinderState,
}

impl<E> EffectBinder<E>
where
    E: ?Sized + Send + Sync + 'static,
{
    pub fn new(registry: EffectRegistry, scope: ScopeId, instance: Arc<E>) -> Self {
        Self {
            registry,
            scope,
            instance: Some(instance),
            state: BinderState::Unbound,
        }
    }

    pub fn state(&self) -> BinderState {
        self.state
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// `Unbound -> Bound`.
    pub fn start(&mut self) {
        let instance = match (&self.state, &self.instance) {
            (BinderState::Unbound, Some(instance)) => instance.clone(),
            (state, _) => {
                trace!(effect = %EffectKey::of::<E>(), ?state, "ignoring start");
                return;
            }
        };

        match self.registry.bind(self.scope, instance) {
            Ok(binding) => self.state = BinderState::Bound(binding),
            Err(error) => {
                warn!(effect = %EffectKey::of::<E>(), scope = %self.scope, %error, "could not bind effect");
            }
        }
    }

    /// `Bound -> Unbound`.
    pub fn stop(&mut self) {
        let BinderState::Bound(binding) = self.state else {
            return;
        };
        self.state = BinderState::Unbound;

        let key = EffectKey::of::<E>();
        if !self.registry.unbind(key, self.scope, binding) {
            debug!(effect = %key, scope = %self.scope, %binding, "binding was already superseded");
        }
    }

    /// Unbind if needed and release the instance for good.
    pub fn destroy(&mut self) {
        self.stop();
        self.instance = None;
        self.state = BinderState::Destroyed;
    }
}

impl<E> LifecycleObserver for EffectBinder<E>
where
    E: ?Sized + Send + Sync + 'static,
{
    fn on_event(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Created => {}
            LifecycleEvent::Started => self.start(),
            LifecycleEvent::Stopped => self.stop(),
            LifecycleEvent::Destroyed => self.destroy(),
        }
    }
}

impl<E: ?Sized> Drop for EffectBinder<E> {
    fn drop(&mut self) {
        if let BinderState::Bound(binding) = self.state {
            // Key derivation needs `E: 'static`, which `Drop` cannot require.
            self.registry.unbind_binding(self.scope, binding);
        }
    }
}

/// Keeps a binding alive for as long as it is held.
///
/// Returned by [`EffectRegistry::provide`].
#[must_use = "the binding is removed as soon as the guard is dropped"]
pub struct BindingGuard<E: ?Sized> {
    registry: EffectRegistry,
    scope: ScopeId,
    binding: BindingId,
    _effect: PhantomData<fn() -> *const E>,
}

impl<E: ?Sized> BindingGuard<E> {
    pub(crate) fn new(registry: EffectRegistry, scope: ScopeId, binding: BindingId) -> Self {
        Self {
            registry,
            scope,
            binding,
            _effect: PhantomData,
        }
    }

    pub fn binding(&self) -> BindingId {
        self.binding
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl<E: ?Sized> Drop for BindingGuard<E> {
    fn drop(&mut self) {
        self.registry.unbind_binding(self.scope, self.binding);
    }
}
