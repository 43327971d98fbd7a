//! Caller-side stand-ins for effect interfaces.

#[cfg(feature = "no_std")]
use alloc::sync::Arc;
#[cfg(not(feature = "no_std"))]
use std::sync::Arc;

use core::fmt;
use core::marker::PhantomData;

use spin::Mutex;
use tracing::debug;

use crate::{
    BridgeError, BufferConfig, EffectKey, EffectRegistry, ItemSink, PendingCall, Responder,
    Result, ScopeId, Subscription,
};

/// The stand-in a long-lived caller holds instead of the implementation.
///
/// A proxy never references an implementation directly: every call looks up
/// whatever is bound for `E` in its scope at that moment. It is cheap to
/// clone and safe to keep for the caller's whole lifetime.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use futures::executor::block_on;
/// use effect_bridge::{EffectRegistry, Responder, ScopeId};
///
/// trait Dialogs: Send + Sync {
///     fn confirm(&self, prompt: String, responder: Responder<bool>);
/// }
///
/// struct AlwaysYes;
///
/// impl Dialogs for AlwaysYes {
///     fn confirm(&self, _prompt: String, responder: Responder<bool>) {
///         responder.resolve(true);
///     }
/// }
///
/// let registry = EffectRegistry::default();
/// let dialogs = registry.proxy::<dyn Dialogs>(ScopeId::ROOT);
///
/// // Issued before anything is bound: the call waits.
/// let answer = dialogs.request(|d, responder| d.confirm("Delete?".into(), responder));
///
/// let instance: Arc<dyn Dialogs> = Arc::new(AlwaysYes);
/// registry.bind(ScopeId::ROOT, instance).unwrap();
///
/// assert_eq!(block_on(answer), Ok(true));
/// ```
pub struct EffectProxy<E: ?Sized> {
    registry: EffectRegistry,
    scope: ScopeId,
    _effect: PhantomData<fn() -> *const E>,
}

impl<E: ?Sized> Clone for EffectProxy<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            scope: self.scope,
            _effect: PhantomData,
        }
    }
}

impl<E: ?Sized + 'static> fmt::Debug for EffectProxy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectProxy")
            .field("effect", &EffectKey::of::<E>())
            .field("scope", &self.scope)
            .finish()
    }
}

impl<E> EffectProxy<E>
where
    E: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(registry: EffectRegistry, scope: ScopeId) -> Self {
        Self {
            registry,
            scope,
            _effect: PhantomData,
        }
    }

    pub fn key(&self) -> EffectKey {
        EffectKey::of::<E>()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn is_bound(&self) -> bool {
        self.registry.is_bound(self.key(), self.scope)
    }

    /// The implementation bound right now, if any.
    pub fn lookup(&self) -> Option<Arc<E>> {
        self.registry.lookup::<E>(self.scope)
    }

    /// Forward a synchronous call to the bound implementation.
    ///
    /// Fails fast with [`BridgeError::NoEffectBound`] when nothing is bound.
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&E) -> R,
    {
        let effect = self.lookup().ok_or(BridgeError::NoEffectBound {
            effect: self.key(),
            scope: self.scope,
        })?;
        Ok(f(effect.as_ref()))
    }

    /// Issue a suspendable call.
    ///
    /// `dispatch` runs against the bound implementation now, or against the
    /// first one bound later. If that implementation is unbound before it
    /// answers, `dispatch` runs again against its replacement, so it must be
    /// callable more than once.
    pub fn request<T, F>(&self, dispatch: F) -> PendingCall<T>
    where
        T: Send + 'static,
        F: Fn(&E, Responder<T>) + Send + Sync + 'static,
    {
        self.registry.issue_request::<E, T, F>(self.scope, dispatch)
    }

    /// Deliver a one-off event, exactly once.
    ///
    /// The event is queued until an implementation is bound. Events posted
    /// into a closed scope are dropped.
    pub fn post<F>(&self, event: F)
    where
        F: FnOnce(&E) + Send + 'static,
    {
        let event = Mutex::new(Some(event));
        let key = self.key();
        self.request::<(), _>(move |effect, responder| {
            let pending = event.lock().take();
            match pending {
                Some(event) => {
                    event(effect);
                    responder.resolve(());
                }
                None => debug!(effect = %key, "event already delivered"),
            }
        })
        .detach();
    }

    /// Subscribe with the registry's default buffer.
    ///
    /// `attach` runs once per bound implementation and hands it the sink
    /// feeding this subscription.
    pub fn subscribe<T, F>(&self, attach: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(&E, ItemSink<T>) + Send + Sync + 'static,
    {
        self.subscribe_with(self.registry.config().buffer, attach)
    }

    pub fn subscribe_with<T, F>(&self, buffer: BufferConfig, attach: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(&E, ItemSink<T>) + Send + Sync + 'static,
    {
        self.registry
            .open_subscription::<E, T, F>(self.scope, buffer, attach)
    }
}

/// Runtime contract for typed accessors wrapping an [`EffectProxy`].
///
/// Accessors are the hand-written or generated adapters exposing an effect's
/// methods as ordinary functions on the caller side. A dependency container
/// builds them with [`EffectRegistry::accessor`].
///
/// ```rust
/// use effect_bridge::{EffectAccessor, EffectProxy, EffectRegistry, Result, ScopeId};
///
/// trait Toasts: Send + Sync {
///     fn show(&self, message: &str);
/// }
///
/// struct ToastsAccessor(EffectProxy<dyn Toasts>);
///
/// impl EffectAccessor for ToastsAccessor {
///     type Effect = dyn Toasts;
///
///     fn from_proxy(proxy: EffectProxy<dyn Toasts>) -> Self {
///         Self(proxy)
///     }
/// }
///
/// impl ToastsAccessor {
///     fn show(&self, message: &str) -> Result<()> {
///         self.0.call(|toasts| toasts.show(message))
///     }
/// }
///
/// let registry = EffectRegistry::default();
/// let toasts: ToastsAccessor = registry.accessor(ScopeId::ROOT);
/// assert!(toasts.show("saved").is_err());
/// ```
pub trait EffectAccessor: Sized {
    type Effect: ?Sized + Send + Sync + 'static;

    fn from_proxy(proxy: EffectProxy<Self::Effect>) -> Self;
}
