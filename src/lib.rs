#![cfg_attr(feature = "no_std", no_std)]

//! Lifecycle-aware effect bridge.
//!
//! Lets long-lived components (view-models, services) invoke operations
//! implemented by short-lived, UI-bound components (screens, dialogs) through
//! an interface, without holding references across lifecycle boundaries.
//!
//! - [`EffectRegistry`] maps an effect interface, per scope, to the instance
//!   currently implementing it.
//! - [`EffectProxy`] is what the long-lived side holds. It forwards
//!   synchronous calls, suspends request/response calls until an
//!   implementation answers, and exposes restartable subscriptions.
//! - [`EffectBinder`] binds and unbinds an implementation following its
//!   component's [`Lifecycle`]. Calls and subscriptions in flight survive
//!   the component being recreated.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use futures::executor::block_on;
//! use effect_bridge::{
//!     EffectBinder, EffectRegistry, LifecycleEvent, Responder, ScopeId, TestLifecycle,
//! };
//!
//! trait Dialogs: Send + Sync {
//!     fn confirm(&self, prompt: &str, responder: Responder<bool>);
//! }
//!
//! struct Screen;
//!
//! impl Dialogs for Screen {
//!     fn confirm(&self, _prompt: &str, responder: Responder<bool>) {
//!         responder.on_cancel(|| { /* dismiss the dialog */ });
//!         responder.resolve(true);
//!     }
//! }
//!
//! let registry = EffectRegistry::default();
//!
//! // Long-lived side: holds a proxy, never the screen.
//! let dialogs = registry.proxy::<dyn Dialogs>(ScopeId::ROOT);
//! let confirmed = dialogs.request(|d, responder| d.confirm("Discard draft?", responder));
//!
//! // UI side: the binder follows the screen's lifecycle.
//! let screen: Arc<dyn Dialogs> = Arc::new(Screen);
//! let mut lifecycle = TestLifecycle::new();
//! lifecycle.observe(EffectBinder::new(registry.clone(), ScopeId::ROOT, screen));
//! lifecycle.drive(&[LifecycleEvent::Created, LifecycleEvent::Started]);
//!
//! assert_eq!(block_on(confirmed), Ok(true));
//! ```

#[cfg(feature = "no_std")]
extern crate alloc;

// Module declarations
mod binder;
mod config;
mod error;
mod key;
mod lifecycle;
mod pending;
mod proxy;
mod registry;
mod subscription;

// Public re-exports
pub use binder::{BinderState, BindingGuard, EffectBinder};
pub use config::{BridgeConfig, BufferConfig, DuplicateBindPolicy, OverflowPolicy};
pub use error::{BridgeError, Result};
pub use key::{BindingId, CallId, EffectKey, ScopeId};
pub use lifecycle::{Lifecycle, LifecycleEmitter, LifecycleEvent, LifecycleObserver, LifecycleState};
pub use pending::{CancelHandle, PendingCall, Responder};
pub use proxy::{EffectAccessor, EffectProxy};
pub use registry::EffectRegistry;
pub use subscription::{ItemSink, SendItem, Subscription, TrySendError};

// Test utilities (only available with 'testing' feature or during tests)
#[cfg(any(test, feature = "testing"))]
pub use lifecycle::TestLifecycle;
