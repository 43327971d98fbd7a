//! Identities used to address bindings in the registry.

use core::any::TypeId;
use core::fmt;

/// Identity of an effect interface.
///
/// Keys are derived from the type the long-lived side talks to, usually a
/// trait object such as `dyn Dialogs`. Two keys are equal when they were
/// created from the same type.
///
/// # Example
///
/// ```rust
/// use effect_bridge::EffectKey;
///
/// trait Dialogs {}
///
/// assert_eq!(EffectKey::of::<dyn Dialogs>(), EffectKey::of::<dyn Dialogs>());
/// assert_ne!(EffectKey::of::<dyn Dialogs>(), EffectKey::of::<u32>());
/// ```
#[derive(Clone, Copy)]
pub struct EffectKey {
    id: TypeId,
    name: &'static str,
}

impl EffectKey {
    /// Create the key for the effect interface `E`.
    pub fn of<E: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: core::any::type_name::<E>(),
        }
    }

    /// Human readable name of the interface, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EffectKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EffectKey {}

impl PartialOrd for EffectKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EffectKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectKey").field(&self.name).finish()
    }
}

impl fmt::Display for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identifier of a registry scope.
///
/// [`ScopeId::ROOT`] always exists. Additional scopes are handed out by
/// [`EffectRegistry::create_scope`](crate::EffectRegistry::create_scope), one
/// per subtree or navigation destination that needs isolated bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub(crate) u64);

impl ScopeId {
    /// The process-wide scope.
    pub const ROOT: ScopeId = ScopeId(0);
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Generation token of one binding.
///
/// Returned by [`EffectRegistry::bind`](crate::EffectRegistry::bind) and
/// required by [`EffectRegistry::unbind`](crate::EffectRegistry::unbind), so a
/// component can only remove the binding it installed itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub(crate) u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

/// Identifier of a pending call, unique within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(pub(crate) u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SlotKey {
    pub(crate) scope: ScopeId,
    pub(crate) key: EffectKey,
}
