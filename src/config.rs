//! Registry configuration.

/// What to do when a key is bound while another binding is still live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateBindPolicy {
    /// Last write wins. The previous binding is implicitly unbound and a
    /// warning is logged.
    #[default]
    Replace,
    /// Refuse the new binding with [`BridgeError::DuplicateBind`](crate::BridgeError::DuplicateBind).
    Reject,
}

/// What a subscription buffer does when it is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest buffered item to make room.
    DropOldest,
    /// Discard the item being sent.
    DropLatest,
    /// Make [`ItemSink::send`](crate::ItemSink::send) wait until the
    /// subscriber consumes an item.
    #[default]
    Suspend,
}

/// Buffer settings of a single subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferConfig {
    /// Items buffered before `overflow` applies. Zero is treated as one.
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl BufferConfig {
    /// Capacity used by [`BufferConfig::default`].
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a buffer configuration. A capacity of zero is raised to one.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            overflow,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, OverflowPolicy::default())
    }
}

/// Configuration of an [`EffectRegistry`](crate::EffectRegistry).
///
/// # Example
///
/// ```rust
/// use effect_bridge::{BridgeConfig, BufferConfig, DuplicateBindPolicy, OverflowPolicy};
///
/// let config = BridgeConfig::default()
///     .with_duplicate_bind(DuplicateBindPolicy::Reject)
///     .with_buffer(BufferConfig::new(16, OverflowPolicy::DropOldest));
///
/// assert_eq!(config.buffer.capacity, 16);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub duplicate_bind: DuplicateBindPolicy,
    /// Buffer used by [`EffectProxy::subscribe`](crate::EffectProxy::subscribe).
    pub buffer: BufferConfig,
}

impl BridgeConfig {
    /// Set how binding an already bound key is handled.
    pub fn with_duplicate_bind(mut self, policy: DuplicateBindPolicy) -> Self {
        self.duplicate_bind = policy;
        self
    }

    /// Set the buffer used by subscriptions that don't pick their own.
    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }
}
