//! Lifecycle signals of UI-scoped components and the loop delivering them.

#[cfg(feature = "no_std")]
use alloc::boxed::Box;
#[cfg(feature = "no_std")]
use alloc::vec::Vec;

use flume::{Receiver, Sender};
use tracing::{instrument, trace, warn};

/// A lifecycle signal emitted by the host for one UI-scoped component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created,
    Started,
    Stopped,
    Destroyed,
}

/// Where a component is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Initialized,
    Created,
    Started,
    Stopped,
    Destroyed,
}

impl LifecycleState {
    /// The state reached by applying `event`, or `None` if the host sent an
    /// event that is invalid in this state.
    ///
    /// A component may be destroyed from any state but `Destroyed`, and may
    /// be started again after being stopped.
    pub fn transition(self, event: LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        match (self, event) {
            (S::Initialized, E::Created) => Some(S::Created),
            (S::Created | S::Stopped, E::Started) => Some(S::Started),
            (S::Started, E::Stopped) => Some(S::Stopped),
            (S::Destroyed, E::Destroyed) => None,
            (_, E::Destroyed) => Some(S::Destroyed),
            _ => None,
        }
    }
}

/// Receives the lifecycle signals of one component.
///
/// Closures taking a [`LifecycleEvent`] implement this trait via the blanket
/// implementation.
pub trait LifecycleObserver {
    fn on_event(&mut self, event: LifecycleEvent);
}

impl<F> LifecycleObserver for F
where
    F: FnMut(LifecycleEvent),
{
    fn on_event(&mut self, event: LifecycleEvent) {
        self(event)
    }
}

/// Handle the host uses to push lifecycle signals.
///
/// Cheap to clone and usable from any thread; signals are queued and
/// delivered in order on the context driving the [`Lifecycle`].
pub struct LifecycleEmitter(Sender<LifecycleEvent>);

impl Clone for LifecycleEmitter {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl LifecycleEmitter {
    pub(crate) fn new(sender: Sender<LifecycleEvent>) -> Self {
        Self(sender)
    }

    /// Queue `event`. Signals sent after the lifecycle is dropped are lost.
    pub fn emit(&self, event: LifecycleEvent) {
        self.0.send(event).ok();
    }
}

/// The lifecycle of one UI-scoped component.
///
/// Signals pushed through its [`LifecycleEmitter`] are validated against the
/// current [`LifecycleState`] and handed to every observer, sequentially, on
/// the context awaiting [`Lifecycle::run`]. That context is the single place
/// where bindings of the component change. Invalid transitions are logged and
/// dropped.
///
/// For manual control in tests, use [`TestLifecycle`].
pub struct Lifecycle {
    observers: Vec<Box<dyn LifecycleObserver + Send>>,
    receiver: Receiver<LifecycleEvent>,
    emitter: LifecycleEmitter,
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a lifecycle in [`LifecycleState::Initialized`] with no observers.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();

        Lifecycle {
            observers: Vec::new(),
            receiver,
            emitter: LifecycleEmitter::new(sender),
            state: LifecycleState::Initialized,
        }
    }

    pub fn emitter(&self) -> LifecycleEmitter {
        self.emitter.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn observe<O>(&mut self, observer: O)
    where
        O: LifecycleObserver + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Deliver queued signals until the component is destroyed.
    pub async fn run(&mut self) {
        while self.state != LifecycleState::Destroyed {
            match self.receiver.recv_async().await {
                Ok(event) => self.step(event),
                Err(_) => break,
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    fn step(&mut self, event: LifecycleEvent) {
        let Some(next) = self.state.transition(event) else {
            warn!(state = ?self.state, ?event, "ignoring invalid lifecycle transition");
            return;
        };

        trace!(from = ?self.state, to = ?next, "lifecycle transition");
        self.state = next;
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }

    fn process_queued_events(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.step(event);
        }
    }
}

#[cfg(any(test, feature = "testing"))]
/// Lifecycle with manual signal processing.
///
/// Only available with the `testing` feature or during tests.
///
/// Signals emitted through [`TestLifecycle::emitter`] stay queued until
/// [`process_events`](Self::process_events) is called, giving tests precise
/// control over when bindings change.
///
/// ```rust
/// use effect_bridge::{LifecycleEvent, LifecycleState, TestLifecycle};
///
/// let mut lifecycle = TestLifecycle::new();
/// let emitter = lifecycle.emitter();
///
/// emitter.emit(LifecycleEvent::Created);
/// emitter.emit(LifecycleEvent::Started);
/// assert_eq!(lifecycle.state(), LifecycleState::Initialized);
///
/// lifecycle.process_events();
/// assert_eq!(lifecycle.state(), LifecycleState::Started);
/// ```
pub struct TestLifecycle {
    lifecycle: Lifecycle,
}

#[cfg(any(test, feature = "testing"))]
impl Default for TestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing"))]
impl TestLifecycle {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn emitter(&self) -> LifecycleEmitter {
        self.lifecycle.emitter()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn observe<O>(&mut self, observer: O)
    where
        O: LifecycleObserver + Send + 'static,
    {
        self.lifecycle.observe(observer);
    }

    /// Emit `events` and process them immediately.
    pub fn drive(&mut self, events: &[LifecycleEvent]) {
        let emitter = self.emitter();
        events.iter().for_each(|event| emitter.emit(*event));
        self.process_events();
    }

    /// Process all queued signals.
    pub fn process_events(&mut self) {
        self.lifecycle.process_queued_events();
    }
}
