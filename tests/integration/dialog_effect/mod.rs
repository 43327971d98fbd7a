use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use effect_bridge::{ItemSink, Responder, TrySendError};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Click {
    Confirm,
    Dismiss,
    Retry,
}

#[cfg_attr(test, mockall::automock)]
pub(crate) trait DialogEffect: Send + Sync {
    fn show_toast(&self, message: &str);
    fn confirm(&self, prompt: String, responder: Responder<bool>);
    fn clicks(&self, sink: ItemSink<Click>);
}

/// Screen double that keeps every responder and sink it is handed, so tests
/// decide when and how it answers.
#[derive(Default)]
pub(crate) struct FakeScreen {
    prompts: Mutex<Vec<(String, Responder<bool>)>>,
    sinks: Mutex<Vec<ItemSink<Click>>>,
    dismissed: Arc<AtomicUsize>,
}

impl DialogEffect for FakeScreen {
    fn show_toast(&self, _message: &str) {}

    fn confirm(&self, prompt: String, responder: Responder<bool>) {
        let dismissed = self.dismissed.clone();
        responder.on_cancel(move || {
            dismissed.fetch_add(1, Ordering::SeqCst);
        });
        self.prompts.lock().unwrap().push((prompt, responder));
    }

    fn clicks(&self, sink: ItemSink<Click>) {
        self.sinks.lock().unwrap().push(sink);
    }
}

impl FakeScreen {
    pub(crate) fn shared() -> Arc<FakeScreen> {
        Arc::new(FakeScreen::default())
    }

    pub(crate) fn shown_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    /// Answer the oldest prompt still on screen.
    pub(crate) fn answer(&self, value: bool) -> bool {
        let (_, responder) = self.prompts.lock().unwrap().remove(0);
        responder.resolve(value)
    }

    pub(crate) fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }

    pub(crate) fn attached_sinks(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub(crate) fn latest_sink(&self) -> Option<ItemSink<Click>> {
        self.sinks.lock().unwrap().last().cloned()
    }

    /// Emit through the most recent sink this screen received.
    pub(crate) fn click(&self, click: Click) -> Result<(), TrySendError<Click>> {
        match self.latest_sink() {
            Some(sink) => sink.try_send(click),
            None => Err(TrySendError::Detached(click)),
        }
    }
}

pub(crate) fn as_effect(screen: &Arc<FakeScreen>) -> Arc<dyn DialogEffect> {
    screen.clone()
}
