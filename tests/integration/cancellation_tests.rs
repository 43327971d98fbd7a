use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use effect_bridge::{BridgeError, CancelHandle, ScopeId};
use futures::executor::block_on;

use super::{
    as_effect, given_a_registry, given_a_screen_lifecycle, started, DialogEffect, FakeScreen,
    MockDialogEffect,
};

#[test]
fn given_a_shown_dialog_when_cancelled_should_dismiss_it_exactly_once() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);
    started(&mut lifecycle);

    let call = test.confirm("Discard changes?");
    assert!(call.cancel());
    assert!(!call.cancel());

    assert_eq!(screen.dismissed(), 1);
    assert_eq!(block_on(call), Err(BridgeError::Cancelled));
    assert_eq!(test.pending_calls(), 0);
}

#[test]
fn given_a_cancelled_call_when_the_screen_answers_late_should_ignore_the_answer() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);
    started(&mut lifecycle);

    let call = test.confirm("Discard changes?");
    call.cancel();

    assert!(!screen.answer(true));
    assert_eq!(block_on(call), Err(BridgeError::Cancelled));
    assert_eq!(screen.dismissed(), 1);
}

#[test]
fn given_an_answered_call_when_cancelled_should_do_nothing() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);
    started(&mut lifecycle);

    let call = test.confirm("Keep editing?");
    screen.answer(true);

    assert!(!call.cancel());
    assert_eq!(screen.dismissed(), 0);
    assert_eq!(block_on(call), Ok(true));
}

#[test]
fn given_a_dropped_caller_should_dismiss_the_dialog() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);
    started(&mut lifecycle);

    drop(test.confirm("Share location?"));

    assert_eq!(screen.dismissed(), 1);
    assert_eq!(test.pending_calls(), 0);
}

#[test]
fn given_a_call_cancelled_before_binding_should_never_reach_the_screen() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();

    let call = test.confirm("Enable notifications?");
    call.cancel();
    test.registry.bind(ScopeId::ROOT, as_effect(&screen)).unwrap();

    assert!(screen.shown_prompts().is_empty());
    assert_eq!(screen.dismissed(), 0);
    assert_eq!(block_on(call), Err(BridgeError::Cancelled));
}

#[test]
fn given_a_cancel_handle_on_another_thread_should_cancel_the_call() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);
    started(&mut lifecycle);

    let call = test.confirm("Log out?");
    let handle = call.cancel_handle();
    let cancelled = thread::spawn(move || handle.cancel()).join().unwrap();

    assert!(cancelled);
    assert_eq!(screen.dismissed(), 1);
    assert_eq!(block_on(call), Err(BridgeError::Cancelled));
}

#[test]
fn given_a_call_cancelled_while_being_shown_should_dismiss_as_soon_as_the_hook_is_set() {
    let test = given_a_registry();
    let handle: Arc<Mutex<Option<CancelHandle<bool>>>> = Arc::new(Mutex::new(None));
    let dismissed = Arc::new(AtomicUsize::new(0));

    let mut dialogs = MockDialogEffect::new();
    let (cancel, counter) = (handle.clone(), dismissed.clone());
    dialogs.expect_confirm().times(1).returning(move |_, responder| {
        if let Some(handle) = cancel.lock().unwrap().as_ref() {
            assert!(handle.cancel());
        }
        let counter = counter.clone();
        responder.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });

    let call = test.confirm("Leave the group?");
    *handle.lock().unwrap() = Some(call.cancel_handle());

    let dialogs: Arc<dyn DialogEffect> = Arc::new(dialogs);
    test.registry.bind(ScopeId::ROOT, dialogs).unwrap();

    assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    assert!(!call.cancel());
    assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    assert_eq!(block_on(call), Err(BridgeError::Cancelled));
}
