use std::sync::Arc;
use std::thread;

use effect_bridge::{BridgeError, EffectKey, ScopeId};
use futures::executor::block_on;
use futures::FutureExt;
use mockall::predicate::eq;

use super::{given_a_registry, given_a_screen_lifecycle, started, torn_down, DialogEffect, FakeScreen, MockDialogEffect};

#[test]
fn given_no_binding_when_toast_shown_should_fail_fast() {
    let test = given_a_registry();

    let result = test.dialogs.call(|dialogs| dialogs.show_toast("saved"));

    assert_eq!(
        result,
        Err(BridgeError::NoEffectBound {
            effect: EffectKey::of::<dyn DialogEffect>(),
            scope: ScopeId::ROOT,
        })
    );
}

#[test]
fn given_a_bound_mock_when_toast_shown_should_forward_once() {
    let test = given_a_registry();
    let mut mock = MockDialogEffect::new();
    mock.expect_show_toast()
        .with(eq("saved"))
        .times(1)
        .return_const(());
    let mock: Arc<dyn DialogEffect> = Arc::new(mock);
    test.registry.bind(ScopeId::ROOT, mock).unwrap();

    assert_eq!(test.dialogs.call(|dialogs| dialogs.show_toast("saved")), Ok(()));
}

#[test]
fn given_a_bound_mock_when_confirm_requested_should_resolve_with_its_answer() {
    let test = given_a_registry();
    let mut mock = MockDialogEffect::new();
    mock.expect_confirm()
        .withf(|prompt, _| prompt == "Delete?")
        .times(1)
        .returning(|_, responder| {
            responder.resolve(false);
        });
    let mock: Arc<dyn DialogEffect> = Arc::new(mock);
    test.registry.bind(ScopeId::ROOT, mock).unwrap();

    assert_eq!(block_on(test.confirm("Delete?")), Ok(false));
    assert_eq!(test.pending_calls(), 0);
}

#[test]
fn given_a_call_issued_before_binding_should_wait_then_complete() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);

    let mut call = test.confirm("Leave without saving?");
    assert!((&mut call).now_or_never().is_none());
    assert_eq!(test.pending_calls(), 1);

    started(&mut lifecycle);
    assert_eq!(screen.shown_prompts(), vec!["Leave without saving?".to_string()]);

    assert!(screen.answer(true));
    assert_eq!(block_on(call), Ok(true));
    assert_eq!(test.pending_calls(), 0);
}

#[test]
fn given_a_caller_on_another_thread_should_receive_the_answer() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);

    let call = test.confirm("Sync now?");
    let caller = thread::spawn(move || block_on(call));

    started(&mut lifecycle);
    screen.answer(true);

    assert_eq!(caller.join().unwrap(), Ok(true));
}

#[test]
fn given_a_screen_that_never_answers_when_torn_down_should_keep_the_call_pending() {
    let test = given_a_registry();
    let screen = FakeScreen::shared();
    let mut lifecycle = given_a_screen_lifecycle(&test, &screen);
    started(&mut lifecycle);

    let mut call = test.confirm("Rate this app?");
    torn_down(&mut lifecycle);
    drop(screen);

    assert!((&mut call).now_or_never().is_none());
    assert_eq!(test.pending_calls(), 1);
}

#[test]
fn given_a_failing_implementation_should_surface_the_failure() {
    let test = given_a_registry();
    let mut mock = MockDialogEffect::new();
    mock.expect_confirm().returning(|_, responder| {
        responder.fail("window lost focus");
    });
    let mock: Arc<dyn DialogEffect> = Arc::new(mock);
    test.registry.bind(ScopeId::ROOT, mock).unwrap();

    assert_eq!(
        block_on(test.confirm("Continue?")),
        Err(BridgeError::failed("window lost focus"))
    );
}

#[test]
fn given_a_closed_scope_should_fail_its_pending_calls() {
    let test = given_a_registry();
    let scope = test.registry.create_scope();
    let dialogs = test.registry.proxy::<dyn DialogEffect>(scope);

    let call = dialogs.request(|dialogs, responder| dialogs.confirm("Quit?".into(), responder));
    test.registry.close_scope(scope);

    assert_eq!(block_on(call), Err(BridgeError::ScopeClosed { scope }));
}
