use std::sync::Arc;

use effect_bridge::ScopeId;
use futures::executor::block_on;
use futures::FutureExt;

use super::{
    as_effect, given_a_registry, given_a_screen_lifecycle, started, torn_down, DialogEffect,
    FakeScreen, MockDialogEffect,
};

#[test]
fn given_a_call_in_flight_when_screen_recreated_should_be_answered_by_the_new_screen() {
    let test = given_a_registry();
    let first = FakeScreen::shared();
    let second = FakeScreen::shared();

    let first_binding = test.registry.bind(ScopeId::ROOT, as_effect(&first)).unwrap();
    let mut call = test.confirm("Save draft?");
    assert_eq!(first.shown_prompts().len(), 1);

    assert!(test.registry.unbind(test.key(), ScopeId::ROOT, first_binding));
    assert!((&mut call).now_or_never().is_none());

    test.registry.bind(ScopeId::ROOT, as_effect(&second)).unwrap();
    assert_eq!(second.shown_prompts(), vec!["Save draft?".to_string()]);

    assert!(second.answer(false));
    assert!(!first.answer(true));
    assert_eq!(block_on(call), Ok(false));
    assert_eq!(first.dismissed(), 0);
}

#[test]
fn given_a_rotation_driven_by_lifecycles_should_not_lose_the_call() {
    let test = given_a_registry();
    let before = FakeScreen::shared();
    let after = FakeScreen::shared();
    let mut old_screen = given_a_screen_lifecycle(&test, &before);
    let mut new_screen = given_a_screen_lifecycle(&test, &after);

    started(&mut old_screen);
    let call = test.confirm("Apply filter?");

    torn_down(&mut old_screen);
    started(&mut new_screen);

    assert!(after.answer(true));
    assert_eq!(block_on(call), Ok(true));
    assert_eq!(test.pending_calls(), 0);
}

#[test]
fn given_the_new_screen_starts_before_the_old_one_stops_should_keep_the_new_binding() {
    let test = given_a_registry();
    let before = FakeScreen::shared();
    let after = FakeScreen::shared();
    let mut old_screen = given_a_screen_lifecycle(&test, &before);
    let mut new_screen = given_a_screen_lifecycle(&test, &after);

    started(&mut old_screen);
    let call = test.confirm("Apply filter?");

    started(&mut new_screen);
    torn_down(&mut old_screen);

    assert!(test.dialogs.is_bound());
    assert_eq!(after.shown_prompts().len(), 1);
    assert!(after.answer(true));
    assert_eq!(block_on(call), Ok(true));
}

#[test]
fn given_an_answer_from_a_stale_screen_should_not_resolve_twice() {
    let test = given_a_registry();
    let first = FakeScreen::shared();
    let second = FakeScreen::shared();

    let first_binding = test.registry.bind(ScopeId::ROOT, as_effect(&first)).unwrap();
    let call = test.confirm("Overwrite file?");
    test.registry.unbind(test.key(), ScopeId::ROOT, first_binding);
    test.registry.bind(ScopeId::ROOT, as_effect(&second)).unwrap();

    assert!(!first.answer(false));
    assert!(second.answer(true));
    assert!(!call.cancel());
    assert_eq!(block_on(call), Ok(true));
}

#[test]
fn given_a_queued_one_off_event_should_be_delivered_once_across_recreation() {
    let test = given_a_registry();
    let mut first = MockDialogEffect::new();
    first.expect_show_toast().times(1).return_const(());
    let mut second = MockDialogEffect::new();
    second.expect_show_toast().never();
    let first: Arc<dyn DialogEffect> = Arc::new(first);
    let second: Arc<dyn DialogEffect> = Arc::new(second);

    test.dialogs.post(|dialogs| dialogs.show_toast("Welcome back"));
    assert_eq!(test.pending_calls(), 1);

    let first_binding = test.registry.bind(ScopeId::ROOT, first).unwrap();
    test.registry.unbind(test.key(), ScopeId::ROOT, first_binding);
    test.registry.bind(ScopeId::ROOT, second).unwrap();

    assert_eq!(test.pending_calls(), 0);
}
