//! Integration tests for `ThemeStore` against in-memory backends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use atelier_core::error::CoreError;
use atelier_core::mode::ThemeMode;
use atelier_core::theme::{validate_and_parse, NamedEntity, ThemeSlot};
use atelier_core::wizard::{FormEdit, TagField};
use atelier_pipeline::{EditSurface, ThemeStore};
use common::{
    keyword_store, signed_in, signed_out, FakeSessionBackend, FixedTransform, GatedTransform,
    SESSION_ID,
};

async fn store_with_parent(backend: &Arc<FakeSessionBackend>) -> ThemeStore {
    let store = keyword_store(backend);
    store.submit_basic_or_custom("sunset, watercolor").await.unwrap();
    store
}

// ---------------------------------------------------------------------------
// Test: basic keywords become the parent theme
// ---------------------------------------------------------------------------

#[tokio::test]
async fn basic_submission_creates_parent() {
    let backend = FakeSessionBackend::new();
    let store = keyword_store(&backend);

    store.submit_basic_or_custom("sunset, watercolor").await.unwrap();

    let view = store.view().await;
    assert_eq!(view.mode, ThemeMode::Parent);
    assert!(view.last_error.is_none());
    let parent = view.parent.expect("parent theme");
    assert_eq!(parent.document().setting, vec!["sunset"]);
    assert_eq!(parent.document().style, vec!["watercolor"]);
    assert!(view.derived.is_none());

    let saved = backend.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, ThemeSlot::Parent);
    assert_eq!(saved[0].1.as_deref(), Some(parent.committed.canonical.as_str()));
}

#[tokio::test]
async fn blank_submission_is_rejected_before_transform() {
    let backend = FakeSessionBackend::new();
    let transform = GatedTransform::new();
    let store = ThemeStore::new(SESSION_ID, backend.clone(), transform.clone(), signed_in());

    let err = store.submit_basic_or_custom("   ").await.unwrap_err();

    assert_matches!(err, CoreError::Validation(_));
    assert_eq!(transform.calls(), 0);
    assert_eq!(store.last_error().await, Some(err));
    assert_eq!(store.mode().await, ThemeMode::Basic);
}

#[tokio::test]
async fn second_parent_submission_conflicts() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;
    let before = store.view().await.parent;

    let err = store.submit_basic_or_custom("noir").await.unwrap_err();

    assert_matches!(err, CoreError::Conflict(_));
    assert_eq!(store.view().await.parent, before);
}

#[tokio::test]
async fn invalid_transform_output_changes_nothing() {
    let backend = FakeSessionBackend::new();
    let store = ThemeStore::new(
        SESSION_ID,
        backend.clone(),
        Arc::new(FixedTransform(r#"{"style": "ink"}"#)),
        signed_in(),
    );

    let err = store.submit_basic_or_custom("ink").await.unwrap_err();

    assert_matches!(err, CoreError::Validation(_));
    let view = store.view().await;
    assert!(view.parent.is_none());
    assert_eq!(view.mode, ThemeMode::Basic);
    assert!(backend.saved().is_empty());
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_applies_nothing() {
    let backend = FakeSessionBackend::new();
    backend.fail_saves(Some(CoreError::TransientNetwork("timeout".into())));
    let store = keyword_store(&backend);

    let err = store.submit_basic_or_custom("sunset").await.unwrap_err();

    assert_matches!(err, CoreError::TransientNetwork(_));
    assert_eq!(backend.save_calls(), 3);
    assert!(store.view().await.parent.is_none());
    assert_eq!(store.last_error().await, Some(err));
}

#[tokio::test(start_paused = true)]
async fn transient_save_errors_are_retried() {
    let backend = FakeSessionBackend::new();
    backend.fail_next_saves([
        CoreError::TransientNetwork("reset".into()),
        CoreError::TransientNetwork("timeout".into()),
    ]);
    let store = keyword_store(&backend);

    store.submit_basic_or_custom("sunset").await.unwrap();

    assert_eq!(backend.save_calls(), 3);
    assert_eq!(backend.saved().len(), 1);
    assert!(store.view().await.parent.is_some());
    assert!(store.last_error().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn rejected_save_is_not_retried() {
    let backend = FakeSessionBackend::new();
    backend.fail_saves(Some(CoreError::Backend("read-only".into())));
    let store = keyword_store(&backend);

    let err = store.submit_basic_or_custom("sunset").await.unwrap_err();

    assert_matches!(err, CoreError::Backend(_));
    assert_eq!(backend.save_calls(), 1);
}

// ---------------------------------------------------------------------------
// Test: derived themes build on the parent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn derived_submission_merges_over_parent_and_resets() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;

    store.submit_derived_from_text("add a lighthouse").await.unwrap();

    let view = store.view().await;
    assert_eq!(view.mode, ThemeMode::Derived);
    let derived = view.derived.expect("derived theme");
    assert_eq!(derived.document().places, vec![NamedEntity::new("lighthouse")]);
    assert_eq!(derived.document().setting, vec!["sunset"]);
    assert_eq!(derived.document().style, vec!["watercolor"]);
    assert_eq!(store.effective_theme().await.as_ref(), Some(derived.document()));

    store.reset_derived().await.unwrap();
    let after_first = store.view().await;
    assert_eq!(after_first.mode, ThemeMode::Parent);
    assert!(after_first.derived.is_none());
    assert!(after_first.parent.is_some());

    store.reset_derived().await.unwrap();
    assert_eq!(store.view().await, after_first);

    let clears: Vec<_> = backend
        .saved()
        .into_iter()
        .filter(|(slot, text)| *slot == ThemeSlot::Derived && text.is_none())
        .collect();
    assert_eq!(clears.len(), 1);
}

#[tokio::test]
async fn derived_without_parent_fails_fast() {
    let backend = FakeSessionBackend::new();
    let transform = GatedTransform::new();
    let store = ThemeStore::new(SESSION_ID, backend.clone(), transform.clone(), signed_in());

    let err = store.submit_derived_from_text("castle").await.unwrap_err();

    assert_eq!(err, CoreError::MissingParent);
    assert_eq!(transform.calls(), 0);
    assert_eq!(store.last_error().await, Some(CoreError::MissingParent));
}

#[tokio::test]
async fn second_derived_submission_conflicts() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;
    store.submit_derived_from_text("castle").await.unwrap();

    let err = store.submit_derived_from_text("forest").await.unwrap_err();

    assert_matches!(err, CoreError::Conflict(_));
}

#[tokio::test]
async fn reset_persistence_failure_is_recorded_but_applied() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;
    store.submit_derived_from_text("castle").await.unwrap();
    backend.fail_saves(Some(CoreError::Backend("read-only".into())));

    store.reset_derived().await.unwrap();

    let view = store.view().await;
    assert!(view.derived.is_none());
    assert_eq!(view.mode, ThemeMode::Parent);
    assert_matches!(view.last_error, Some(CoreError::Backend(_)));
}

// ---------------------------------------------------------------------------
// Test: resets wait for in-flight writes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reset_during_commit_is_rejected() {
    let backend = FakeSessionBackend::new();
    let store = Arc::new(store_with_parent(&backend).await);
    store.submit_derived_from_text("castle").await.unwrap();
    store
        .set_draft_text(ThemeSlot::Derived, r#"{"style":["ink"]}"#)
        .await
        .unwrap();
    backend.slow_saves(Duration::from_millis(200));

    let commit = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.commit_edit(ThemeSlot::Derived).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.reset_derived().await, Err(CoreError::SubmissionInProgress));
    assert_eq!(store.clear().await, Err(CoreError::SubmissionInProgress));
    assert!(store.view().await.derived.is_some());

    commit.await.unwrap().unwrap();
    let view = store.view().await;
    let derived = view.derived.expect("derived theme");
    assert_eq!(derived.document().style, vec!["ink"]);
    assert!(view.last_error.is_none());
    assert_eq!(
        backend.saved().last(),
        Some(&(ThemeSlot::Derived, Some(derived.committed.canonical.clone())))
    );

    // After the commit has landed, the reset goes through and is the last write.
    store.reset_derived().await.unwrap();
    assert!(store.view().await.derived.is_none());
    assert_eq!(backend.saved().last(), Some(&(ThemeSlot::Derived, None)));
}

// ---------------------------------------------------------------------------
// Test: commits validate the active draft
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_commit_keeps_theme_and_draft() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;
    let before = store.view().await;

    store.set_draft_text(ThemeSlot::Parent, "{invalid").await.unwrap();
    let err = store.commit_edit(ThemeSlot::Parent).await.unwrap_err();

    assert_matches!(err, CoreError::Validation(_));
    let after = store.view().await;
    assert_eq!(after.mode, before.mode);
    let parent = after.parent.expect("parent theme");
    assert_eq!(parent.committed, before.parent.expect("parent theme").committed);
    assert_eq!(parent.draft_text, "{invalid");
    assert_matches!(after.last_error, Some(CoreError::Validation(_)));
}

#[tokio::test]
async fn raw_commit_canonicalizes_and_resyncs_form() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;

    store
        .set_draft_text(ThemeSlot::Parent, r#"{"style":["ink"],"general":["calm"]}"#)
        .await
        .unwrap();
    store.commit_edit(ThemeSlot::Parent).await.unwrap();

    let parent = store.view().await.parent.expect("parent theme");
    let expected = validate_and_parse(r#"{"style":["ink"],"general":["calm"]}"#).unwrap();
    assert_eq!(parent.committed, expected);
    assert_eq!(parent.draft_text, expected.canonical);
    assert_eq!(parent.draft_form.style, vec!["ink"]);
    assert!(store.last_error().await.is_none());
}

#[tokio::test]
async fn form_commit_uses_form_draft() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;

    store
        .edit_form(ThemeSlot::Parent, &FormEdit::AddTag { field: TagField::Style, value: "ink".into() })
        .await
        .unwrap();
    // The raw draft is ignored while the form surface is active.
    store.set_draft_text(ThemeSlot::Parent, "{invalid").await.unwrap();
    store.set_surface(ThemeSlot::Parent, EditSurface::Form).await.unwrap();
    store.commit_edit(ThemeSlot::Parent).await.unwrap();

    let parent = store.view().await.parent.expect("parent theme");
    assert_eq!(parent.document().style, vec!["watercolor", "ink"]);
    assert_eq!(parent.draft_text, parent.committed.canonical);
    assert_eq!(parent.surface, EditSurface::Form);
}

#[tokio::test]
async fn discard_edits_restores_committed_drafts() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;
    let committed = store.view().await.parent.expect("parent theme");

    store.set_draft_text(ThemeSlot::Parent, "{}").await.unwrap();
    store
        .edit_form(ThemeSlot::Parent, &FormEdit::RemoveTag { field: TagField::Setting, index: 0 })
        .await
        .unwrap();
    store.discard_edits(ThemeSlot::Parent).await.unwrap();

    assert_eq!(store.view().await.parent, Some(committed));
}

#[tokio::test]
async fn editing_missing_slot_conflicts() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;

    let err = store.set_draft_text(ThemeSlot::Derived, "{}").await.unwrap_err();
    assert_matches!(err, CoreError::Conflict(_));
    let err = store.commit_edit(ThemeSlot::Derived).await.unwrap_err();
    assert_matches!(err, CoreError::Conflict(_));
}

// ---------------------------------------------------------------------------
// Test: mode selection follows the transition table
// ---------------------------------------------------------------------------

#[tokio::test]
async fn illegal_mode_selection_is_a_noop() {
    let backend = FakeSessionBackend::new();
    let store = keyword_store(&backend);

    assert!(store.select_mode(ThemeMode::Custom).await);
    assert!(!store.select_mode(ThemeMode::AddDerived).await);
    assert!(!store.select_mode(ThemeMode::Derived).await);
    assert_eq!(store.mode().await, ThemeMode::Custom);

    store.submit_basic_or_custom("harbor at dusk").await.unwrap();
    assert!(!store.select_mode(ThemeMode::Basic).await);
    assert!(store.select_mode(ThemeMode::AddDerived).await);
    assert_eq!(store.mode().await, ThemeMode::AddDerived);
    assert!(store.view().await.active_form().is_none());
}

// ---------------------------------------------------------------------------
// Test: overlapping submissions and missing credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_submission_is_rejected() {
    let backend = FakeSessionBackend::new();
    let transform = GatedTransform::new();
    let store = Arc::new(ThemeStore::new(
        SESSION_ID,
        backend.clone(),
        transform.clone(),
        signed_in(),
    ));

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.submit_basic_or_custom("sunset").await })
    };
    while transform.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(store.view().await.submitting);

    let err = store.submit_basic_or_custom("noir").await.unwrap_err();
    assert_eq!(err, CoreError::SubmissionInProgress);
    assert_eq!(transform.calls(), 1);

    transform.open();
    first.await.unwrap().unwrap();

    let view = store.view().await;
    assert!(!view.submitting);
    assert!(view.last_error.is_none());
    assert_eq!(view.parent.expect("parent theme").document().setting, vec!["sunset"]);
}

#[tokio::test]
async fn missing_credential_sends_nothing() {
    let backend = FakeSessionBackend::new();
    let transform = GatedTransform::new();
    let store = ThemeStore::new(SESSION_ID, backend.clone(), transform.clone(), signed_out());

    let err = store.submit_basic_or_custom("sunset").await.unwrap_err();

    assert_eq!(err, CoreError::MissingCredential);
    assert_eq!(transform.calls(), 0);
    assert!(backend.saved().is_empty());
}

// ---------------------------------------------------------------------------
// Test: hydrating from stored text
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hydrate_selects_mode_from_loaded_themes() {
    let backend = FakeSessionBackend::new();
    let store = keyword_store(&backend);

    store
        .hydrate(Some(r#"{"style": ["ink"]}"#), Some(r#"{"style": ["ink", "noir"]}"#))
        .await
        .unwrap();

    let view = store.view().await;
    assert_eq!(view.mode, ThemeMode::Derived);
    assert_eq!(view.active_form().expect("form").style, vec!["ink", "noir"]);
}

#[tokio::test]
async fn hydrate_keeps_invalid_text_for_editing() {
    let backend = FakeSessionBackend::new();
    let store = keyword_store(&backend);

    let err = store.hydrate(Some("{broken"), None).await.unwrap_err();

    assert_matches!(err, CoreError::Validation(_));
    let view = store.view().await;
    assert_eq!(view.mode, ThemeMode::Parent);
    let parent = view.parent.expect("parent slot");
    assert_eq!(parent.draft_text, "{broken");
    assert!(parent.document().is_empty());
    assert_matches!(view.last_error, Some(CoreError::Validation(_)));
}

#[tokio::test]
async fn hydrate_drops_orphan_derived_theme() {
    let backend = FakeSessionBackend::new();
    let store = keyword_store(&backend);

    let err = store.hydrate(None, Some(r#"{"style": ["ink"]}"#)).await.unwrap_err();

    assert_eq!(err, CoreError::MissingParent);
    let view = store.view().await;
    assert!(view.derived.is_none());
    assert_eq!(view.mode, ThemeMode::Basic);
}

// ---------------------------------------------------------------------------
// Test: clearing the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_drops_both_themes() {
    let backend = FakeSessionBackend::new();
    let store = store_with_parent(&backend).await;
    store.submit_derived_from_text("castle").await.unwrap();

    store.clear().await.unwrap();

    let view = store.view().await;
    assert_eq!(view.mode, ThemeMode::Basic);
    assert!(view.parent.is_none());
    assert!(view.derived.is_none());
    let saved = backend.saved();
    assert!(saved.contains(&(ThemeSlot::Parent, None)));
    assert!(saved.contains(&(ThemeSlot::Derived, None)));

    store.submit_basic_or_custom("noir").await.unwrap();
    assert_eq!(store.mode().await, ThemeMode::Parent);
}
