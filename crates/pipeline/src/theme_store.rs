//! Per-session owner of the parent/derived theme pair.
//!
//! Each theme slot keeps its committed document plus two drafts, one per
//! editing surface (raw JSON text and wizard form). Drafts are independent
//! until [`ThemeStore::commit_edit`], which validates the draft of the
//! active surface, persists the canonical text and resynchronizes both
//! drafts from it.
//!
//! Submissions, commits and resets are not re-entrant: an overlapping call
//! fails with [`CoreError::SubmissionInProgress`] instead of interleaving
//! writes to the persisted themes. Transient backend errors are retried
//! within one call (see [`crate::retry`]). Every failure is recorded in
//! `last_error` before it is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atelier_client::{
    require_credential, Credential, CredentialProvider, SessionBackend, ThemeTransformBackend,
};
use atelier_core::error::CoreError;
use atelier_core::mode::ThemeMode;
use atelier_core::theme::{validate_and_parse, ParsedTheme, ThemeDocument, ThemeSlot};
use atelier_core::types::SessionId;
use atelier_core::wizard::{from_form, to_form, FormEdit, FormModel};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::poller::PollConfig;
use crate::retry::with_retries;

// ---------------------------------------------------------------------------
// Slot state
// ---------------------------------------------------------------------------

/// Which draft [`ThemeStore::commit_edit`] reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSurface {
    #[default]
    Raw,
    Form,
}

/// A committed theme together with its pending edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeSlotState {
    pub committed: ParsedTheme,
    pub draft_text: String,
    pub draft_form: FormModel,
    pub surface: EditSurface,
}

impl ThemeSlotState {
    fn new(committed: ParsedTheme) -> Self {
        Self {
            draft_text: committed.canonical.clone(),
            draft_form: to_form(&committed.document),
            surface: EditSurface::Raw,
            committed,
        }
    }

    /// A slot loaded from text that failed validation: the text is kept as
    /// the raw draft so it can be corrected and committed.
    fn unparsed(raw: &str) -> Self {
        Self {
            draft_text: raw.to_string(),
            ..Self::new(ParsedTheme::from(ThemeDocument::default()))
        }
    }

    fn commit(&mut self, parsed: ParsedTheme) {
        let surface = self.surface;
        *self = Self::new(parsed);
        self.surface = surface;
    }

    fn discard_edits(&mut self) {
        self.draft_text = self.committed.canonical.clone();
        self.draft_form = to_form(&self.committed.document);
    }

    pub fn document(&self) -> &ThemeDocument {
        &self.committed.document
    }

    /// Whether the draft of the active surface differs from the committed theme.
    pub fn has_unsaved_edits(&self) -> bool {
        match self.surface {
            EditSurface::Raw => self.draft_text != self.committed.canonical,
            EditSurface::Form => from_form(&self.draft_form) != self.committed.document,
        }
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct ThemeState {
    mode: ThemeMode,
    parent: Option<ThemeSlotState>,
    derived: Option<ThemeSlotState>,
    last_error: Option<CoreError>,
}

impl Default for ThemeState {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Basic,
            parent: None,
            derived: None,
            last_error: None,
        }
    }
}

impl ThemeState {
    fn slot_mut(&mut self, slot: ThemeSlot) -> Result<&mut ThemeSlotState, CoreError> {
        let state = match slot {
            ThemeSlot::Parent => self.parent.as_mut(),
            ThemeSlot::Derived => self.derived.as_mut(),
        };
        state.ok_or_else(|| CoreError::Conflict(format!("No {} theme to edit", slot.as_str())))
    }
}

/// Read-only snapshot of a [`ThemeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeView {
    pub mode: ThemeMode,
    pub parent: Option<ThemeSlotState>,
    pub derived: Option<ThemeSlotState>,
    pub last_error: Option<CoreError>,
    pub submitting: bool,
}

impl ThemeView {
    /// The slot the current mode is showing, if any.
    pub fn active_slot(&self) -> Option<&ThemeSlotState> {
        match self.mode.slot()? {
            ThemeSlot::Parent => self.parent.as_ref(),
            ThemeSlot::Derived => self.derived.as_ref(),
        }
    }

    /// The wizard form of the slot being shown.
    pub fn active_form(&self) -> Option<&FormModel> {
        self.active_slot().map(|slot| &slot.draft_form)
    }

    /// The theme a generation job should use: derived if present, else parent.
    pub fn effective_theme(&self) -> Option<&ThemeDocument> {
        self.derived
            .as_ref()
            .or(self.parent.as_ref())
            .map(ThemeSlotState::document)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Resets the busy flag when a submission or commit ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of one session's parent and derived themes.
pub struct ThemeStore {
    session_id: SessionId,
    sessions: Arc<dyn SessionBackend>,
    transform: Arc<dyn ThemeTransformBackend>,
    credentials: Arc<dyn CredentialProvider>,
    retry: PollConfig,
    state: RwLock<ThemeState>,
    busy: AtomicBool,
}

impl ThemeStore {
    pub fn new(
        session_id: impl Into<SessionId>,
        sessions: Arc<dyn SessionBackend>,
        transform: Arc<dyn ThemeTransformBackend>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sessions,
            transform,
            credentials,
            retry: PollConfig::default(),
            state: RwLock::new(ThemeState::default()),
            busy: AtomicBool::new(false),
        }
    }

    /// Retry transient backend errors with `config` instead of the default.
    pub fn with_retry(mut self, config: PollConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn view(&self) -> ThemeView {
        let state = self.state.read().await;
        ThemeView {
            mode: state.mode,
            parent: state.parent.clone(),
            derived: state.derived.clone(),
            last_error: state.last_error.clone(),
            submitting: self.busy.load(Ordering::Acquire),
        }
    }

    pub async fn mode(&self) -> ThemeMode {
        self.state.read().await.mode
    }

    pub async fn last_error(&self) -> Option<CoreError> {
        self.state.read().await.last_error.clone()
    }

    /// Derived theme if present, else parent.
    pub async fn effective_theme(&self) -> Option<ThemeDocument> {
        self.view().await.effective_theme().cloned()
    }

    // ---- mode ----

    /// Switch to `mode` if the transition table allows it.
    ///
    /// Returns `false` (and changes nothing) for an illegal selection.
    pub async fn select_mode(&self, mode: ThemeMode) -> bool {
        let mut state = self.state.write().await;
        let allowed = mode.is_selectable(state.parent.is_some(), state.derived.is_some());
        if allowed {
            state.mode = mode;
        } else {
            tracing::debug!(
                session_id = %self.session_id,
                current = state.mode.as_str(),
                requested = mode.as_str(),
                "Ignoring illegal theme mode selection",
            );
        }
        allowed
    }

    // ---- submissions ----

    /// Create the parent theme from basic keywords or custom free text.
    pub async fn submit_basic_or_custom(&self, text: &str) -> Result<(), CoreError> {
        let result = self.submit_parent_inner(text).await;
        self.record("submit_parent", result).await
    }

    /// Create the derived theme from free text relative to the parent.
    pub async fn submit_derived_from_text(&self, text: &str) -> Result<(), CoreError> {
        let result = self.submit_derived_inner(text).await;
        self.record("submit_derived", result).await
    }

    /// Validate and persist the active draft of `slot`.
    ///
    /// On invalid input the drafts are left exactly as they are.
    pub async fn commit_edit(&self, slot: ThemeSlot) -> Result<(), CoreError> {
        let result = self.commit_inner(slot).await;
        self.record("commit_edit", result).await
    }

    async fn submit_parent_inner(&self, text: &str) -> Result<(), CoreError> {
        let _busy = self.begin()?;
        if self.state.read().await.parent.is_some() {
            return Err(CoreError::Conflict(
                "A parent theme already exists; clear the session to start over".to_string(),
            ));
        }
        require_text(text)?;
        let credential = require_credential(self.credentials.as_ref())?;

        let json = with_retries("derive_parent_theme", self.retry, || {
            self.transform.derive_parent_theme(&credential, text)
        })
        .await?;
        let parsed = validate_and_parse(&json)?;
        self.save(&credential, ThemeSlot::Parent, Some(&parsed.canonical))
            .await?;

        let mut state = self.state.write().await;
        state.parent = Some(ThemeSlotState::new(parsed));
        state.mode = ThemeMode::Parent;
        tracing::info!(session_id = %self.session_id, "Parent theme created");
        Ok(())
    }

    async fn submit_derived_inner(&self, text: &str) -> Result<(), CoreError> {
        let _busy = self.begin()?;
        let parent_json = {
            let state = self.state.read().await;
            let parent = state.parent.as_ref().ok_or(CoreError::MissingParent)?;
            if state.derived.is_some() {
                return Err(CoreError::Conflict(
                    "A derived theme already exists; reset it before creating another".to_string(),
                ));
            }
            parent.committed.canonical.clone()
        };
        require_text(text)?;
        let credential = require_credential(self.credentials.as_ref())?;

        let json = with_retries("derive_child_theme", self.retry, || {
            self.transform
                .derive_child_theme(&credential, text, &parent_json)
        })
        .await?;
        let parsed = validate_and_parse(&json)?;
        self.save(&credential, ThemeSlot::Derived, Some(&parsed.canonical))
            .await?;

        let mut state = self.state.write().await;
        if state.parent.is_none() {
            // Themes reloaded while the derivation was in flight.
            return Err(CoreError::MissingParent);
        }
        state.derived = Some(ThemeSlotState::new(parsed));
        state.mode = ThemeMode::Derived;
        tracing::info!(session_id = %self.session_id, "Derived theme created");
        Ok(())
    }

    async fn commit_inner(&self, slot: ThemeSlot) -> Result<(), CoreError> {
        let _busy = self.begin()?;
        let parsed = {
            let mut state = self.state.write().await;
            let current = state.slot_mut(slot)?;
            match current.surface {
                EditSurface::Form => ParsedTheme::from(from_form(&current.draft_form)),
                EditSurface::Raw => validate_and_parse(&current.draft_text)?,
            }
        };
        let credential = require_credential(self.credentials.as_ref())?;
        self.save(&credential, slot, Some(&parsed.canonical)).await?;

        let mut state = self.state.write().await;
        state.slot_mut(slot)?.commit(parsed);
        tracing::info!(session_id = %self.session_id, slot = slot.as_str(), "Theme edit committed");
        Ok(())
    }

    // ---- resets ----

    /// Drop the derived theme and fall back to the parent. Idempotent.
    ///
    /// Rejected with [`CoreError::SubmissionInProgress`] while a submission
    /// or commit is persisting. Otherwise the local reset always applies;
    /// clearing the persisted copy is attempted once and a failure is
    /// recorded in `last_error`.
    pub async fn reset_derived(&self) -> Result<(), CoreError> {
        let _busy = match self.begin() {
            Ok(busy) => busy,
            Err(e) => return self.record("reset_derived", Err(e)).await,
        };
        let had_derived = {
            let mut state = self.state.write().await;
            let had_derived = state.derived.take().is_some();
            if state.parent.is_some() {
                state.mode = ThemeMode::Parent;
            }
            had_derived
        };
        if had_derived {
            tracing::info!(session_id = %self.session_id, "Derived theme reset");
            self.persist_cleared(ThemeSlot::Derived).await;
        }
        Ok(())
    }

    /// Drop both themes and return to basic entry.
    ///
    /// Guarded like [`ThemeStore::reset_derived`].
    pub async fn clear(&self) -> Result<(), CoreError> {
        let _busy = match self.begin() {
            Ok(busy) => busy,
            Err(e) => return self.record("clear", Err(e)).await,
        };
        let (had_parent, had_derived) = {
            let mut state = self.state.write().await;
            let had = (state.parent.is_some(), state.derived.is_some());
            *state = ThemeState::default();
            had
        };
        if had_derived {
            self.persist_cleared(ThemeSlot::Derived).await;
        }
        if had_parent {
            self.persist_cleared(ThemeSlot::Parent).await;
        }
        Ok(())
    }

    async fn persist_cleared(&self, slot: ThemeSlot) {
        let result = match require_credential(self.credentials.as_ref()) {
            Ok(credential) => {
                self.sessions
                    .save_theme(&credential, &self.session_id, slot, None)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(
                session_id = %self.session_id,
                slot = slot.as_str(),
                error = %e,
                "Failed to persist cleared theme",
            );
            self.state.write().await.last_error = Some(e);
        }
    }

    // ---- edits ----

    /// Replace the raw text draft of `slot`.
    pub async fn set_draft_text(&self, slot: ThemeSlot, text: impl Into<String>) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        state.slot_mut(slot)?.draft_text = text.into();
        Ok(())
    }

    /// Apply a wizard edit to the form draft of `slot`.
    pub async fn edit_form(&self, slot: ThemeSlot, edit: &FormEdit) -> Result<FormModel, CoreError> {
        let mut state = self.state.write().await;
        let current = state.slot_mut(slot)?;
        current.draft_form = current.draft_form.apply(edit);
        Ok(current.draft_form.clone())
    }

    /// Choose which draft of `slot` the next commit reads.
    pub async fn set_surface(&self, slot: ThemeSlot, surface: EditSurface) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        state.slot_mut(slot)?.surface = surface;
        Ok(())
    }

    /// Reset both drafts of `slot` to the committed theme.
    pub async fn discard_edits(&self, slot: ThemeSlot) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        state.slot_mut(slot)?.discard_edits();
        Ok(())
    }

    // ---- loading ----

    /// Load persisted theme text, e.g. from a session snapshot.
    ///
    /// Text that fails validation is kept as the raw draft of its slot and
    /// the validation error is recorded. A derived theme without a parent is
    /// dropped with [`CoreError::MissingParent`].
    pub async fn hydrate(
        &self,
        parent_text: Option<&str>,
        derived_text: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut problem = None;
        let parent = parent_text.map(|text| load_slot(text, &mut problem));
        let derived = match (&parent, derived_text) {
            (Some(_), Some(text)) => Some(load_slot(text, &mut problem)),
            (None, Some(_)) => {
                problem = Some(CoreError::MissingParent);
                None
            }
            (_, None) => None,
        };

        let mut state = self.state.write().await;
        *state = ThemeState {
            mode: ThemeMode::initial(parent.is_some(), derived.is_some()),
            parent,
            derived,
            last_error: problem.clone(),
        };
        drop(state);

        match problem {
            Some(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Loaded themes need attention");
                Err(e)
            }
            None => Ok(()),
        }
    }

    // ---- helpers ----

    async fn save(
        &self,
        credential: &Credential,
        slot: ThemeSlot,
        theme_json: Option<&str>,
    ) -> Result<(), CoreError> {
        with_retries("save_theme", self.retry, || {
            self.sessions
                .save_theme(credential, &self.session_id, slot, theme_json)
        })
        .await
    }

    fn begin(&self) -> Result<BusyGuard<'_>, CoreError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| CoreError::SubmissionInProgress)
    }

    async fn record<T>(&self, op: &'static str, result: Result<T, CoreError>) -> Result<T, CoreError> {
        let mut state = self.state.write().await;
        match &result {
            Ok(_) => state.last_error = None,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, op, error = %e, "Theme operation failed");
                state.last_error = Some(e.clone());
            }
        }
        result
    }
}

fn load_slot(text: &str, problem: &mut Option<CoreError>) -> ThemeSlotState {
    match validate_and_parse(text) {
        Ok(parsed) => ThemeSlotState::new(parsed),
        Err(e) => {
            *problem = Some(e);
            ThemeSlotState::unparsed(text)
        }
    }
}

fn require_text(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::Validation(
            "Theme text must not be empty".to_string(),
        ));
    }
    Ok(())
}
