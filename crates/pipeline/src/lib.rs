//! Generation job lifecycle and per-session theme state.
//!
//! * [`poller`] - bounded-retry status polling behind an owned handle.
//! * [`retry`] - bounded retry for one-shot submission calls.
//! * [`theme_store`] - parent/derived theme pair with raw and form drafts.
//! * [`controller`] - one session: its themes, its job and the poll following it.
//! * [`events`] - broadcast notifications for job state changes.

pub mod controller;
pub mod events;
pub mod poller;
pub mod retry;
pub mod theme_store;

pub use controller::{SessionController, SessionView};
pub use events::SessionEvent;
pub use poller::{JobPoller, PollConfig, PollFailure, PollHandle, PollState, PollVerdict};
pub use theme_store::{EditSurface, ThemeSlotState, ThemeStore, ThemeView};
