//! Theme editing modes and their transition table.

use serde::{Deserialize, Serialize};

use crate::theme::ThemeSlot;

/// Which theme surface the session is currently showing.
///
/// * `Basic` / `Custom` - entering the parent theme (keywords or free text).
/// * `Parent` - viewing or editing the existing parent theme.
/// * `AddDerived` - entering text for a new derived theme.
/// * `Derived` - viewing or editing the derived theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    Basic,
    Custom,
    Parent,
    AddDerived,
    Derived,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Custom => "custom",
            Self::Parent => "parent",
            Self::AddDerived => "add_derived",
            Self::Derived => "derived",
        }
    }

    /// Transition table: may this mode be selected given which themes exist?
    pub fn is_selectable(self, has_parent: bool, has_derived: bool) -> bool {
        match self {
            Self::Basic | Self::Custom => !has_parent,
            Self::Parent => has_parent,
            Self::AddDerived => has_parent && !has_derived,
            Self::Derived => has_derived,
        }
    }

    /// The mode a freshly loaded session lands in.
    pub fn initial(has_parent: bool, has_derived: bool) -> Self {
        match (has_parent, has_derived) {
            (_, true) => Self::Derived,
            (true, false) => Self::Parent,
            (false, false) => Self::Basic,
        }
    }

    /// The committed theme this mode edits, if any.
    pub fn slot(self) -> Option<ThemeSlot> {
        match self {
            Self::Parent => Some(ThemeSlot::Parent),
            Self::Derived => Some(ThemeSlot::Derived),
            Self::Basic | Self::Custom | Self::AddDerived => None,
        }
    }
}
