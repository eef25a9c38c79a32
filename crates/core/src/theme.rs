//! Theme document model, canonical serialization and validation.
//!
//! A theme is a structured content descriptor guiding a generation job:
//! ordered tag lists plus named entities (actors, places) carrying their
//! own keyword lists. The same document is edited either as raw JSON text
//! or through the wizard form (see [`crate::wizard`]); both paths end in
//! [`validate_and_parse`] or [`ThemeDocument::to_canonical_json`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A named entity inside a theme (an actor or a place).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedEntity {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl NamedEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Canonical representation of a theme.
///
/// Field declaration order is the canonical serialization order. Missing
/// lists deserialize as empty; scalars where a list is expected and
/// unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThemeDocument {
    pub subject: Vec<String>,
    pub actors: Vec<NamedEntity>,
    pub places: Vec<NamedEntity>,
    pub setting: Vec<String>,
    pub style: Vec<String>,
    pub general: Vec<String>,
}

impl ThemeDocument {
    /// `true` when every list is empty.
    pub fn is_empty(&self) -> bool {
        self.subject.is_empty()
            && self.actors.is_empty()
            && self.places.is_empty()
            && self.setting.is_empty()
            && self.style.is_empty()
            && self.general.is_empty()
    }

    /// Serialize to canonical text (two-space pretty JSON, fixed key order).
    pub fn to_canonical_json(&self) -> String {
        // Serializing a struct of strings and vectors cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Overlay `other` on top of `self`.
    ///
    /// Tags already present are not duplicated; entities with a matching
    /// name absorb the overlay's new keywords, others are appended.
    pub fn merged_with(&self, other: &ThemeDocument) -> ThemeDocument {
        let mut merged = self.clone();
        extend_unique(&mut merged.subject, &other.subject);
        extend_unique(&mut merged.setting, &other.setting);
        extend_unique(&mut merged.style, &other.style);
        extend_unique(&mut merged.general, &other.general);
        merge_entities(&mut merged.actors, &other.actors);
        merge_entities(&mut merged.places, &other.places);
        merged
    }
}

fn extend_unique(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn merge_entities(target: &mut Vec<NamedEntity>, extra: &[NamedEntity]) {
    for entity in extra {
        match target.iter_mut().find(|e| e.name == entity.name) {
            Some(existing) => extend_unique(&mut existing.keywords, &entity.keywords),
            None => target.push(entity.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Theme slots
// ---------------------------------------------------------------------------

/// Which of the two themes of a session an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeSlot {
    Parent,
    Derived,
}

impl ThemeSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Derived => "derived",
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A successfully validated theme: the structured value plus its
/// canonical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTheme {
    pub document: ThemeDocument,
    pub canonical: String,
}

impl From<ThemeDocument> for ParsedTheme {
    fn from(document: ThemeDocument) -> Self {
        let canonical = document.to_canonical_json();
        Self {
            document,
            canonical,
        }
    }
}

/// Parse raw theme text into a [`ParsedTheme`].
///
/// The top-level value must be a JSON object; every list field must be an
/// array of strings and every entity must carry a `name` and an array of
/// `keywords`. Never mutates any caller state: on failure the caller keeps
/// its text as-is.
pub fn validate_and_parse(text: &str) -> Result<ParsedTheme, CoreError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| CoreError::Validation(format!("Theme is not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(CoreError::Validation(
            "Theme must be a JSON object".to_string(),
        ));
    }

    let document: ThemeDocument = serde_json::from_value(value)
        .map_err(|e| CoreError::Validation(format!("Theme has an invalid shape: {e}")))?;

    Ok(ParsedTheme::from(document))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
