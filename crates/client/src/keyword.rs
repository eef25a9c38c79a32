//! Offline, deterministic theme transform.
//!
//! [`KeywordThemeTransform`] turns comma-separated keyword text into a
//! [`ThemeDocument`] without any network call. It is the transform used
//! when no transform service is configured, and the reference behaviour
//! for tests.
//!
//! Mapping rules:
//!
//! 1. Split the text on `,`, `;` and newlines; trim and lowercase each phrase.
//! 2. Strip leading filler words (`add`, `a`, `an`, `the`, `with`, `some`, `more`).
//! 3. Find the longest vocabulary term the phrase ends with. Style and
//!    setting terms store the whole phrase as a tag; actor and place terms
//!    create a [`NamedEntity`] named after the term, with the preceding
//!    words as keywords.
//! 4. Phrases matching no vocabulary term go to `subject`.
//!
//! Text that already is a valid theme document is passed through in
//! canonical form. Child derivation merges the result over the parent.

use async_trait::async_trait;
use atelier_core::error::CoreError;
use atelier_core::theme::{validate_and_parse, NamedEntity, ThemeDocument};

use crate::backend::{Credential, ThemeTransformBackend};

const FILLER_WORDS: &[&str] = &["add", "a", "an", "the", "with", "some", "more"];

const STYLE_TERMS: &[&str] = &[
    "watercolor",
    "oil painting",
    "acrylic",
    "gouache",
    "ink",
    "pencil",
    "sketch",
    "charcoal",
    "pastel",
    "woodcut",
    "pixel art",
    "digital art",
    "3d render",
    "low poly",
    "anime",
    "manga",
    "comic",
    "cartoon",
    "photorealistic",
    "photograph",
    "impressionist",
    "art nouveau",
    "ukiyo-e",
    "surreal",
    "minimalist",
    "noir",
    "vintage",
];

const SETTING_TERMS: &[&str] = &[
    "sunset",
    "sunrise",
    "dawn",
    "dusk",
    "twilight",
    "morning",
    "noon",
    "evening",
    "night",
    "midnight",
    "spring",
    "summer",
    "autumn",
    "winter",
    "rain",
    "snow",
    "fog",
    "storm",
    "underwater",
    "outer space",
    "medieval",
    "victorian",
    "futuristic",
];

const PLACE_TERMS: &[&str] = &[
    "lighthouse",
    "castle",
    "forest",
    "beach",
    "harbor",
    "city",
    "village",
    "mountain",
    "desert",
    "island",
    "cave",
    "temple",
    "garden",
    "library",
    "market",
    "bridge",
    "river",
    "lake",
    "ocean",
    "tower",
    "cathedral",
    "meadow",
    "street",
    "station",
];

const ACTOR_TERMS: &[&str] = &[
    "knight", "wizard", "witch", "dragon", "robot", "sailor", "king", "queen", "child", "girl",
    "boy", "woman", "man", "cat", "dog", "fox", "owl", "horse", "whale",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Style,
    Setting,
    Place,
    Actor,
}

const VOCABULARY: &[(Category, &[&str])] = &[
    (Category::Style, STYLE_TERMS),
    (Category::Setting, SETTING_TERMS),
    (Category::Place, PLACE_TERMS),
    (Category::Actor, ACTOR_TERMS),
];

/// Deterministic keyword-to-theme transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordThemeTransform;

impl KeywordThemeTransform {
    pub fn new() -> Self {
        Self
    }

    /// Classify free keyword text into a theme document.
    pub fn classify(&self, raw_text: &str) -> ThemeDocument {
        let mut doc = ThemeDocument::default();
        for phrase in phrases(raw_text) {
            let words: Vec<&str> = phrase.split_whitespace().collect();
            match head_term(&words) {
                Some((Category::Style, _)) => push_unique(&mut doc.style, phrase.clone()),
                Some((Category::Setting, _)) => push_unique(&mut doc.setting, phrase.clone()),
                Some((Category::Place, term_len)) => {
                    add_entity(&mut doc.places, &words, term_len)
                }
                Some((Category::Actor, term_len)) => {
                    add_entity(&mut doc.actors, &words, term_len)
                }
                None => push_unique(&mut doc.subject, phrase.clone()),
            }
        }
        doc
    }

    fn parent_from_text(&self, raw_text: &str) -> Result<ThemeDocument, CoreError> {
        if let Ok(parsed) = validate_and_parse(raw_text) {
            return Ok(parsed.document);
        }
        let doc = self.classify(raw_text);
        if doc.is_empty() {
            return Err(CoreError::Validation(
                "Theme text contains no keywords".to_string(),
            ));
        }
        Ok(doc)
    }
}

#[async_trait]
impl ThemeTransformBackend for KeywordThemeTransform {
    async fn derive_parent_theme(
        &self,
        _credential: &Credential,
        raw_text: &str,
    ) -> Result<String, CoreError> {
        Ok(self.parent_from_text(raw_text)?.to_canonical_json())
    }

    async fn derive_child_theme(
        &self,
        _credential: &Credential,
        raw_text: &str,
        parent_json: &str,
    ) -> Result<String, CoreError> {
        let parent = validate_and_parse(parent_json)?.document;
        let overlay = self.parent_from_text(raw_text)?;
        Ok(parent.merged_with(&overlay).to_canonical_json())
    }
}

/// Split, normalize and strip filler words. Empty phrases are dropped.
fn phrases(raw_text: &str) -> Vec<String> {
    raw_text
        .split([',', ';', '\n'])
        .filter_map(|part| {
            let lowered = part.trim().to_lowercase();
            let words: Vec<&str> = lowered
                .split_whitespace()
                .skip_while(|w| FILLER_WORDS.contains(w))
                .collect();
            (!words.is_empty()).then(|| words.join(" "))
        })
        .collect()
}

/// Longest vocabulary term the phrase ends with, as (category, word count).
fn head_term(words: &[&str]) -> Option<(Category, usize)> {
    let mut best: Option<(Category, usize)> = None;
    for (category, terms) in VOCABULARY {
        for term in *terms {
            let term_words: Vec<&str> = term.split(' ').collect();
            let len = term_words.len();
            if len <= words.len()
                && words[words.len() - len..] == term_words[..]
                && best.map_or(true, |(_, best_len)| len > best_len)
            {
                best = Some((*category, len));
            }
        }
    }
    best
}

fn add_entity(entities: &mut Vec<NamedEntity>, words: &[&str], term_len: usize) {
    let split = words.len() - term_len;
    let name = words[split..].join(" ");
    let keywords: Vec<String> = words[..split].iter().map(|w| w.to_string()).collect();
    match entities.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            for keyword in keywords {
                push_unique(&mut existing.keywords, keyword);
            }
        }
        None => entities.push(NamedEntity::new(name).with_keywords(keywords)),
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
