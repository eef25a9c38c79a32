//! Wizard projection of a theme (the structured form editing view).
//!
//! [`to_form`] and [`from_form`] convert between a [`ThemeDocument`] and a
//! [`FormModel`] without loss: `from_form(&to_form(&d)) == d` for every
//! document, with list and keyword order preserved.
//!
//! Form edits are pure, index-based and infallible. Each one returns a new
//! [`FormModel`]; an out-of-range index leaves the model unchanged.

use serde::{Deserialize, Serialize};

use crate::theme::{NamedEntity, ThemeDocument};

// ---------------------------------------------------------------------------
// Field selectors
// ---------------------------------------------------------------------------

/// The plain tag lists of a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    Subject,
    Setting,
    Style,
    General,
}

/// The named-entity lists of a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityField {
    Actors,
    Places,
}

// ---------------------------------------------------------------------------
// Form model
// ---------------------------------------------------------------------------

/// One editable entity row: a name plus its keyword chips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRow {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Form-editable shape of a theme: one row list per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormModel {
    pub subject: Vec<String>,
    pub setting: Vec<String>,
    pub style: Vec<String>,
    pub general: Vec<String>,
    pub actors: Vec<EntityRow>,
    pub places: Vec<EntityRow>,
}

/// A single form edit, as sent by the wizard view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FormEdit {
    AddTag { field: TagField, value: String },
    UpdateTag { field: TagField, index: usize, value: String },
    RemoveTag { field: TagField, index: usize },
    AddEntity { field: EntityField, name: String },
    UpdateEntityName { field: EntityField, index: usize, name: String },
    RemoveEntity { field: EntityField, index: usize },
    AddKeyword { field: EntityField, entity: usize, value: String },
    UpdateKeyword { field: EntityField, entity: usize, index: usize, value: String },
    RemoveKeyword { field: EntityField, entity: usize, index: usize },
}

impl FormModel {
    pub fn tags(&self, field: TagField) -> &[String] {
        match field {
            TagField::Subject => &self.subject,
            TagField::Setting => &self.setting,
            TagField::Style => &self.style,
            TagField::General => &self.general,
        }
    }

    pub fn entities(&self, field: EntityField) -> &[EntityRow] {
        match field {
            EntityField::Actors => &self.actors,
            EntityField::Places => &self.places,
        }
    }

    fn tags_mut(&mut self, field: TagField) -> &mut Vec<String> {
        match field {
            TagField::Subject => &mut self.subject,
            TagField::Setting => &mut self.setting,
            TagField::Style => &mut self.style,
            TagField::General => &mut self.general,
        }
    }

    fn entities_mut(&mut self, field: EntityField) -> &mut Vec<EntityRow> {
        match field {
            EntityField::Actors => &mut self.actors,
            EntityField::Places => &mut self.places,
        }
    }

    // ---- tag edits ----

    pub fn add_tag(&self, field: TagField, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.tags_mut(field).push(value.into());
        next
    }

    pub fn update_tag(&self, field: TagField, index: usize, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        if let Some(slot) = next.tags_mut(field).get_mut(index) {
            *slot = value.into();
        }
        next
    }

    pub fn remove_tag(&self, field: TagField, index: usize) -> Self {
        let mut next = self.clone();
        let tags = next.tags_mut(field);
        if index < tags.len() {
            tags.remove(index);
        }
        next
    }

    // ---- entity edits ----

    pub fn add_entity(&self, field: EntityField, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.entities_mut(field).push(EntityRow {
            name: name.into(),
            keywords: Vec::new(),
        });
        next
    }

    pub fn update_entity_name(
        &self,
        field: EntityField,
        index: usize,
        name: impl Into<String>,
    ) -> Self {
        let mut next = self.clone();
        if let Some(row) = next.entities_mut(field).get_mut(index) {
            row.name = name.into();
        }
        next
    }

    pub fn remove_entity(&self, field: EntityField, index: usize) -> Self {
        let mut next = self.clone();
        let rows = next.entities_mut(field);
        if index < rows.len() {
            rows.remove(index);
        }
        next
    }

    // ---- keyword edits ----

    pub fn add_keyword(&self, field: EntityField, entity: usize, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        if let Some(row) = next.entities_mut(field).get_mut(entity) {
            row.keywords.push(value.into());
        }
        next
    }

    pub fn update_keyword(
        &self,
        field: EntityField,
        entity: usize,
        index: usize,
        value: impl Into<String>,
    ) -> Self {
        let mut next = self.clone();
        if let Some(keyword) = next
            .entities_mut(field)
            .get_mut(entity)
            .and_then(|row| row.keywords.get_mut(index))
        {
            *keyword = value.into();
        }
        next
    }

    pub fn remove_keyword(&self, field: EntityField, entity: usize, index: usize) -> Self {
        let mut next = self.clone();
        if let Some(row) = next.entities_mut(field).get_mut(entity) {
            if index < row.keywords.len() {
                row.keywords.remove(index);
            }
        }
        next
    }

    /// Apply a [`FormEdit`] and return the resulting model.
    pub fn apply(&self, edit: &FormEdit) -> Self {
        match edit {
            FormEdit::AddTag { field, value } => self.add_tag(*field, value.clone()),
            FormEdit::UpdateTag {
                field,
                index,
                value,
            } => self.update_tag(*field, *index, value.clone()),
            FormEdit::RemoveTag { field, index } => self.remove_tag(*field, *index),
            FormEdit::AddEntity { field, name } => self.add_entity(*field, name.clone()),
            FormEdit::UpdateEntityName { field, index, name } => {
                self.update_entity_name(*field, *index, name.clone())
            }
            FormEdit::RemoveEntity { field, index } => self.remove_entity(*field, *index),
            FormEdit::AddKeyword {
                field,
                entity,
                value,
            } => self.add_keyword(*field, *entity, value.clone()),
            FormEdit::UpdateKeyword {
                field,
                entity,
                index,
                value,
            } => self.update_keyword(*field, *entity, *index, value.clone()),
            FormEdit::RemoveKeyword {
                field,
                entity,
                index,
            } => self.remove_keyword(*field, *entity, *index),
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn to_row(entity: &NamedEntity) -> EntityRow {
    EntityRow {
        name: entity.name.clone(),
        keywords: entity.keywords.clone(),
    }
}

fn from_row(row: &EntityRow) -> NamedEntity {
    NamedEntity {
        name: row.name.clone(),
        keywords: row.keywords.clone(),
    }
}

/// Project a document into its form model.
pub fn to_form(doc: &ThemeDocument) -> FormModel {
    FormModel {
        subject: doc.subject.clone(),
        setting: doc.setting.clone(),
        style: doc.style.clone(),
        general: doc.general.clone(),
        actors: doc.actors.iter().map(to_row).collect(),
        places: doc.places.iter().map(to_row).collect(),
    }
}

/// Materialize a form model back into a document.
pub fn from_form(form: &FormModel) -> ThemeDocument {
    ThemeDocument {
        subject: form.subject.clone(),
        actors: form.actors.iter().map(from_row).collect(),
        places: form.places.iter().map(from_row).collect(),
        setting: form.setting.clone(),
        style: form.style.clone(),
        general: form.general.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
