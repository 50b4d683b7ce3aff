//! Test-only fixture records and a scriptable in-memory store used by the
//! unit test surfaces. Cross-crate scenario fixtures live in
//! `frostbind-testing-fixtures`.

use crate::{
    assoc::{Many, Relation, Single},
    bind::{self, BindError, Provided},
    model::{FieldKind, FieldModel, ModelDescriptor, RelationModel, RelationShape},
    row::{RelationSlot, RowRef},
    store::{CacheError, CacheService, Query, RecordStore, StoreError},
    traits::{Path, Record},
    types::Id,
    validate::{self, Validate, ValidateCtx, ValidateError},
    value::{FieldValue, Value},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
    time::Duration,
};

///
/// Note
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Note {
    #[serde(default)]
    pub id: Id<u64>,
    pub body: String,
    #[serde(default)]
    pub tags: Many<Tag>,
    #[serde(skip)]
    provided: Provided,
}

static NOTE_FIELDS: [FieldModel; 2] = [
    FieldModel {
        name: "id",
        kind: FieldKind::Uint,
    },
    FieldModel {
        name: "body",
        kind: FieldKind::Text,
    },
];

static NOTE_MODEL: ModelDescriptor = ModelDescriptor {
    path: Note::PATH,
    model_name: "note",
    identity: Some(&NOTE_FIELDS[0]),
    fields: &NOTE_FIELDS,
    relations: &[RelationModel {
        name: "tags",
        shape: RelationShape::Many,
        target_path: Tag::PATH,
    }],
};

impl Path for Note {
    const PATH: &'static str = "frostbind_core::test_fixtures::Note";
}

impl Validate for Note {
    fn validate(&self, ctx: &mut ValidateCtx) {
        if self.body.is_empty() {
            ctx.issue("body", "must not be empty");
        }
    }
}

impl Record for Note {
    const MODEL: &'static ModelDescriptor = &NOTE_MODEL;

    fn provided(&self) -> &Provided {
        &self.provided
    }

    fn identity_value(&self) -> Value {
        self.id.to_value()
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.to_value()), ("body", self.body.to_value())]
    }

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<(), ValidateError> {
        match name {
            "id" => self.id.assign_from(Self::PATH, "id", value),
            "body" => {
                self.body = validate::field_from_value(Self::PATH, "body", value)?;
                Ok(())
            }
            _ => Err(ValidateError::UnknownField {
                model: Self::PATH,
                field: name.to_string(),
            }),
        }
    }

    fn relations(&self) -> Vec<(&'static str, &dyn Relation)> {
        vec![("tags", &self.tags)]
    }
}

impl Note {
    /// A plain value that has not gone through the construction protocol.
    pub fn detached(body: impl Into<String>) -> Self {
        Self {
            id: Id::unset(),
            body: body.into(),
            tags: Many::unloaded(),
            provided: Provided::unbound(),
        }
    }

    pub fn create(body: impl Into<String>) -> Result<Self, BindError> {
        let note = Self {
            id: Id::unset(),
            body: body.into(),
            tags: Many::unloaded(),
            provided: Provided::unbound(),
        };
        bind::construct(&note)?;

        Ok(note)
    }

    pub fn tags(&self) -> Result<&Many<Tag>, BindError> {
        bind::prepare_field::<Self, _>(&self.provided, &self.tags, "tags")
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
        bind::write_field::<Self>(&self.provided, "body", &self.body.to_value());
    }

    pub fn set_id(&mut self, id: u64) -> Result<(), ValidateError> {
        self.id.set(Self::PATH, "id", id)?;
        bind::write_field::<Self>(&self.provided, "id", &Value::Uint(id));

        Ok(())
    }
}

///
/// Tag
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Tag {
    #[serde(default)]
    pub id: Id<u64>,
    pub label: String,
    #[serde(default)]
    pub note: Single<Note>,
    #[serde(skip)]
    provided: Provided,
}

static TAG_FIELDS: [FieldModel; 2] = [
    FieldModel {
        name: "id",
        kind: FieldKind::Uint,
    },
    FieldModel {
        name: "label",
        kind: FieldKind::Text,
    },
];

static TAG_MODEL: ModelDescriptor = ModelDescriptor {
    path: Tag::PATH,
    model_name: "tag",
    identity: Some(&TAG_FIELDS[0]),
    fields: &TAG_FIELDS,
    relations: &[RelationModel {
        name: "note",
        shape: RelationShape::Single { required: true },
        target_path: Note::PATH,
    }],
};

impl Path for Tag {
    const PATH: &'static str = "frostbind_core::test_fixtures::Tag";
}

impl Validate for Tag {
    fn validate(&self, ctx: &mut ValidateCtx) {
        if self.label.is_empty() {
            ctx.issue("label", "must not be empty");
        }
    }
}

impl Record for Tag {
    const MODEL: &'static ModelDescriptor = &TAG_MODEL;

    fn provided(&self) -> &Provided {
        &self.provided
    }

    fn identity_value(&self) -> Value {
        self.id.to_value()
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.to_value()), ("label", self.label.to_value())]
    }

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<(), ValidateError> {
        match name {
            "id" => self.id.assign_from(Self::PATH, "id", value),
            "label" => {
                self.label = validate::field_from_value(Self::PATH, "label", value)?;
                Ok(())
            }
            _ => Err(ValidateError::UnknownField {
                model: Self::PATH,
                field: name.to_string(),
            }),
        }
    }

    fn relations(&self) -> Vec<(&'static str, &dyn Relation)> {
        vec![("note", &self.note)]
    }
}

impl Tag {
    /// A plain value that has not gone through the construction protocol.
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            id: Id::unset(),
            label: label.into(),
            note: Single::unloaded(),
            provided: Provided::unbound(),
        }
    }

    pub fn create(label: impl Into<String>) -> Result<Self, BindError> {
        let tag = Self {
            id: Id::unset(),
            label: label.into(),
            note: Single::unloaded(),
            provided: Provided::unbound(),
        };
        bind::construct(&tag)?;

        Ok(tag)
    }

    pub fn note(&self) -> Result<&Single<Note>, BindError> {
        bind::prepare_field::<Self, _>(&self.provided, &self.note, "note")
    }
}

///
/// Draft
/// Fixture without a declared identity field, for capability tests.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Draft {
    pub title: String,
    #[serde(skip)]
    provided: Provided,
}

static DRAFT_FIELDS: [FieldModel; 1] = [FieldModel {
    name: "title",
    kind: FieldKind::Text,
}];

static DRAFT_MODEL: ModelDescriptor = ModelDescriptor {
    path: Draft::PATH,
    model_name: "draft",
    identity: None,
    fields: &DRAFT_FIELDS,
    relations: &[],
};

impl Path for Draft {
    const PATH: &'static str = "frostbind_core::test_fixtures::Draft";
}

impl Validate for Draft {}

impl Record for Draft {
    const MODEL: &'static ModelDescriptor = &DRAFT_MODEL;

    fn provided(&self) -> &Provided {
        &self.provided
    }

    fn identity_value(&self) -> Value {
        Value::Null
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("title", self.title.to_value())]
    }

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<(), ValidateError> {
        match name {
            "title" => {
                self.title = validate::field_from_value(Self::PATH, "title", value)?;
                Ok(())
            }
            _ => Err(ValidateError::UnknownField {
                model: Self::PATH,
                field: name.to_string(),
            }),
        }
    }

    fn relations(&self) -> Vec<(&'static str, &dyn Relation)> {
        Vec::new()
    }
}

///
/// ScriptedStore
///
/// In-memory store stub: scripted relation resolution keyed by row
/// address, fetch counters for load-once assertions, and an async-only
/// mode whose sync surface fails with `AwaitRequired`.
///

#[derive(Default)]
pub struct ScriptedStore {
    rows: RefCell<Vec<RowRef>>,
    scripts: RefCell<BTreeMap<(usize, String), RelationSlot>>,
    targets: RefCell<Option<BTreeSet<String>>>,
    pub relation_fetches: Cell<usize>,
    async_only: Cell<bool>,
    next_key: Cell<u64>,
}

impl ScriptedStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            next_key: Cell::new(1),
            ..Self::default()
        })
    }

    /// Script the slot returned for one row's relation field.
    pub fn script_relation(&self, row: &RowRef, field: &str, slot: RelationSlot) {
        self.scripts
            .borrow_mut()
            .insert((Rc::as_ptr(row) as usize, field.to_string()), slot);
    }

    /// Restrict the accepted targets (default: accept all).
    pub fn restrict_targets(&self, targets: impl IntoIterator<Item = &'static str>) {
        *self.targets.borrow_mut() = Some(targets.into_iter().map(str::to_string).collect());
    }

    pub fn set_async_only(&self, value: bool) {
        self.async_only.set(value);
    }

    fn resolve(&self, row: &RowRef, field: &str) -> Result<RelationSlot, StoreError> {
        self.relation_fetches.set(self.relation_fetches.get() + 1);
        self.scripts
            .borrow()
            .get(&(Rc::as_ptr(row) as usize, field.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::Backend {
                message: format!("no scripted relation for '{field}'"),
            })
    }
}

#[async_trait(?Send)]
impl RecordStore for ScriptedStore {
    fn has_target(&self, target: &str) -> bool {
        match &*self.targets.borrow() {
            Some(targets) => targets.contains(target),
            None => true,
        }
    }

    fn add(&self, row: &RowRef) -> Result<(), StoreError> {
        self.rows.borrow_mut().push(row.clone());
        Ok(())
    }

    fn get(&self, target: &str, key: &Value) -> Result<Option<RowRef>, StoreError> {
        let rows = self.rows.borrow();
        Ok(rows
            .iter()
            .find(|row| {
                let inner = row.borrow();
                inner.target() == target && inner.field("id") == Some(key)
            })
            .cloned())
    }

    fn execute(&self, query: &Query) -> Result<Vec<RowRef>, StoreError> {
        let rows = self.rows.borrow();
        let mut out: Vec<RowRef> = rows
            .iter()
            .filter(|row| {
                let inner = row.borrow();
                inner.target() == query.target()
                    && query
                        .filters()
                        .iter()
                        .all(|(field, value)| inner.field(field) == Some(value))
            })
            .cloned()
            .collect();
        if let Some(limit) = query.limit_hint() {
            out.truncate(limit);
        }

        Ok(out)
    }

    fn fetch_relation(&self, row: &RowRef, field: &str) -> Result<RelationSlot, StoreError> {
        if self.async_only.get() {
            return Err(StoreError::AwaitRequired {
                context: format!("relation '{field}' resolves on the async path only"),
            });
        }

        self.resolve(row, field)
    }

    fn flush(&self) -> Result<(), StoreError> {
        for row in self.rows.borrow().iter() {
            let mut inner = row.borrow_mut();
            let missing = inner.field("id").is_none_or(Value::is_null);
            if missing {
                let key = self.next_key.get();
                self.next_key.set(key + 1);
                inner.set_field("id", Value::Uint(key));
            }
        }

        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.flush()
    }

    fn rollback(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn refresh(&self, _row: &RowRef) -> Result<(), StoreError> {
        Ok(())
    }

    fn expunge(&self, row: &RowRef) -> Result<(), StoreError> {
        self.rows.borrow_mut().retain(|r| !Rc::ptr_eq(r, row));
        Ok(())
    }

    fn enable_lazy_loads(&self, _row: &RowRef) -> Result<(), StoreError> {
        Ok(())
    }

    async fn fetch_relation_async(
        &self,
        row: &RowRef,
        field: &str,
    ) -> Result<RelationSlot, StoreError> {
        self.resolve(row, field)
    }
}

///
/// MemoryCache
/// Counting in-memory cache tier for cache-strategy tests.
///

#[derive(Default)]
pub struct MemoryCache {
    entries: RefCell<BTreeMap<String, Vec<u8>>>,
    pub sets: Cell<usize>,
    pub last_ttl: Cell<Option<Duration>>,
}

impl MemoryCache {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl CacheService for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        self.sets.set(self.sets.get() + 1);
        self.last_ttl.set(ttl);
        self.entries.borrow_mut().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn delete_matching(&self, pattern: &str) -> Result<(), CacheError> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        self.entries
            .borrow_mut()
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
