//! Shared schema and store fixtures for FrostBind test surfaces: the
//! Author/Book pair used by the scenario tests, plus counting in-memory
//! store and cache stubs.

use async_trait::async_trait;
use frostbind::core::{
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
use serde::{Deserialize, Serialize};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
    time::Duration,
};

///
/// Author
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Author {
    #[serde(default)]
    pub id: Id<u64>,
    pub name: String,
    #[serde(default)]
    pub books: Many<Book>,
    #[serde(skip)]
    provided: Provided,
}

static AUTHOR_FIELDS: [FieldModel; 2] = [
    FieldModel {
        name: "id",
        kind: FieldKind::Uint,
    },
    FieldModel {
        name: "name",
        kind: FieldKind::Text,
    },
];

static AUTHOR_MODEL: ModelDescriptor = ModelDescriptor {
    path: Author::PATH,
    model_name: "author",
    identity: Some(&AUTHOR_FIELDS[0]),
    fields: &AUTHOR_FIELDS,
    relations: &[RelationModel {
        name: "books",
        shape: RelationShape::Many,
        target_path: Book::PATH,
    }],
};

impl Path for Author {
    const PATH: &'static str = "frostbind_testing_fixtures::Author";
}

impl Validate for Author {
    fn validate(&self, ctx: &mut ValidateCtx) {
        if self.name.is_empty() {
            ctx.issue("name", "must not be empty");
        }
    }
}

impl Record for Author {
    const MODEL: &'static ModelDescriptor = &AUTHOR_MODEL;

    fn provided(&self) -> &Provided {
        &self.provided
    }

    fn identity_value(&self) -> Value {
        self.id.to_value()
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.to_value()), ("name", self.name.to_value())]
    }

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<(), ValidateError> {
        match name {
            "id" => self.id.assign_from(Self::PATH, "id", value),
            "name" => {
                self.name = validate::field_from_value(Self::PATH, "name", value)?;
                Ok(())
            }
            _ => Err(ValidateError::UnknownField {
                model: Self::PATH,
                field: name.to_string(),
            }),
        }
    }

    fn relations(&self) -> Vec<(&'static str, &dyn Relation)> {
        vec![("books", &self.books)]
    }
}

impl Author {
    /// A plain value that has not gone through the construction protocol.
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            id: Id::unset(),
            name: name.into(),
            books: Many::unloaded(),
            provided: Provided::unbound(),
        }
    }

    pub fn create(name: impl Into<String>) -> Result<Self, BindError> {
        let author = Self::detached(name);
        bind::construct(&author)?;

        Ok(author)
    }

    pub fn books(&self) -> Result<&Many<Book>, BindError> {
        bind::prepare_field::<Self, _>(&self.provided, &self.books, "books")
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        bind::write_field::<Self>(&self.provided, "name", &self.name.to_value());
    }

    pub fn set_id(&mut self, id: u64) -> Result<(), ValidateError> {
        self.id.set(Self::PATH, "id", id)?;
        bind::write_field::<Self>(&self.provided, "id", &Value::Uint(id));

        Ok(())
    }
}

///
/// Book
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Book {
    #[serde(default)]
    pub id: Id<u64>,
    pub title: String,
    #[serde(default)]
    pub author: Single<Author>,
    #[serde(skip)]
    provided: Provided,
}

static BOOK_FIELDS: [FieldModel; 2] = [
    FieldModel {
        name: "id",
        kind: FieldKind::Uint,
    },
    FieldModel {
        name: "title",
        kind: FieldKind::Text,
    },
];

static BOOK_MODEL: ModelDescriptor = ModelDescriptor {
    path: Book::PATH,
    model_name: "book",
    identity: Some(&BOOK_FIELDS[0]),
    fields: &BOOK_FIELDS,
    relations: &[RelationModel {
        name: "author",
        shape: RelationShape::Single { required: false },
        target_path: Author::PATH,
    }],
};

impl Path for Book {
    const PATH: &'static str = "frostbind_testing_fixtures::Book";
}

impl Validate for Book {
    fn validate(&self, ctx: &mut ValidateCtx) {
        if self.title.is_empty() {
            ctx.issue("title", "must not be empty");
        }
    }
}

impl Record for Book {
    const MODEL: &'static ModelDescriptor = &BOOK_MODEL;

    fn provided(&self) -> &Provided {
        &self.provided
    }

    fn identity_value(&self) -> Value {
        self.id.to_value()
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.to_value()), ("title", self.title.to_value())]
    }

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<(), ValidateError> {
        match name {
            "id" => self.id.assign_from(Self::PATH, "id", value),
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
        vec![("author", &self.author)]
    }
}

impl Book {
    /// A plain value that has not gone through the construction protocol.
    pub fn detached(title: impl Into<String>) -> Self {
        Self {
            id: Id::unset(),
            title: title.into(),
            author: Single::unloaded(),
            provided: Provided::unbound(),
        }
    }

    pub fn create(title: impl Into<String>) -> Result<Self, BindError> {
        let book = Self::detached(title);
        bind::construct(&book)?;

        Ok(book)
    }

    pub fn author(&self) -> Result<&Single<Author>, BindError> {
        bind::prepare_field::<Self, _>(&self.provided, &self.author, "author")
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        bind::write_field::<Self>(&self.provided, "title", &self.title.to_value());
    }
}

///
/// MemoryStore
///
/// Counting in-memory record store: pending rows move into tables on
/// flush (which assigns store keys), deferred relations resolve from
/// scripted slots, and an async-only mode fails the sync surface with
/// `AwaitRequired`.
///

#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, Vec<RowRef>>>,
    pending: RefCell<Vec<RowRef>>,
    scripts: RefCell<BTreeMap<(usize, String), RelationSlot>>,
    pub gets: Cell<usize>,
    pub executes: Cell<usize>,
    pub relation_fetches: Cell<usize>,
    async_only: Cell<bool>,
    next_key: Cell<u64>,
}

impl MemoryStore {
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

    pub fn set_async_only(&self, value: bool) {
        self.async_only.set(value);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    fn all_rows(&self) -> Vec<RowRef> {
        let mut rows: Vec<RowRef> = self
            .tables
            .borrow()
            .values()
            .flat_map(|rows| rows.iter().cloned())
            .collect();
        rows.extend(self.pending.borrow().iter().cloned());
        rows
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
impl RecordStore for MemoryStore {
    fn has_target(&self, _target: &str) -> bool {
        true
    }

    fn add(&self, row: &RowRef) -> Result<(), StoreError> {
        self.pending.borrow_mut().push(row.clone());
        Ok(())
    }

    fn get(&self, target: &str, key: &Value) -> Result<Option<RowRef>, StoreError> {
        self.gets.set(self.gets.get() + 1);

        Ok(self.all_rows().into_iter().find(|row| {
            let inner = row.borrow();
            inner.target() == target && inner.field("id") == Some(key)
        }))
    }

    fn execute(&self, query: &Query) -> Result<Vec<RowRef>, StoreError> {
        self.executes.set(self.executes.get() + 1);

        let mut out: Vec<RowRef> = self
            .all_rows()
            .into_iter()
            .filter(|row| {
                let inner = row.borrow();
                inner.target() == query.target()
                    && query
                        .filters()
                        .iter()
                        .all(|(field, value)| inner.field(field) == Some(value))
            })
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
        let pending: Vec<RowRef> = self.pending.borrow_mut().drain(..).collect();
        for row in pending {
            let target = {
                let mut inner = row.borrow_mut();
                if inner.field("id").is_none_or(Value::is_null) {
                    let key = self.next_key.get();
                    self.next_key.set(key + 1);
                    inner.set_field("id", Value::Uint(key));
                }
                inner.target().to_string()
            };
            self.tables.borrow_mut().entry(target).or_default().push(row);
        }

        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.flush()
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.pending.borrow_mut().clear();
        Ok(())
    }

    fn refresh(&self, _row: &RowRef) -> Result<(), StoreError> {
        Ok(())
    }

    fn expunge(&self, row: &RowRef) -> Result<(), StoreError> {
        self.pending.borrow_mut().retain(|r| !Rc::ptr_eq(r, row));
        for rows in self.tables.borrow_mut().values_mut() {
            rows.retain(|r| !Rc::ptr_eq(r, row));
        }

        Ok(())
    }

    fn enable_lazy_loads(&self, row: &RowRef) -> Result<(), StoreError> {
        // Re-arm no-load slots so implicit loading works again.
        let names: Vec<String> = {
            let inner = row.borrow();
            Author::MODEL
                .relations
                .iter()
                .chain(Book::MODEL.relations)
                .filter(|relation| {
                    matches!(inner.relation(relation.name), Some(RelationSlot::NoLoad(_)))
                })
                .map(|relation| relation.name.to_string())
                .collect()
        };
        for name in names {
            let shape = match row.borrow().relation(&name) {
                Some(RelationSlot::NoLoad(shape)) => Some(*shape),
                _ => None,
            };
            if let Some(shape) = shape {
                row.borrow_mut()
                    .set_relation(name, RelationSlot::Deferred(shape));
            }
        }

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

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl CacheService for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        self.sets.set(self.sets.get() + 1);
        self.last_ttl.set(ttl);
        self.entries
            .borrow_mut()
            .insert(key.to_string(), bytes.to_vec());

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
