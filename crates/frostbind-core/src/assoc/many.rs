use crate::{
    assoc::{
        AssocError, OwnerLink, Relation, invalid_value, materialize_err, resolve_slot,
        resolve_slot_async, row_ptr_eq, strategy_err, unbound,
    },
    materialize,
    model::RelationShape,
    row::{RelationSlot, RowRef},
    traits::Record,
    validate,
};
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    fmt,
    ops::{Mul, Range},
    rc::Rc,
};

///
/// Many
///
/// Ordered collection of related records. Every read and every mutator is
/// ensure-loaded-first; mutators then update the persisted slot and the
/// local sequence in that order, short-circuiting on failure so the two
/// sides never diverge on success.
///

pub struct Many<T: Record> {
    state: RefCell<State<T>>,
}

struct State<T> {
    loaded: bool,
    owner: Option<OwnerLink>,
    items: Vec<Rc<T>>,
}

impl<T: Record> Many<T> {
    /// An empty, unloaded collection.
    #[must_use]
    pub const fn unloaded() -> Self {
        Self {
            state: RefCell::new(State {
                loaded: false,
                owner: None,
                items: Vec::new(),
            }),
        }
    }

    /// An unloaded collection carrying initial items. Counterparts are
    /// pushed onto the owner's row at `prepare`/`load` time.
    #[must_use]
    pub fn with_items(items: Vec<T>) -> Self {
        Self::with_shared(items.into_iter().map(Rc::new).collect())
    }

    #[must_use]
    pub fn with_shared(items: Vec<Rc<T>>) -> Self {
        Self {
            state: RefCell::new(State {
                loaded: false,
                owner: None,
                items,
            }),
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.borrow().loaded
    }

    fn link(&self) -> Option<OwnerLink> {
        self.state.borrow().owner.clone()
    }

    fn bound_link(&self) -> Result<OwnerLink, AssocError> {
        self.link().ok_or_else(|| unbound::<T>("Many"))
    }

    // Reads on an unbound collection observe the local payload; once an
    // owner is bound the first touch materializes.
    fn ensure_loaded(&self) -> Result<(), AssocError> {
        let (loaded, bound) = {
            let st = self.state.borrow();
            (st.loaded, st.owner.is_some())
        };
        if !loaded && bound {
            self.load()?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads (ensure-loaded-first)
    // ------------------------------------------------------------------

    pub fn len(&self) -> Result<usize, AssocError> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().items.len())
    }

    pub fn is_empty(&self) -> Result<bool, AssocError> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<Option<Rc<T>>, AssocError> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().items.get(index).cloned())
    }

    pub fn first(&self) -> Result<Option<Rc<T>>, AssocError> {
        self.get(0)
    }

    pub fn last(&self) -> Result<Option<Rc<T>>, AssocError> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().items.last().cloned())
    }

    pub fn contains(&self, value: &T) -> Result<bool, AssocError> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().items.iter().any(|item| **item == *value))
    }

    /// Snapshot of the loaded sequence.
    pub fn to_vec(&self) -> Result<Vec<Rc<T>>, AssocError> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().items.clone())
    }

    /// Snapshot of one slice of the loaded sequence.
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<Rc<T>>, AssocError> {
        self.ensure_loaded()?;

        let st = self.state.borrow();
        let len = st.items.len();
        if range.start > range.end || range.end > len {
            return Err(AssocError::IndexOutOfBounds {
                field: self.link().map_or("?", |link| link.field_name()),
                index: range.end,
                len,
            });
        }

        Ok(st.items[range].to_vec())
    }

    // ------------------------------------------------------------------
    // Mutators (ensure-loaded-first, persisted side before local)
    // ------------------------------------------------------------------

    pub fn push(&self, value: Rc<T>) -> Result<(), AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        validate::validate(&*value).map_err(|err| invalid_value(&link, err))?;
        self.persist_insert_at(&link, usize::MAX, &value)?;
        self.state.borrow_mut().items.push(value);

        Ok(())
    }

    /// Push an owned value.
    pub fn push_value(&self, value: T) -> Result<(), AssocError> {
        self.push(Rc::new(value))
    }

    /// Append a batch. The whole batch is validated before any mutation.
    pub fn extend(&self, values: impl IntoIterator<Item = Rc<T>>) -> Result<(), AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        let values: Vec<Rc<T>> = values.into_iter().collect();
        for value in &values {
            validate::validate(&**value).map_err(|err| invalid_value(&link, err))?;
        }
        // Persisted-then-local per item keeps the two sides index-aligned
        // across the batch.
        for value in values {
            self.persist_insert_at(&link, usize::MAX, &value)?;
            self.state.borrow_mut().items.push(value);
        }

        Ok(())
    }

    pub fn insert(&self, index: usize, value: Rc<T>) -> Result<(), AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        let len = self.state.borrow().items.len();
        if index > len {
            return Err(AssocError::IndexOutOfBounds {
                field: link.field_name(),
                index,
                len,
            });
        }

        validate::validate(&*value).map_err(|err| invalid_value(&link, err))?;
        self.persist_insert_at(&link, index, &value)?;
        self.state.borrow_mut().items.insert(index, value);

        Ok(())
    }

    /// Remove the first item equal to `value`. Returns whether anything
    /// was removed.
    pub fn remove(&self, value: &T) -> Result<bool, AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        let index = self
            .state
            .borrow()
            .items
            .iter()
            .position(|item| **item == *value);
        let Some(index) = index else {
            return Ok(false);
        };

        self.persist_remove_index(&link, index)?;
        self.state.borrow_mut().items.remove(index);

        Ok(true)
    }

    pub fn pop(&self) -> Result<Option<Rc<T>>, AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        let len = self.state.borrow().items.len();
        if len == 0 {
            return Ok(None);
        }

        self.persist_remove_index(&link, len - 1)?;
        Ok(self.state.borrow_mut().items.pop())
    }

    pub fn clear(&self) -> Result<(), AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        if let Some(row) = link.row() {
            row.borrow_mut()
                .set_relation(link.field_name(), RelationSlot::Many(Vec::new()));
        }
        self.state.borrow_mut().items.clear();

        Ok(())
    }

    /// Replace the item at `index`.
    pub fn set(&self, index: usize, value: Rc<T>) -> Result<(), AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        let len = self.state.borrow().items.len();
        if index >= len {
            return Err(AssocError::IndexOutOfBounds {
                field: link.field_name(),
                index,
                len,
            });
        }

        validate::validate(&*value).map_err(|err| invalid_value(&link, err))?;

        if let Some(row) = link.row() {
            let old = self.state.borrow().items[index].provided().row();
            let new = materialize::counterpart(&*value).map_err(|err| strategy_err(&link, err))?;
            let mut persisted = self.resolved_vec(&link, &row)?;

            match (old, new) {
                (Some(old), Some(new)) => {
                    if let Some(pos) = persisted.iter().position(|r| row_ptr_eq(r, &old)) {
                        persisted[pos] = new;
                    } else {
                        persisted.push(new);
                    }
                }
                (Some(old), None) => {
                    if let Some(pos) = persisted.iter().position(|r| row_ptr_eq(r, &old)) {
                        persisted.remove(pos);
                    }
                }
                (None, Some(new)) => {
                    let pos = self.persisted_position(index).min(persisted.len());
                    persisted.insert(pos, new);
                }
                (None, None) => {}
            }

            row.borrow_mut()
                .set_relation(link.field_name(), RelationSlot::Many(persisted));
        }

        self.state.borrow_mut().items[index] = value;

        Ok(())
    }

    /// Replace `range` with `values` (slice assignment). Returns the
    /// removed items.
    pub fn splice(
        &self,
        range: Range<usize>,
        values: Vec<Rc<T>>,
    ) -> Result<Vec<Rc<T>>, AssocError> {
        let link = self.bound_link()?;
        self.ensure_loaded()?;

        let len = self.state.borrow().items.len();
        if range.start > range.end || range.end > len {
            return Err(AssocError::IndexOutOfBounds {
                field: link.field_name(),
                index: range.end,
                len,
            });
        }

        for value in &values {
            validate::validate(&**value).map_err(|err| invalid_value(&link, err))?;
        }

        if let Some(row) = link.row() {
            let mut persisted = self.resolved_vec(&link, &row)?;

            {
                let st = self.state.borrow();
                for item in &st.items[range.clone()] {
                    if let Some(counterpart) = item.provided().row() {
                        if let Some(pos) =
                            persisted.iter().position(|r| row_ptr_eq(r, &counterpart))
                        {
                            persisted.remove(pos);
                        }
                    }
                }
            }

            let mut pos = self.persisted_position(range.start);
            for value in &values {
                let counterpart =
                    materialize::counterpart(&**value).map_err(|err| strategy_err(&link, err))?;
                if let Some(counterpart) = counterpart {
                    let at = pos.min(persisted.len());
                    persisted.insert(at, counterpart);
                    pos = at + 1;
                }
            }

            row.borrow_mut()
                .set_relation(link.field_name(), RelationSlot::Many(persisted));
        }

        let removed: Vec<Rc<T>> = self
            .state
            .borrow_mut()
            .items
            .splice(range, values)
            .collect();

        Ok(removed)
    }

    /// Delete `range` (slice deletion). Returns the removed items.
    pub fn drain(&self, range: Range<usize>) -> Result<Vec<Rc<T>>, AssocError> {
        self.splice(range, Vec::new())
    }

    /// TEST ONLY: push into the local sequence without touching the
    /// persisted side, to stage divergence scenarios.
    #[cfg(test)]
    pub(crate) fn inject_local_for_tests(&self, item: Rc<T>) {
        self.state.borrow_mut().items.push(item);
    }

    /// Replication is not supported on relation collections.
    pub fn repeat(&self, _count: usize) -> Result<Self, AssocError> {
        Err(AssocError::UnsupportedOperation {
            operation: "repeat",
        })
    }

    // ------------------------------------------------------------------
    // Load / reconciliation
    // ------------------------------------------------------------------

    /// Materialize from the persisted side, reconciling local items.
    ///
    /// Local items whose counterpart is missing from the persisted slot
    /// are appended (never duplicated). If the two sides still disagree
    /// in count afterwards, the persisted side is the source of truth and
    /// the local sequence is replaced wholesale.
    pub fn load(&self) -> Result<(), AssocError> {
        let Some(link) = self.link() else {
            return Err(unbound::<T>("Many"));
        };
        let Some(row) = link.row() else {
            // No persisted counterpart at all: the local sequence is the
            // whole truth.
            self.state.borrow_mut().loaded = true;
            return Ok(());
        };

        let persisted = match resolve_slot(&link, &row, RelationShape::Many)? {
            RelationSlot::Many(rows) => rows,
            _ => {
                return Err(AssocError::ShapeMismatch {
                    owner: link.owner_path(),
                    field: link.field_name(),
                    expected: "a collection slot",
                });
            }
        };

        self.reconcile(&link, &row, persisted)
    }

    /// Async twin of [`Many::load`].
    pub async fn load_async(&self) -> Result<(), AssocError> {
        let Some(link) = self.link() else {
            return Err(unbound::<T>("Many"));
        };
        let Some(row) = link.row() else {
            self.state.borrow_mut().loaded = true;
            return Ok(());
        };

        let persisted = match resolve_slot_async(&link, &row, RelationShape::Many).await? {
            RelationSlot::Many(rows) => rows,
            _ => {
                return Err(AssocError::ShapeMismatch {
                    owner: link.owner_path(),
                    field: link.field_name(),
                    expected: "a collection slot",
                });
            }
        };

        self.reconcile(&link, &row, persisted)
    }

    /// Async twin of [`Many::to_vec`], for reads across deferred slots.
    pub async fn to_vec_async(&self) -> Result<Vec<Rc<T>>, AssocError> {
        let (loaded, bound) = {
            let st = self.state.borrow();
            (st.loaded, st.owner.is_some())
        };
        if !loaded && bound {
            self.load_async().await?;
        }

        Ok(self.state.borrow().items.clone())
    }

    // Synchronous reconciliation tail shared by both load paths.
    fn reconcile(
        &self,
        link: &OwnerLink,
        row: &RowRef,
        mut persisted: Vec<RowRef>,
    ) -> Result<(), AssocError> {
        let local = self.state.borrow().items.clone();

        // Append local items whose counterpart is absent. Items with no
        // counterpart yet contribute nothing here; the count check below
        // decides their fate.
        for item in &local {
            if let Some(counterpart) = item.provided().row() {
                if !persisted.iter().any(|r| row_ptr_eq(r, &counterpart)) {
                    validate::validate(&**item).map_err(|err| invalid_value(link, err))?;
                    persisted.push(counterpart);
                }
            }
        }

        row.borrow_mut()
            .set_relation(link.field_name(), RelationSlot::Many(persisted.clone()));

        if persisted.len() == local.len() {
            self.state.borrow_mut().loaded = true;
            return Ok(());
        }

        // Persisted side wins on residual divergence: the local sequence is
        // replaced from the slot, discarding items that never made it out.
        tracing::debug!(
            owner = link.owner_path(),
            field = link.field_name(),
            persisted = persisted.len(),
            local = local.len(),
            "collection diverged after reconciliation; replacing from persisted side"
        );

        let mut replaced = Vec::with_capacity(persisted.len());
        for target in &persisted {
            replaced
                .push(materialize::record::<T>(target).map_err(|err| materialize_err(link, err))?);
        }

        let mut st = self.state.borrow_mut();
        st.items = replaced;
        st.loaded = true;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Persisted-side helpers
    // ------------------------------------------------------------------

    fn resolved_vec(&self, link: &OwnerLink, row: &RowRef) -> Result<Vec<RowRef>, AssocError> {
        match resolve_slot(link, row, RelationShape::Many)? {
            RelationSlot::Many(rows) => Ok(rows),
            _ => Err(AssocError::ShapeMismatch {
                owner: link.owner_path(),
                field: link.field_name(),
                expected: "a collection slot",
            }),
        }
    }

    // Persisted insertion position for a local index: items without a
    // counterpart occupy no persisted slot.
    fn persisted_position(&self, local_index: usize) -> usize {
        let st = self.state.borrow();
        let upto = local_index.min(st.items.len());
        st.items[..upto]
            .iter()
            .filter(|item| item.provided().row().is_some())
            .count()
    }

    fn persist_insert_at(
        &self,
        link: &OwnerLink,
        local_index: usize,
        value: &Rc<T>,
    ) -> Result<(), AssocError> {
        let Some(row) = link.row() else {
            return Ok(());
        };
        let Some(counterpart) =
            materialize::counterpart(&**value).map_err(|err| strategy_err(link, err))?
        else {
            return Ok(());
        };

        let mut persisted = self.resolved_vec(link, &row)?;
        let pos = self.persisted_position(local_index).min(persisted.len());
        persisted.insert(pos, counterpart);
        row.borrow_mut()
            .set_relation(link.field_name(), RelationSlot::Many(persisted));

        Ok(())
    }

    fn persist_remove_index(&self, link: &OwnerLink, index: usize) -> Result<(), AssocError> {
        let Some(row) = link.row() else {
            return Ok(());
        };
        let Some(counterpart) = self.state.borrow().items[index].provided().row() else {
            return Ok(());
        };

        let mut persisted = self.resolved_vec(link, &row)?;
        if let Some(pos) = persisted.iter().position(|r| row_ptr_eq(r, &counterpart)) {
            persisted.remove(pos);
            row.borrow_mut()
                .set_relation(link.field_name(), RelationSlot::Many(persisted));
        }

        Ok(())
    }
}

impl<T: Record> Relation for Many<T> {
    fn prepare(&self, link: OwnerLink) -> Result<(), AssocError> {
        {
            let mut st = self.state.borrow_mut();
            if st.owner.is_some() {
                return Ok(());
            }
            st.owner = Some(link.clone());
            if st.loaded {
                return Ok(());
            }
        }

        // Eager initial sync of construction-supplied items onto an
        // already-resolved slot. Prepare never performs I/O; deferred
        // slots reconcile at load time instead.
        let Some(row) = link.row() else {
            return Ok(());
        };
        let local = self.state.borrow().items.clone();
        if local.is_empty() {
            return Ok(());
        }

        let resolved = match row.borrow().relation(link.field_name()) {
            None => Some(Vec::new()),
            Some(RelationSlot::Many(rows)) => Some(rows.clone()),
            Some(_) => None,
        };
        let Some(mut persisted) = resolved else {
            return Ok(());
        };

        let mut changed = false;
        for item in &local {
            let counterpart =
                materialize::counterpart(&**item).map_err(|err| strategy_err(&link, err))?;
            if let Some(counterpart) = counterpart {
                if !persisted.iter().any(|r| row_ptr_eq(r, &counterpart)) {
                    persisted.push(counterpart);
                    changed = true;
                }
            }
        }
        if changed {
            row.borrow_mut()
                .set_relation(link.field_name(), RelationSlot::Many(persisted));
        }

        Ok(())
    }

    fn loaded(&self) -> bool {
        self.is_loaded()
    }

    fn invalidate(&self) {
        self.state.borrow_mut().loaded = false;
    }

    fn shape(&self) -> RelationShape {
        RelationShape::Many
    }
}

impl<T: Record> Default for Many<T> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<T: Record> Clone for Many<T> {
    fn clone(&self) -> Self {
        let st = self.state.borrow();

        // Copies keep payload and load state but rebind to their new owner
        // on first access through the accessor protocol.
        Self {
            state: RefCell::new(State {
                loaded: st.loaded,
                owner: None,
                items: st.items.clone(),
            }),
        }
    }
}

// Value equality compares the local sequences; binding and load state are
// handle-local and never part of record equality.
impl<T: Record> PartialEq for Many<T> {
    fn eq(&self, other: &Self) -> bool {
        let a = self.state.borrow();
        let b = other.state.borrow();
        a.items.len() == b.items.len()
            && a.items.iter().zip(&b.items).all(|(x, y)| **x == **y)
    }
}

impl<T: Record> fmt::Debug for Many<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Many")
            .field("loaded", &st.loaded)
            .field("len", &st.items.len())
            .finish()
    }
}

impl<T: Record> Mul<usize> for &Many<T> {
    type Output = Result<Many<T>, AssocError>;

    fn mul(self, count: usize) -> Self::Output {
        let _ = count;
        Err(AssocError::UnsupportedOperation { operation: "mul" })
    }
}

impl<T: Record> Mul<&Many<T>> for usize {
    type Output = Result<Many<T>, AssocError>;

    fn mul(self, rhs: &Many<T>) -> Self::Output {
        rhs * self
    }
}

impl<T: Record> Serialize for Many<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let st = self.state.borrow();
        serializer.collect_seq(st.items.iter().map(|item| &**item))
    }
}

impl<'de, T: Record> Deserialize<'de> for Many<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vec::<T>::deserialize(deserializer).map(Self::with_items)
    }
}
