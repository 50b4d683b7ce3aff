use crate::{
    assoc::{
        AssocError, OwnerLink, Relation, invalid_value, materialize_err, resolve_slot,
        resolve_slot_async, strategy_err, unbound,
    },
    materialize,
    model::RelationShape,
    row::RelationSlot,
    traits::Record,
    validate,
};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fmt, rc::Rc};

///
/// Single
///
/// Optional reference to at most one related record, lazily materialized
/// from the owner's persisted relation slot on first read and written
/// through on assignment.
///

pub struct Single<T: Record> {
    state: RefCell<State<T>>,
}

struct State<T> {
    loaded: bool,
    owner: Option<OwnerLink>,
    payload: Option<Rc<T>>,
}

impl<T: Record> Single<T> {
    /// An empty, unloaded association.
    #[must_use]
    pub const fn unloaded() -> Self {
        Self {
            state: RefCell::new(State {
                loaded: false,
                owner: None,
                payload: None,
            }),
        }
    }

    /// An unloaded association carrying an initial payload. The payload's
    /// counterpart is pushed onto the owner's row at `prepare` time.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::with_shared(Rc::new(value))
    }

    #[must_use]
    pub fn with_shared(value: Rc<T>) -> Self {
        Self {
            state: RefCell::new(State {
                loaded: false,
                owner: None,
                payload: Some(value),
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

    /// Current payload, materializing on first read.
    ///
    /// An association whose owner has not been bound yet (e.g. mid-copy)
    /// returns its local payload without materializing.
    pub fn get(&self) -> Result<Option<Rc<T>>, AssocError> {
        {
            let st = self.state.borrow();
            if st.loaded || st.owner.is_none() {
                return Ok(st.payload.clone());
            }
        }

        self.load()?;

        Ok(self.state.borrow().payload.clone())
    }

    /// Async twin of [`Single::get`]: identical semantics plus the store
    /// scheduler handoff for deferred slots.
    pub async fn get_async(&self) -> Result<Option<Rc<T>>, AssocError> {
        {
            let st = self.state.borrow();
            if st.loaded || st.owner.is_none() {
                return Ok(st.payload.clone());
            }
        }

        self.load_async().await?;

        Ok(self.state.borrow().payload.clone())
    }

    /// Assign the related value, writing through to the persisted side in
    /// the same operation. `None` is rejected for required relations.
    pub fn set(&self, value: Option<Rc<T>>) -> Result<(), AssocError> {
        let Some(link) = self.link() else {
            return Err(unbound::<T>("Single"));
        };

        if value.is_none() && link.required() {
            return Err(AssocError::RequiredRelation {
                owner: link.owner_path(),
                field: link.field_name(),
            });
        }
        if let Some(v) = &value {
            validate::validate(&**v).map_err(|err| invalid_value(&link, err))?;
        }

        // Persisted side first; a failure leaves the payload untouched.
        if let Some(row) = link.row() {
            let target = match &value {
                Some(v) => materialize::counterpart(&**v).map_err(|err| strategy_err(&link, err))?,
                None => None,
            };
            row.borrow_mut()
                .set_relation(link.field_name(), RelationSlot::One(target));
        }

        let mut st = self.state.borrow_mut();
        st.payload = value;
        st.loaded = true;

        Ok(())
    }

    /// Convenience for [`Single::set`] with an owned value.
    pub fn set_value(&self, value: T) -> Result<(), AssocError> {
        self.set(Some(Rc::new(value)))
    }

    /// Materialize from the persisted side.
    ///
    /// When the slot carries a concrete row, it is validated into the
    /// payload; otherwise the local payload is validated and its
    /// counterpart pushed out. Failures leave `loaded == false`.
    pub fn load(&self) -> Result<(), AssocError> {
        let Some(link) = self.link() else {
            return Err(unbound::<T>("Single"));
        };

        let slot = match link.row() {
            Some(row) => Some(resolve_slot(&link, &row, self.shape())?),
            None => None,
        };

        self.finish_load(&link, slot)
    }

    /// Async twin of [`Single::load`].
    pub async fn load_async(&self) -> Result<(), AssocError> {
        let Some(link) = self.link() else {
            return Err(unbound::<T>("Single"));
        };

        let slot = match link.row() {
            Some(row) => Some(resolve_slot_async(&link, &row, self.shape()).await?),
            None => None,
        };

        self.finish_load(&link, slot)
    }

    // Synchronous tail shared by both load paths; runs after any I/O.
    fn finish_load(&self, link: &OwnerLink, slot: Option<RelationSlot>) -> Result<(), AssocError> {
        match slot {
            Some(RelationSlot::One(Some(target))) => {
                let instance = materialize::record::<T>(&target)
                    .map_err(|err| materialize_err(link, err))?;

                tracing::debug!(
                    owner = link.owner_path(),
                    field = link.field_name(),
                    "single association materialized"
                );

                let mut st = self.state.borrow_mut();
                st.payload = Some(instance);
                st.loaded = true;
                Ok(())
            }
            Some(RelationSlot::One(None)) | None => {
                // No concrete persisted object: validate the local payload
                // and push its counterpart onto the persisted side.
                let payload = self.state.borrow().payload.clone();
                if let Some(value) = payload {
                    validate::validate(&*value).map_err(|err| invalid_value(link, err))?;

                    if let Some(row) = link.row() {
                        let counterpart = materialize::counterpart(&*value)
                            .map_err(|err| strategy_err(link, err))?;
                        if let Some(counterpart) = counterpart {
                            row.borrow_mut().set_relation(
                                link.field_name(),
                                RelationSlot::One(Some(counterpart)),
                            );
                        }
                    }
                }

                self.state.borrow_mut().loaded = true;
                Ok(())
            }
            Some(_) => Err(AssocError::ShapeMismatch {
                owner: link.owner_path(),
                field: link.field_name(),
                expected: "a single-valued slot",
            }),
        }
    }
}

impl<T: Record> Relation for Single<T> {
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

        // Eager initial sync: a construction-supplied payload's counterpart
        // lands on the owner row now. Does not mark the wrapper loaded.
        let payload = self.state.borrow().payload.clone();
        if let (Some(value), Some(row)) = (payload, link.row()) {
            let counterpart =
                materialize::counterpart(&*value).map_err(|err| strategy_err(&link, err))?;
            if let Some(counterpart) = counterpart {
                row.borrow_mut()
                    .set_relation(link.field_name(), RelationSlot::One(Some(counterpart)));
            }
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
        self.link()
            .and_then(|link| link.relation().map(|r| r.shape))
            .unwrap_or(RelationShape::Single { required: false })
    }
}

impl<T: Record> Default for Single<T> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<T: Record> Clone for Single<T> {
    fn clone(&self) -> Self {
        let st = self.state.borrow();

        // Copies keep payload and load state but rebind to their new owner
        // on first access through the accessor protocol.
        Self {
            state: RefCell::new(State {
                loaded: st.loaded,
                owner: None,
                payload: st.payload.clone(),
            }),
        }
    }
}

// Value equality compares payloads only; binding and load state are
// handle-local and never part of record equality.
impl<T: Record> PartialEq for Single<T> {
    fn eq(&self, other: &Self) -> bool {
        let a = self.state.borrow();
        let b = other.state.borrow();
        match (&a.payload, &b.payload) {
            (Some(x), Some(y)) => **x == **y,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Record> fmt::Debug for Single<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Single")
            .field("loaded", &st.loaded)
            .field("payload", &st.payload.is_some())
            .finish()
    }
}

impl<T: Record> Serialize for Single<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let st = self.state.borrow();
        match &st.payload {
            Some(value) => serializer.serialize_some(&**value),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Record> Deserialize<'de> for Single<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|opt| match opt {
            Some(value) => Self::with_value(value),
            None => Self::unloaded(),
        })
    }
}
