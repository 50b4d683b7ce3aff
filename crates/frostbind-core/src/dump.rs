//! Structured output of validated records with include/exclude field
//! trees, and re-validation of structured input.

use crate::{
    traits::Record,
    validate::{self, ValidateError},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Wildcard segment applied uniformly across the elements of a sequence.
pub const ALL: &str = "__all__";

///
/// DumpError
///

#[derive(Debug, ThisError)]
pub enum DumpError {
    #[error("failed to serialize {model}: {source}")]
    Serialize {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode structured input for {model}: {source}")]
    Decode {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validate(#[from] ValidateError),
}

///
/// FieldTree
///
/// Nested set of field paths. A `Leaf` names a whole field; `Nodes`
/// descends into subfields, with [`ALL`] applied uniformly across the
/// elements of a sequence-valued field.
///

#[derive(Clone, Debug)]
pub enum FieldTree {
    Leaf,
    Nodes(BTreeMap<String, FieldTree>),
}

impl FieldTree {
    /// Flat set of field names.
    #[must_use]
    pub fn fields<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Nodes(
            names
                .into_iter()
                .map(|name| (name.to_string(), Self::Leaf))
                .collect(),
        )
    }

    /// Nested tree from (name, subtree) pairs.
    #[must_use]
    pub fn nodes(entries: impl IntoIterator<Item = (String, Self)>) -> Self {
        Self::Nodes(entries.into_iter().collect())
    }

    fn children(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Leaf => None,
            Self::Nodes(children) => Some(children),
        }
    }
}

///
/// DumpOptions
///

#[derive(Clone, Debug, Default)]
pub struct DumpOptions {
    pub include: Option<FieldTree>,
    pub exclude: Option<FieldTree>,
}

impl DumpOptions {
    #[must_use]
    pub fn excluding(tree: FieldTree) -> Self {
        Self {
            include: None,
            exclude: Some(tree),
        }
    }

    #[must_use]
    pub fn including(tree: FieldTree) -> Self {
        Self {
            include: Some(tree),
            exclude: None,
        }
    }
}

/// Dump one record to structured output, applying exclude then include.
pub fn dump<M: Record>(
    record: &M,
    options: &DumpOptions,
) -> Result<serde_json::Value, DumpError> {
    let mut value = serde_json::to_value(record).map_err(|source| DumpError::Serialize {
        model: M::MODEL.path,
        source,
    })?;

    if let Some(tree) = &options.exclude {
        apply_exclude(&mut value, tree);
    }
    if let Some(tree) = &options.include {
        value = apply_include(&value, tree);
    }

    Ok(value)
}

/// Re-validate structured output back into a record (dump round-trip).
pub fn validate_value<M: Record>(value: serde_json::Value) -> Result<M, DumpError> {
    let record: M = serde_json::from_value(value).map_err(|source| DumpError::Decode {
        model: M::MODEL.path,
        source,
    })?;
    validate::validate(&record)?;

    Ok(record)
}

fn apply_exclude(value: &mut serde_json::Value, tree: &FieldTree) {
    let Some(children) = tree.children() else {
        return;
    };

    match value {
        serde_json::Value::Object(object) => {
            for (name, subtree) in children {
                match subtree {
                    FieldTree::Leaf => {
                        object.remove(name);
                    }
                    FieldTree::Nodes(_) => {
                        if let Some(child) = object.get_mut(name) {
                            apply_exclude(child, subtree);
                        }
                    }
                }
            }
        }
        serde_json::Value::Array(items) => {
            if let Some(subtree) = children.get(ALL) {
                for item in items {
                    apply_exclude(item, subtree);
                }
            }
        }
        _ => {}
    }
}

fn apply_include(value: &serde_json::Value, tree: &FieldTree) -> serde_json::Value {
    let Some(children) = tree.children() else {
        return value.clone();
    };

    match value {
        serde_json::Value::Object(object) => {
            let mut out = serde_json::Map::new();
            for (name, subtree) in children {
                if let Some(child) = object.get(name) {
                    out.insert(name.clone(), apply_include(child, subtree));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => match children.get(ALL) {
            Some(subtree) => serde_json::Value::Array(
                items.iter().map(|item| apply_include(item, subtree)).collect(),
            ),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}
