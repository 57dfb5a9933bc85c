//! Data objects: named values attached to a process, a node or a sequence.

use std::sync::Arc;

use serde::{
    Deserialize,
    Serialize,
};

use super::ComponentId;
use crate::errors::ScriptError;
use crate::script::{
    IntegerScript,
    StringScript,
};

/// Whether a data object is a precondition of its owner or an outcome of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Read by the owner; recorded when the owner is reached.
    Required,
    /// Written by the owner; recorded on the owner's events.
    Generated,
}

/// The flow object or sequence a data object is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    /// A flow object.
    Node(ComponentId),
    /// A sequence, e.g. an XOR branch guard.
    Sequence(ComponentId),
}

impl Owner {
    /// Id of the owning component.
    #[must_use]
    pub const fn id(self) -> ComponentId {
        match self {
            Self::Node(id) | Self::Sequence(id) => id,
        }
    }
}

/// A concrete attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// Whole number.
    Integer(i64),
    /// Free text.
    Text(String),
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// How a data object obtains its value.
#[derive(Clone, Debug)]
pub enum DataObjectKind {
    /// A fixed value, identical for every case.
    Plain(DataValue),
    /// Integer computed per case.
    Integer(Arc<dyn IntegerScript>),
    /// String computed per case.
    String(Arc<dyn StringScript>),
}

/// The value a data object takes in one case. `original` is kept untouched by noise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedValue {
    /// Value recorded in the log, possibly noisy.
    pub value: DataValue,
    /// Value before noise.
    pub original: DataValue,
}

impl GeneratedValue {
    /// Noise-free value.
    fn fresh(value: DataValue) -> Self {
        Self { original: value.clone(), value }
    }
}

/// Named piece of data owned by a process and optionally attached to a node or sequence.
#[derive(Clone, Debug)]
pub struct DataObject {
    /// Identity within the process.
    id: ComponentId,
    /// Attribute key in the log.
    name: String,
    /// Where the value comes from.
    kind: DataObjectKind,
    /// Attachment; case-level when absent.
    owner: Option<(Owner, Direction)>,
}

impl DataObject {
    /// Wrap the parts of a freshly allocated data object.
    pub(crate) const fn new(
        id: ComponentId,
        name: String,
        kind: DataObjectKind,
        owner: Option<(Owner, Direction)>,
    ) -> Self {
        Self { id, name, kind, owner }
    }

    /// Identity within the process.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Attribute key in the log.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the value comes from.
    #[must_use]
    pub const fn kind(&self) -> &DataObjectKind {
        &self.kind
    }

    /// The node or sequence this object is attached to.
    #[must_use]
    pub const fn owner(&self) -> Option<Owner> {
        match self.owner {
            Some((owner, _)) => Some(owner),
            None => None,
        }
    }

    /// How the object relates to its owner.
    #[must_use]
    pub const fn direction(&self) -> Option<Direction> {
        match self.owner {
            Some((_, direction)) => Some(direction),
            None => None,
        }
    }

    /// Compute this object's value for `case_id`.
    ///
    /// This never mutates the object, so concurrent simulations of the same process can call it
    /// freely.
    pub fn generate(&self, case_id: &str) -> Result<GeneratedValue, ScriptError> {
        let value = match &self.kind {
            DataObjectKind::Plain(v) => v.clone(),
            DataObjectKind::Integer(script) => DataValue::Integer(script.evaluate(case_id)?),
            DataObjectKind::String(script) => DataValue::Text(script.evaluate(case_id)?),
        };
        Ok(GeneratedValue::fresh(value))
    }
}
