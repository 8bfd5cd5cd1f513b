//! Core identifiers and records of the lineage graph
//!
//! Node identity is the pair `(kind, row_id)` or, equivalently, the
//! [`GlobalId`]. Edges never hold references to nodes; they are stored
//! between [`ObjectId`] surrogate keys so that traversal and cycle detection
//! work on plain integers.

use crate::error::LineageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length of a global identifier
pub const MAX_GLOBAL_ID_LEN: usize = 300;

/// Default maximum length of an edge role
pub const DEFAULT_MAX_ROLE_LEN: usize = 50;

/// Process-wide surrogate key of a registered node
///
/// Unlike [`RowId`], object ids are shared across node kinds, so a sample
/// and a data item never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// Surrogate key of a node within its own kind's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// Logical commit timestamp
///
/// Every committed transaction receives the next sequence number. Node
/// modification stamps and cache watermarks are expressed in it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CommitSeq(pub u64);

impl CommitSeq {
    /// The sequence number following this one
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Isolation boundary a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub Uuid);

impl ContainerId {
    /// Create a fresh container id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of a lineage node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Experiment run (a protocol application)
    Run,
    /// Sample / material
    Sample,
    /// Data item
    Data,
}

impl NodeKind {
    /// Role used for an edge whose input is of this kind and no role was given
    #[must_use]
    pub fn default_role(self) -> &'static str {
        match self {
            NodeKind::Run => "Run",
            NodeKind::Sample => "Sample",
            NodeKind::Data => "Data",
        }
    }

    /// Short lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Run => "run",
            NodeKind::Sample => "sample",
            NodeKind::Data => "data",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named sub-kind of a node: a sample type, a data class or a run protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeKey {
    /// Sample type row id
    SampleType(i64),
    /// Data class row id
    DataClass(i64),
    /// Protocol row id of a run
    Protocol(i64),
}

impl TypeKey {
    /// Node kind that carries this type key
    #[must_use]
    pub fn kind(self) -> NodeKind {
        match self {
            TypeKey::SampleType(_) => NodeKind::Sample,
            TypeKey::DataClass(_) => NodeKind::Data,
            TypeKey::Protocol(_) => NodeKind::Run,
        }
    }

    /// Whether ancestors of this type take part in closure lookups
    #[must_use]
    pub fn is_lookup_target(self) -> bool {
        !matches!(self, TypeKey::Protocol(_))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKey::SampleType(id) => write!(f, "m{id}"),
            TypeKey::DataClass(id) => write!(f, "d{id}"),
            TypeKey::Protocol(id) => write!(f, "p{id}"),
        }
    }
}

/// Opaque, process-wide unique node handle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlobalId(String);

impl GlobalId {
    /// Validate and wrap a global identifier
    ///
    /// # Errors
    /// `InvalidIdentifier` if the value is empty, too long, or contains
    /// whitespace or control characters.
    pub fn parse(value: impl Into<String>) -> Result<Self, LineageError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("empty identifier")
        } else if value.len() > MAX_GLOBAL_ID_LEN {
            Some("identifier too long")
        } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("identifier contains whitespace or control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(LineageError::InvalidIdentifier {
                global_id: value,
                reason: reason.to_string(),
            }),
            None => Ok(Self(value)),
        }
    }

    /// Generate a fresh identifier in the `urn:lsid:` scheme
    #[must_use]
    pub fn generate(authority: &str, namespace: &str) -> Self {
        Self(format!("urn:lsid:{authority}:{namespace}:{}", Uuid::new_v4()))
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GlobalId {
    type Error = LineageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<GlobalId> for String {
    fn from(value: GlobalId) -> Self {
        value.0
    }
}

/// `(kind, row_id)` identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    /// Node kind
    pub kind: NodeKind,
    /// Row id within the kind
    pub row_id: RowId,
}

impl RowKey {
    /// Create a row key
    #[inline]
    #[must_use]
    pub fn new(kind: NodeKind, row_id: i64) -> Self {
        Self {
            kind,
            row_id: RowId(row_id),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.row_id)
    }
}

/// A registered lineage node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Process-wide surrogate key
    pub object_id: ObjectId,
    /// Node kind
    pub kind: NodeKind,
    /// Row id within the kind
    pub row_id: RowId,
    /// Global identifier
    pub global_id: GlobalId,
    /// Sub-kind
    pub type_key: Option<TypeKey>,
    /// Isolation boundary
    pub container: ContainerId,
    /// Display name
    pub name: String,
    /// Wall-clock registration time
    pub created: DateTime<Utc>,
    /// Commit that last modified the node or its incoming edges
    pub modified: CommitSeq,
}

impl Node {
    /// `(kind, row_id)` identity
    #[inline]
    #[must_use]
    pub fn row_key(&self) -> RowKey {
        RowKey {
            kind: self.kind,
            row_id: self.row_id,
        }
    }
}

/// Registration request for a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    /// Node kind
    pub kind: NodeKind,
    /// Row id within the kind, assigned by the owning business object
    pub row_id: RowId,
    /// Global identifier
    pub global_id: GlobalId,
    /// Sub-kind
    pub type_key: Option<TypeKey>,
    /// Isolation boundary
    pub container: ContainerId,
    /// Display name
    pub name: String,
}

impl NewNode {
    /// Create a registration request without a sub-kind
    pub fn new(
        kind: NodeKind,
        row_id: i64,
        global_id: GlobalId,
        container: ContainerId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            row_id: RowId(row_id),
            global_id,
            type_key: None,
            container,
            name: name.into(),
        }
    }

    /// Set the sub-kind
    #[inline]
    #[must_use]
    pub fn with_type(mut self, type_key: TypeKey) -> Self {
        self.type_key = Some(type_key);
        self
    }

    /// `(kind, row_id)` identity
    #[inline]
    #[must_use]
    pub fn row_key(&self) -> RowKey {
        RowKey {
            kind: self.kind,
            row_id: self.row_id,
        }
    }
}

/// A stored derivation edge: `from` was used to produce `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier
    pub id: EdgeId,
    /// Input node
    pub from: ObjectId,
    /// Produced node
    pub to: ObjectId,
    /// Role label, already defaulted and truncated
    pub role: String,
    /// Disambiguates multiple same-named roles
    pub property_id: Option<i64>,
    /// Run whose protocol application produced this edge
    pub run: Option<ObjectId>,
    /// Object that asserted the edge
    pub source_id: Option<ObjectId>,
    /// Free-text key of the asserting process
    pub source_key: Option<String>,
}

/// Edge creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEdge {
    /// Input node
    pub from: ObjectId,
    /// Produced node
    pub to: ObjectId,
    /// Role label, defaulted from the input kind when unset
    pub role: Option<String>,
    /// Disambiguates multiple same-named roles
    pub property_id: Option<i64>,
    /// Originating run
    pub run: Option<ObjectId>,
    /// Object that asserted the edge
    pub source_id: Option<ObjectId>,
    /// Free-text key of the asserting process
    pub source_key: Option<String>,
}

impl NewEdge {
    /// Create an edge request with no annotations
    #[must_use]
    pub fn new(from: ObjectId, to: ObjectId) -> Self {
        Self {
            from,
            to,
            role: None,
            property_id: None,
            run: None,
            source_id: None,
            source_key: None,
        }
    }

    /// Set the role
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the property id
    #[inline]
    #[must_use]
    pub fn with_property(mut self, property_id: i64) -> Self {
        self.property_id = Some(property_id);
        self
    }

    /// Annotate with the originating run
    #[inline]
    #[must_use]
    pub fn via_run(mut self, run: ObjectId) -> Self {
        self.run = Some(run);
        self
    }

    /// Record who asserted the edge
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source_id: ObjectId, source_key: impl Into<String>) -> Self {
        self.source_id = Some(source_id);
        self.source_key = Some(source_key.into());
        self
    }
}

/// Edge selection used by edge queries and bulk removal
///
/// Every set field must match. A filter with no field set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    /// Input node
    pub from: Option<ObjectId>,
    /// Produced node
    pub to: Option<ObjectId>,
    /// Originating run
    pub run: Option<ObjectId>,
    /// Asserting object
    pub source_id: Option<ObjectId>,
    /// Asserting process key
    pub source_key: Option<String>,
}

impl EdgeFilter {
    /// Empty filter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on the input node
    #[must_use]
    pub fn from(mut self, id: ObjectId) -> Self {
        self.from = Some(id);
        self
    }

    /// Match on the produced node
    #[must_use]
    pub fn to(mut self, id: ObjectId) -> Self {
        self.to = Some(id);
        self
    }

    /// Match on the originating run
    #[must_use]
    pub fn run(mut self, id: ObjectId) -> Self {
        self.run = Some(id);
        self
    }

    /// Match on the asserting object
    #[must_use]
    pub fn source_id(mut self, id: ObjectId) -> Self {
        self.source_id = Some(id);
        self
    }

    /// Match on the asserting process key
    #[must_use]
    pub fn source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    /// Whether no criterion is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.from.is_none()
            && self.to.is_none()
            && self.run.is_none()
            && self.source_id.is_none()
            && self.source_key.is_none()
    }

    /// Whether `edge` satisfies every set criterion
    #[must_use]
    pub fn matches(&self, edge: &Edge) -> bool {
        !self.is_empty()
            && self.from.map_or(true, |id| edge.from == id)
            && self.to.map_or(true, |id| edge.to == id)
            && self.run.map_or(true, |id| edge.run == Some(id))
            && self.source_id.map_or(true, |id| edge.source_id == Some(id))
            && self
                .source_key
                .as_deref()
                .map_or(true, |key| edge.source_key.as_deref() == Some(key))
    }
}

/// Coarse change signal for all nodes of one type
///
/// Any insert, delete, or incoming-edge change among nodes of the type
/// changes at least one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Watermark {
    /// Number of nodes of the type
    pub count: usize,
    /// Highest row id among them
    pub max_row_id: Option<RowId>,
    /// Latest modification among them
    pub max_modified: CommitSeq,
}

/// Truncate a role label to at most `max_len` characters
#[must_use]
pub fn truncate_role(role: &str, max_len: usize) -> String {
    match role.char_indices().nth(max_len) {
        Some((idx, _)) => role[..idx].to_string(),
        None => role.to_string(),
    }
}
