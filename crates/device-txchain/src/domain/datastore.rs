//! Store-model types staged into write transactions
//!
//! Converters turn device messages into `DataObject`s addressed by an
//! `InstancePath` inside one of the two logical datastores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-model object. Opaque to the manager.
pub type DataObject = serde_json::Value;

/// Logical datastore a mutation targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalDatastore {
    /// Intended state, written by applications
    Configuration,
    /// Observed state, written on behalf of the device (statistics, inventory)
    Operational,
}

impl fmt::Display for LogicalDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => f.write_str("config"),
            Self::Operational => f.write_str("operational"),
        }
    }
}

/// Hierarchical address of a data object, e.g. `nodes/openflow:1/table/0`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstancePath {
    segments: Vec<String>,
}

impl InstancePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Path of a device's inventory node
    pub fn node(device_id: &str) -> Self {
        Self::new(["nodes", device_id])
    }

    /// Extend the path by one segment
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` equals `other` or lies underneath it
    pub fn starts_with(&self, other: &InstancePath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// One staged change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    Put {
        store: LogicalDatastore,
        path: InstancePath,
        data: DataObject,
    },
    Delete {
        store: LogicalDatastore,
        path: InstancePath,
    },
}

impl Mutation {
    pub fn store(&self) -> LogicalDatastore {
        match self {
            Self::Put { store, .. } | Self::Delete { store, .. } => *store,
        }
    }

    pub fn path(&self) -> &InstancePath {
        match self {
            Self::Put { path, .. } | Self::Delete { path, .. } => path,
        }
    }
}
