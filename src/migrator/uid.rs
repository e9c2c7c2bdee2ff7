// src/migrator/uid.rs

//! Migration identities
//!
//! A [`MigrationUid`] fingerprints "this migration, this version, this
//! branch" for a feedstock. Equality of two identities is equality of their
//! canonical (sorted-key) JSON, which is also how already-attempted
//! migrations are recognized in a feedstock's PR records.

use crate::attrs::DEFAULT_BRANCH_ALIASES;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The `name` stamp of an identity
///
/// Graph-aware jobs always stamp a name, which may be null for an unnamed
/// instance; plain jobs leave the field out entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NameStamp {
    #[default]
    Absent,
    Null,
    Named(String),
}

impl NameStamp {
    pub fn is_absent(&self) -> bool {
        matches!(self, NameStamp::Absent)
    }

    /// Stamp for a job instance that may or may not carry a name
    pub fn from_option(name: Option<&str>) -> Self {
        match name {
            Some(n) => NameStamp::Named(n.to_string()),
            None => NameStamp::Null,
        }
    }
}

impl Serialize for NameStamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NameStamp::Named(name) => serializer.serialize_str(name),
            _ => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for NameStamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(NameStamp::from_option(
            Option::<String>::deserialize(deserializer)?.as_deref(),
        ))
    }
}

/// Identity of one migration applied to one feedstock branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationUid {
    pub migrator_name: String,
    pub migrator_version: u32,
    #[serde(default)]
    pub bot_rerun: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrator_object_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "NameStamp::is_absent")]
    pub name: NameStamp,
}

/// The `{data, keys}` form stored in `pr_info.PRed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonFriendly {
    pub data: Value,
    pub keys: Vec<String>,
}

impl MigrationUid {
    pub fn new(migrator_name: &str, migrator_version: u32) -> Self {
        Self {
            migrator_name: migrator_name.to_string(),
            migrator_version,
            bot_rerun: false,
            migrator_object_version: None,
            branch: None,
            name: NameStamp::Absent,
        }
    }

    /// Record the object version; zero counts as unset
    pub fn with_object_version(mut self, version: Option<u32>) -> Self {
        self.migrator_object_version = version.filter(|v| *v != 0);
        self
    }

    /// Record the branch unless it is a default branch
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = if DEFAULT_BRANCH_ALIASES.contains(&branch) {
            None
        } else {
            Some(branch.to_string())
        };
        self
    }

    pub fn with_name(mut self, name: NameStamp) -> Self {
        self.name = name;
        self
    }

    /// JSON object with keys in sorted order
    pub fn to_value(&self) -> Value {
        let sorted: BTreeMap<String, Value> = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
    }

    /// Canonical JSON text; byte-identical for equal identities
    pub fn canonical_json(&self) -> String {
        self.to_value().to_string()
    }

    /// The `{data, keys}` form appended to a feedstock's PR records
    pub fn to_json_friendly(&self) -> JsonFriendly {
        let data = self.to_value();
        let mut keys: Vec<String> = data
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        JsonFriendly { data, keys }
    }
}
