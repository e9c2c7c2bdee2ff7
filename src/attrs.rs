// src/attrs.rs

//! Feedstock node attributes
//!
//! These types mirror the payload the graph collaborator stores per feedstock.
//! The library only ever reads them; PR records are appended by the
//! PR-posting side after a migration returns its identity.

use crate::migrator::MigrationUid;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Branch every feedstock has, always migrated first
pub const DEFAULT_BRANCH: &str = "main";

/// Branch names that are treated as the default branch
pub const DEFAULT_BRANCH_ALIASES: &[&str] = &["main", "master"];

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// Accept `false`, `true`, a reason string or null; anything non-empty is set
fn de_truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(truthy(&value))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Accept any value; anything but a string decodes as `None`
fn de_lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => {
            debug!("ignoring non-string PR field: {}", other);
            None
        }
    })
}

/// Accept any value; an unrecognized state decodes as `Unknown`
fn de_lenient_state<'de, D>(deserializer: D) -> std::result::Result<Option<PrState>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(serde_json::from_value(other).unwrap_or(PrState::Unknown)),
    })
}

/// The four requirement sections of a recipe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub build: BTreeSet<String>,
    #[serde(default)]
    pub host: BTreeSet<String>,
    #[serde(default)]
    pub run: BTreeSet<String>,
    #[serde(default)]
    pub test: BTreeSet<String>,
}

impl Requirements {
    /// Union of all four sections
    pub fn all(&self) -> BTreeSet<&str> {
        self.build
            .iter()
            .chain(&self.host)
            .chain(&self.run)
            .chain(&self.test)
            .map(String::as_str)
            .collect()
    }

    /// Host and run requirements only
    pub fn host_and_run(&self) -> BTreeSet<&str> {
        self.host.iter().chain(&self.run).map(String::as_str).collect()
    }

    /// Whether any section mentions one of `names`
    pub fn intersects(&self, names: &BTreeSet<String>) -> bool {
        self.all().iter().any(|r| names.contains(*r))
    }
}

/// Whether a feedstock has been flagged as bad, and why
///
/// On the wire this is a boolean, a free-text reason, or an error mapping.
/// Decoding never fails: null and empty values are not bad, any other
/// non-string value is a bare flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "RawBad")]
pub enum BadStatus {
    #[default]
    NotBad,
    /// Flagged without a reason; never tolerated
    Flagged,
    /// Flagged with a reason that a job may tolerate
    Reason(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum RawBad {
    Flag(bool),
    Reason(String),
}

impl From<Value> for BadStatus {
    fn from(raw: Value) -> Self {
        match raw {
            Value::String(r) if r.is_empty() => BadStatus::NotBad,
            Value::String(r) => BadStatus::Reason(r),
            other if truthy(&other) => BadStatus::Flagged,
            _ => BadStatus::NotBad,
        }
    }
}

impl From<BadStatus> for RawBad {
    fn from(status: BadStatus) -> Self {
        match status {
            BadStatus::NotBad => RawBad::Flag(false),
            BadStatus::Flagged => RawBad::Flag(true),
            BadStatus::Reason(r) => RawBad::Reason(r),
        }
    }
}

/// Which bad-reasons a job tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadPolicy<'a> {
    /// Every free-text reason; only a bare flag blocks
    AnyReason,
    /// Reasons starting with one of these prefixes
    Prefixes(&'a [&'a str]),
}

impl BadStatus {
    /// Whether this status blocks a job applying `policy`
    pub fn blocks(&self, policy: BadPolicy<'_>) -> bool {
        match (self, policy) {
            (BadStatus::NotBad, _) => false,
            (BadStatus::Flagged, _) => true,
            (BadStatus::Reason(_), BadPolicy::AnyReason) => false,
            (BadStatus::Reason(reason), BadPolicy::Prefixes(prefixes)) => {
                !prefixes.iter().any(|prefix| reason.starts_with(prefix))
            }
        }
    }
}

/// Hosting state of a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
    #[serde(other)]
    Unknown,
}

/// The hosting sub-record of a PR record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedPr {
    #[serde(default, deserialize_with = "de_lenient_state")]
    pub state: Option<PrState>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, alias = "url", deserialize_with = "de_lenient_string")]
    pub html_url: Option<String>,
}

/// One previously attempted migration of a feedstock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrRecord {
    /// Canonical identity of the migration
    pub data: Value,
    /// Key ordering of `data`
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(rename = "PR", default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<HostedPr>,
}

impl PrRecord {
    /// Build the record the PR-posting side would append for `uid`
    pub fn from_uid(uid: &MigrationUid, pr: Option<HostedPr>) -> Self {
        let friendly = uid.to_json_friendly();
        Self {
            data: friendly.data,
            keys: friendly.keys,
            pr,
        }
    }

    /// Whether this record was produced for `uid`
    pub fn matches(&self, uid: &MigrationUid) -> bool {
        self.data == uid.to_value()
    }

    /// Whether the PR should be treated as still open
    ///
    /// A record without hosting data, or whose state is missing or
    /// unrecognized, counts as open so that gaps in the data halt propagation.
    pub fn is_open(&self) -> bool {
        match &self.pr {
            None => true,
            Some(pr) => !matches!(pr.state, Some(PrState::Closed | PrState::Merged)),
        }
    }

    /// Creation time of the hosted PR, if present and parseable
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.pr.as_ref()?.created_at.as_deref()?;
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            debug!("unparseable PR timestamp: {}", raw);
        }
        parsed
    }

    /// URL of the hosted PR, for logging
    pub fn url(&self) -> Option<&str> {
        self.pr.as_ref()?.html_url.as_deref()
    }
}

/// Parse an RFC 3339 timestamp, or a naive one taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// PR bookkeeping for a feedstock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrInfo {
    #[serde(default)]
    pub bad: BadStatus,
    /// Append-only list of attempted migrations
    #[serde(rename = "PRed", default)]
    pub pred: Vec<PrRecord>,
}

impl PrInfo {
    /// First record produced for `uid`
    pub fn find(&self, uid: &MigrationUid) -> Option<&PrRecord> {
        self.pred.iter().find(|record| record.matches(uid))
    }
}

/// Attributes of one feedstock node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttrs {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub feedstock_name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default, deserialize_with = "de_truthy")]
    pub archived: bool,
    #[serde(default, deserialize_with = "de_truthy")]
    pub parsing_error: bool,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub pr_info: PrInfo,
    /// Raw feedstock configuration (alternate branches, providers)
    #[serde(rename = "conda-forge.yml", default)]
    pub feedstock_config: Value,
    /// Build outputs produced by this feedstock
    #[serde(default)]
    pub outputs_names: BTreeSet<String>,
    /// Raw rendered recipe, used for noarch detection
    #[serde(default)]
    pub meta_yaml: Value,
    /// Per-platform requirement sections and anything else
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for NodeAttrs {
    fn default() -> Self {
        Self::new("")
    }
}

impl NodeAttrs {
    /// Create attributes for a feedstock whose package shares its name
    pub fn new(feedstock_name: &str) -> Self {
        Self {
            name: feedstock_name.to_string(),
            feedstock_name: feedstock_name.to_string(),
            branch: default_branch(),
            archived: false,
            parsing_error: false,
            requirements: Requirements::default(),
            pr_info: PrInfo::default(),
            feedstock_config: Value::Null,
            outputs_names: BTreeSet::new(),
            meta_yaml: Value::Null,
            extra: BTreeMap::new(),
        }
    }

    /// Requirement section for a platform, e.g. `linux_aarch64`
    ///
    /// Returns `None` when the section is absent or malformed.
    pub fn platform_requirements(&self, platform: &str) -> Option<Requirements> {
        let value = self.extra.get(&format!("{}_requirements", platform))?;
        match serde_json::from_value(value.clone()) {
            Ok(reqs) => Some(reqs),
            Err(e) => {
                debug!("{}: malformed {}_requirements: {}", self.name, platform, e);
                None
            }
        }
    }

    /// Raw alternate branch list from the feedstock config
    ///
    /// `Ok(vec![])` when none are configured; `Err` describes a malformed value.
    pub fn abi_migration_branches(&self) -> std::result::Result<Vec<String>, String> {
        let value = self
            .feedstock_config
            .get("bot")
            .and_then(|bot| bot.get("abi_migration_branches"));

        let items = match value {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => return Err(format!("expected a list, got {}", other)),
        };

        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(if *b { "True" } else { "False" }.to_string()),
                other => Err(format!("non-scalar branch entry {}", other)),
            })
            .collect()
    }

    /// Whether the recipe and every output are `noarch`
    pub fn all_noarch(&self) -> bool {
        let is_noarch = |section: &Value| {
            section
                .get("build")
                .and_then(|b| b.get("noarch"))
                .is_some_and(|n| !n.is_null() && n != &Value::Bool(false) && n != "")
        };

        if !is_noarch(&self.meta_yaml) {
            return false;
        }
        match self.meta_yaml.get("outputs").and_then(Value::as_array) {
            Some(outputs) => outputs.iter().all(is_noarch),
            None => true,
        }
    }
}
