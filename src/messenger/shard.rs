//! Shard routing table.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{SdkError, SdkResult};

/// Endpoints of one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    #[serde(rename = "current", default)]
    pub is_current: bool,
    pub http: String,
    pub ws: String,
}

/// One element of the `getShardingStructure` result.
#[derive(Debug, Clone, Deserialize)]
struct ShardingStructureItem {
    #[serde(default)]
    current: bool,
    #[serde(rename = "shardID", deserialize_with = "shard_id_from_int_or_string")]
    shard_id: u32,
    #[serde(default)]
    http: String,
    #[serde(default)]
    ws: String,
}

fn shard_id_from_int_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid shard id {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid shard id '{}'", s))),
        other => Err(serde::de::Error::custom(format!("invalid shard id {}", other))),
    }
}

/// Shard id → endpoints. At most one entry is marked current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardingTable {
    entries: BTreeMap<u32, ShardEntry>,
}

impl ShardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from a `getShardingStructure` result.
    ///
    /// If the node marks more than one shard current, only the first keeps the flag.
    pub fn from_structure(result: &Value) -> SdkResult<Self> {
        let items: Vec<ShardingStructureItem> = serde_json::from_value(result.clone())
            .map_err(|e| SdkError::Malformed(format!("Invalid sharding structure: {}", e)))?;

        let mut table = Self::new();
        for item in items {
            table.insert(
                item.shard_id,
                ShardEntry {
                    is_current: item.current,
                    http: item.http,
                    ws: item.ws,
                },
            );
        }
        Ok(table)
    }

    /// Insert or replace a shard entry, keeping the single-current invariant.
    pub fn insert(&mut self, shard_id: u32, mut entry: ShardEntry) {
        if entry.is_current && self.entries.iter().any(|(id, e)| e.is_current && *id != shard_id) {
            tracing::warn!(shard_id, "Another shard is already current; clearing flag");
            entry.is_current = false;
        }
        self.entries.insert(shard_id, entry);
    }

    pub fn remove(&mut self, shard_id: u32) -> Option<ShardEntry> {
        self.entries.remove(&shard_id)
    }

    pub fn get(&self, shard_id: u32) -> Option<&ShardEntry> {
        self.entries.get(&shard_id)
    }

    pub fn shard_ids(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ShardEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shard flagged current, or the one serving `active_url`.
    pub fn current_for(&self, active_url: &str) -> Option<u32> {
        let active = normalize_url(active_url);
        self.entries
            .iter()
            .find(|(_, e)| {
                e.is_current || normalize_url(&e.http) == active || normalize_url(&e.ws) == active
            })
            .map(|(id, _)| *id)
    }
}

fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
