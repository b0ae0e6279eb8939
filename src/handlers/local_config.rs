// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local configuration store backing the `config_get`/`config_set`
//! handlers (the stand-in for the original's UCI read/write module).
//!
//! Entries are addressed as `section.key -> value` and persisted as a
//! flat JSON file. The original's `uci_set` handler wrote a batch script
//! to a temp file but never executed or cleaned it up (§9); this rewrite
//! applies each tuple directly and persists, which is the behavior the
//! spec actually calls for.

use crate::error::DroneError;
use crate::frame::{DataBuilder, Frame};
use crate::handlers::HandlerContext;
use crate::registry::HandlerOutcome;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Flat `section.key -> value` store, persisted as JSON.
pub struct ConfigStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<(String, String), String>>,
}

impl ConfigStore {
    /// Load `path` if it exists, otherwise start from an empty store.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Map<String, Value>>(&bytes).ok())
            .map(Self::flatten)
            .unwrap_or_default();

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flatten(doc: Map<String, Value>) -> BTreeMap<(String, String), String> {
        let mut flat = BTreeMap::new();
        for (section, value) in doc {
            if let Value::Object(keys) = value {
                for (key, v) in keys {
                    if let Some(s) = v.as_str() {
                        flat.insert((section.clone(), key), s.to_string());
                    }
                }
            }
        }
        flat
    }

    fn unflatten(entries: &BTreeMap<(String, String), String>) -> Map<String, Value> {
        let mut doc = Map::new();
        for ((section, key), value) in entries {
            let section_map = doc
                .entry(section.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = section_map {
                map.insert(key.clone(), Value::String(value.clone()));
            }
        }
        doc
    }

    /// Fetch a single `section.key`.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    /// Fetch every key in `section`.
    #[must_use]
    pub fn get_section(&self, section: &str) -> Vec<(String, String)> {
        self.entries
            .lock()
            .iter()
            .filter(|((s, _), _)| s == section)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Apply `set section.key=value` for every tuple, then persist.
    pub fn apply_and_persist(
        &self,
        tuples: &[(String, String, String)],
    ) -> std::io::Result<()> {
        {
            let mut entries = self.entries.lock();
            for (section, key, value) in tuples {
                entries.insert((section.clone(), key.clone()), value.clone());
            }
        }
        self.persist()
    }

    fn persist(&self) -> std::io::Result<()> {
        let doc = Self::unflatten(&self.entries.lock());
        let bytes = serde_json::to_vec_pretty(&doc)?;
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, bytes)
    }
}

/// `config_get { section, key? }` — returns the matching entries.
pub fn handle_config_get(
    req: &Frame,
    out: &mut DataBuilder,
    ctx: &HandlerContext,
) -> Result<HandlerOutcome, DroneError> {
    let data = req
        .data
        .as_ref()
        .and_then(|d| d.as_object())
        .ok_or_else(|| DroneError::InvalidArgument("data must be a table".into()))?;

    let section = data
        .get("section")
        .and_then(Value::as_str)
        .ok_or_else(|| DroneError::InvalidArgument("missing 'section'".into()))?;

    if let Some(key) = data.get("key").and_then(Value::as_str) {
        match ctx.config.get(section, key) {
            Some(value) => {
                out.insert(key, value);
                Ok(HandlerOutcome::DataReply)
            }
            None => Err(DroneError::NotFound(format!("{section}.{key}"))),
        }
    } else {
        let entries = ctx.config.get_section(section);
        if entries.is_empty() {
            return Err(DroneError::NotFound(section.to_string()));
        }
        for (key, value) in entries {
            out.insert(key, value);
        }
        Ok(HandlerOutcome::DataReply)
    }
}

/// `config_set { section: { key: value, ... }, ... }` — applies every
/// tuple and persists, then reports plain status.
pub fn handle_config_set(
    req: &Frame,
    _out: &mut DataBuilder,
    ctx: &HandlerContext,
) -> Result<HandlerOutcome, DroneError> {
    let data = req
        .data
        .as_ref()
        .and_then(|d| d.as_object())
        .ok_or_else(|| DroneError::InvalidArgument("data must be a table".into()))?;

    let mut tuples = Vec::new();
    for (section, keys) in data {
        let Some(keys) = keys.as_object() else {
            continue;
        };
        for (key, value) in keys {
            let Some(value) = value.as_str() else {
                continue;
            };
            tuples.push((section.clone(), key.clone(), value.to_string()));
        }
    }

    if tuples.is_empty() {
        return Err(DroneError::InvalidArgument("no section.key=value tuples found".into()));
    }

    ctx.config
        .apply_and_persist(&tuples)
        .map_err(|e| DroneError::Io(e.to_string()))?;

    Ok(HandlerOutcome::Status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerContext;

    fn ctx_with_store() -> (tempfile::TempDir, HandlerContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let ctx = HandlerContext::new(ConfigStore::load(path));
        (dir, ctx)
    }

    fn frame(data: Value) -> Frame {
        Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "config_get".into(),
            data: Some(data),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, ctx) = ctx_with_store();
        let set_req = frame(serde_json::json!({"network": {"hostname": "drone01"}}));
        let mut out = DataBuilder::new();
        let outcome = handle_config_set(&set_req, &mut out, &ctx).unwrap();
        assert_eq!(outcome, HandlerOutcome::Status);

        let get_req = frame(serde_json::json!({"section": "network", "key": "hostname"}));
        let mut out = DataBuilder::new();
        let outcome = handle_config_get(&get_req, &mut out, &ctx).unwrap();
        assert_eq!(outcome, HandlerOutcome::DataReply);
        assert_eq!(out.into_value()["hostname"], "drone01");
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let (_dir, ctx) = ctx_with_store();
        let req = frame(serde_json::json!({"section": "network", "key": "hostname"}));
        let mut out = DataBuilder::new();
        let err = handle_config_get(&req, &mut out, &ctx).unwrap_err();
        assert_eq!(err.code(), libc::ENOENT as u32);
    }

    #[test]
    fn set_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let ctx = HandlerContext::new(ConfigStore::load(&path));
        let set_req = frame(serde_json::json!({"wifi": {"ssid": "lab-net"}}));
        let mut out = DataBuilder::new();
        handle_config_set(&set_req, &mut out, &ctx).unwrap();

        let reloaded = ConfigStore::load(&path);
        assert_eq!(reloaded.get("wifi", "ssid"), Some("lab-net".to_string()));
    }
}
