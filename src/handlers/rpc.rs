// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `rpc` — atomic handler invoking a method on the agent's local RPC bus,
//! the stand-in for the original's `ubus` client (out of scope per §1;
//! specified only via the interface it exposes: `path`, `method`, an
//! optional `param` table, and an optional `timeout`).

use crate::error::DroneError;
use crate::frame::{DataBuilder, Frame};
use crate::handlers::HandlerContext;
use crate::registry::HandlerOutcome;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A single callable method on a local bus object.
pub type RpcMethod = Arc<dyn Fn(&Value) -> Result<Value, DroneError> + Send + Sync>;

/// In-process registry of objects exposed over the local RPC bus.
#[derive(Default, Clone)]
pub struct LocalBus {
    objects: HashMap<String, HashMap<String, RpcMethod>>,
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_method(
        &mut self,
        path: impl Into<String>,
        method: impl Into<String>,
        f: impl Fn(&Value) -> Result<Value, DroneError> + Send + Sync + 'static,
    ) {
        self.objects
            .entry(path.into())
            .or_default()
            .insert(method.into(), Arc::new(f));
    }

    fn invoke(&self, path: &str, method: &str, param: &Value) -> Result<Value, DroneError> {
        let object = self
            .objects
            .get(path)
            .ok_or_else(|| DroneError::NotFound(path.to_string()))?;
        let method_fn = object
            .get(method)
            .ok_or_else(|| DroneError::NotFound(format!("{path}/{method}")))?;
        method_fn(param)
    }
}

pub fn handle_rpc(
    req: &Frame,
    out: &mut DataBuilder,
    ctx: &HandlerContext,
) -> Result<HandlerOutcome, DroneError> {
    let data = req
        .data
        .as_ref()
        .and_then(|d| d.as_object())
        .ok_or_else(|| DroneError::InvalidArgument("data must be a table".into()))?;

    let path = data
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| DroneError::InvalidArgument("missing 'path'".into()))?;
    let method = data
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| DroneError::InvalidArgument("missing 'method'".into()))?;
    let param = data.get("param").cloned().unwrap_or(Value::Object(Map::new()));

    let result = ctx.bus.invoke(path, method, &param)?;

    match result {
        Value::Object(map) => {
            for (k, v) in map {
                out.insert(k, v);
            }
        }
        other => {
            out.insert("result", other);
        }
    }

    Ok(HandlerOutcome::DataReply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerContext;

    fn frame(data: Value) -> Frame {
        Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "rpc".into(),
            data: Some(data),
        }
    }

    #[test]
    fn invokes_registered_method() {
        let mut bus = LocalBus::new();
        bus.register_method("system", "board", |_param| {
            Ok(serde_json::json!({"model": "test-board"}))
        });
        let ctx = HandlerContext::with_bus(bus);

        let req = frame(serde_json::json!({"path": "system", "method": "board"}));
        let mut out = DataBuilder::new();
        let outcome = handle_rpc(&req, &mut out, &ctx).unwrap();
        assert_eq!(outcome, HandlerOutcome::DataReply);
        assert_eq!(out.into_value()["model"], "test-board");
    }

    #[test]
    fn missing_object_is_not_found() {
        let ctx = HandlerContext::for_tests();
        let req = frame(serde_json::json!({"path": "nope", "method": "x"}));
        let mut out = DataBuilder::new();
        let err = handle_rpc(&req, &mut out, &ctx).unwrap_err();
        assert_eq!(err.code(), libc::ENOENT as u32);
    }
}
