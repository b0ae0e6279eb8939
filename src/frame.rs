// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec: encodes/decodes the self-describing structured message
//! carried in every datagram.
//!
//! A frame is a JSON object with mandatory `to`/`from`/`seq`/`type` fields
//! and an optional, type-dependent `data` field. Key and array order are
//! preserved end-to-end via `serde_json`'s `preserve_order` feature.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Largest datagram this agent will decode. Anything bigger is dropped
/// before it ever reaches `serde_json`.
pub const MAX_DGRAM: usize = 32 * 1024;

/// Smallest plausible frame. Shorter payloads are dropped unparsed.
pub const MIN_DGRAM: usize = 16;

/// A decoded (or about-to-be-encoded) wire frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub to: String,
    pub from: String,
    pub seq: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Why a datagram failed to decode. Every variant results in the datagram
/// being silently dropped (§4.1); this type exists purely so the dispatcher
/// can log a reason at DEBUG level.
#[derive(Debug)]
pub enum DecodeError {
    TooShort(usize),
    TooLong(usize),
    NotAnObject,
    Malformed(serde_json::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort(n) => write!(f, "datagram too short ({n} bytes)"),
            DecodeError::TooLong(n) => write!(f, "datagram too long ({n} bytes)"),
            DecodeError::NotAnObject => write!(f, "payload is not a JSON object"),
            DecodeError::Malformed(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

impl Frame {
    /// Decode a raw datagram payload into a `Frame`.
    ///
    /// Rejects anything shorter than [`MIN_DGRAM`], longer than
    /// [`MAX_DGRAM`], not starting with `{`, or that fails to deserialize
    /// into the mandatory `to`/`from`/`type` shape.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < MIN_DGRAM {
            return Err(DecodeError::TooShort(payload.len()));
        }
        if payload.len() > MAX_DGRAM {
            return Err(DecodeError::TooLong(payload.len()));
        }
        if payload[0] != b'{' {
            return Err(DecodeError::NotAnObject);
        }

        serde_json::from_slice(payload).map_err(DecodeError::Malformed)
    }

    /// Serialize this frame back to a JSON datagram payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        // Infallible: `Frame` only ever contains JSON-representable data.
        serde_json::to_vec(self).expect("frame always serializes")
    }

    /// Build a reply frame addressed back to the sender of `self`, per the
    /// `to/from/seq` reply-preparation contract in §4.1.
    #[must_use]
    pub fn reply(&self, self_id: &str, kind: impl Into<String>) -> Frame {
        Frame {
            to: self.from.clone(),
            from: self_id.to_string(),
            seq: self.seq,
            kind: kind.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn is_control(&self) -> bool {
        self.kind.starts_with('!')
    }
}

/// Order-preserving output accumulator passed into every handler.
///
/// Replaces the original implementation's ambient, process-wide blob
/// buffer: each dispatch gets its own private builder, so a handler's
/// writes can never leak into an unrelated reply.
#[derive(Debug, Default, Clone)]
pub struct DataBuilder {
    map: Map<String, Value>,
}

impl DataBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.map.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Build the `status` reply used by both control and command paths.
///
/// `code == 0` means success; any other value is a POSIX errno, and
/// `errstr` is attached describing it.
#[must_use]
pub fn status_reply(
    request: &Frame,
    self_id: &str,
    code: u32,
    errstr: Option<&str>,
    board: Option<&str>,
) -> Frame {
    let mut reply = request.reply(self_id, "status");
    let mut data = Map::new();
    if let Some(board) = board {
        data.insert("board".to_string(), Value::String(board.to_string()));
    }
    data.insert("code".to_string(), Value::from(code));
    if code != 0 {
        if let Some(errstr) = errstr {
            data.insert("errstr".to_string(), Value::String(errstr.to_string()));
        }
    }
    reply.data = Some(Value::Object(data));
    reply
}

/// Build the `accept` interim reply for a non-atomic command.
#[must_use]
pub fn accept_reply(request: &Frame, self_id: &str) -> Frame {
    request.reply(self_id, "accept")
}

/// Build a full data reply of the same type as the request, with the
/// handler's accumulated output as `data`.
#[must_use]
pub fn data_reply(request: &Frame, self_id: &str, data: DataBuilder) -> Frame {
    let mut reply = request.reply(self_id, request.kind.clone());
    reply.data = Some(data.into_value());
    reply
}
