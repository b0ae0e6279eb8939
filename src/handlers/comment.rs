// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `comment` — atomic handler that logs an operator-supplied string.
//! Mostly useful for probing liveness/sequencing from a controller
//! without exercising any other subsystem.

use crate::error::DroneError;
use crate::frame::{DataBuilder, Frame};
use crate::handlers::HandlerContext;
use crate::registry::HandlerOutcome;

pub fn handle_comment(
    req: &Frame,
    _out: &mut DataBuilder,
    _ctx: &HandlerContext,
) -> Result<HandlerOutcome, DroneError> {
    let text = req
        .data
        .as_ref()
        .and_then(|d| d.as_str())
        .ok_or_else(|| DroneError::InvalidArgument("data must be a string".into()))?;

    tracing::info!(comment = text, "comment");
    Ok(HandlerOutcome::Status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_string_payload() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "comment".into(),
            data: Some(serde_json::Value::String("hello drone".into())),
        };
        let mut out = DataBuilder::new();
        let ctx = HandlerContext::for_tests();
        assert_eq!(handle_comment(&req, &mut out, &ctx).unwrap(), HandlerOutcome::Status);
    }

    #[test]
    fn rejects_non_string_payload() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "comment".into(),
            data: Some(serde_json::json!({"not": "a string"})),
        };
        let mut out = DataBuilder::new();
        let ctx = HandlerContext::for_tests();
        let err = handle_comment(&req, &mut out, &ctx).unwrap_err();
        assert_eq!(err.code(), libc::EINVAL as u32);
    }
}
