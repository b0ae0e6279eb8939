// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `system` — non-atomic handler that runs an external command and
//! captures its stdout.
//!
//! The original passed the raw `data` blob as the exec path, which never
//! worked (§9 open questions). This implementation builds `argv` from the
//! `cmd` array field (`argv[0]` is the executable, the rest are
//! arguments) and optionally pipes `stdin` lines to the child, which is
//! the behavior the original's field names (`cmd`, `stdin`) were clearly
//! meant to provide.

use crate::error::DroneError;
use crate::frame::{DataBuilder, Frame};
use crate::handlers::HandlerContext;
use crate::registry::HandlerOutcome;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Matches the original's `execl_redir_stdout` 30x1s poll loop.
const WAIT_POLLS: u32 = 30;
const WAIT_INTERVAL: Duration = Duration::from_secs(1);
/// Matches the original's `char buf[8193]` capture limit.
const MAX_STDOUT: usize = 8192;

pub fn handle_system(
    req: &Frame,
    out: &mut DataBuilder,
    _ctx: &HandlerContext,
) -> Result<HandlerOutcome, DroneError> {
    let data = req
        .data
        .as_ref()
        .and_then(|d| d.as_object())
        .ok_or_else(|| DroneError::InvalidArgument("data must be a table".into()))?;

    let argv: Vec<String> = data
        .get("cmd")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let Some((program, args)) = argv.split_first() else {
        return Err(DroneError::InvalidArgument("missing or empty 'cmd'".into()));
    };

    let stdin_lines: Vec<String> = data
        .get("stdin")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| DroneError::Io(e.to_string()))?;

    if !stdin_lines.is_empty() {
        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            for line in &stdin_lines {
                let _ = writeln!(stdin, "{line}");
            }
        }
    } else {
        // Drop stdin immediately so a child that reads to EOF doesn't hang.
        drop(child.stdin.take());
    }

    let mut exited = false;
    for _ in 0..WAIT_POLLS {
        match child.try_wait() {
            Ok(Some(_status)) => {
                exited = true;
                break;
            }
            Ok(None) => std::thread::sleep(WAIT_INTERVAL),
            Err(e) => return Err(DroneError::Io(e.to_string())),
        }
    }

    if !exited {
        let _ = child.kill();
        let _ = child.wait();
        return Err(DroneError::Io(format!("'{program}' timed out")));
    }

    let mut stdout = Vec::new();
    if let Some(mut pipe) = child.stdout.take() {
        use std::io::Read;
        let _ = pipe.take(MAX_STDOUT as u64).read_to_end(&mut stdout);
    }

    out.insert("stdout", String::from_utf8_lossy(&stdout).to_string());
    Ok(HandlerOutcome::DataReply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> HandlerContext {
        HandlerContext::for_tests()
    }

    #[test]
    fn captures_stdout_from_argv() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "system".into(),
            data: Some(serde_json::json!({"cmd": ["echo", "hi-from-drone"]})),
        };
        let mut out = DataBuilder::new();
        let outcome = handle_system(&req, &mut out, &ctx()).unwrap();
        assert_eq!(outcome, HandlerOutcome::DataReply);
        assert_eq!(out.into_value()["stdout"], "hi-from-drone\n");
    }

    #[test]
    fn rejects_missing_cmd() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "system".into(),
            data: Some(serde_json::json!({})),
        };
        let mut out = DataBuilder::new();
        let err = handle_system(&req, &mut out, &ctx()).unwrap_err();
        assert_eq!(err.code(), libc::EINVAL as u32);
    }

    #[test]
    fn reports_eio_for_unknown_binary() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "system".into(),
            data: Some(serde_json::json!({"cmd": ["udrone-no-such-binary-xyz"]})),
        };
        let mut out = DataBuilder::new();
        let err = handle_system(&req, &mut out, &ctx()).unwrap_err();
        assert_eq!(err.code(), libc::EIO as u32);
    }

    #[test]
    fn pipes_stdin_lines_to_child() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "system".into(),
            data: Some(serde_json::json!({"cmd": ["cat"], "stdin": ["line one", "line two"]})),
        };
        let mut out = DataBuilder::new();
        let outcome = handle_system(&req, &mut out, &ctx()).unwrap();
        assert_eq!(outcome, HandlerOutcome::DataReply);
        assert_eq!(out.into_value()["stdout"], "line one\nline two\n");
    }
}
