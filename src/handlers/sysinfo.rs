// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `sysinfo` — atomic handler reporting host uptime, load averages, and
//! memory/swap/process counters, via the same `sysinfo(2)` syscall the
//! original called directly.

use crate::error::DroneError;
use crate::frame::{DataBuilder, Frame};
use crate::handlers::HandlerContext;
use crate::registry::HandlerOutcome;

/// Linux load averages are fixed-point, scaled by `1 << SI_LOAD_SHIFT`.
const SI_LOAD_SHIFT: f64 = 65536.0;

pub fn handle_sysinfo(
    _req: &Frame,
    out: &mut DataBuilder,
    _ctx: &HandlerContext,
) -> Result<HandlerOutcome, DroneError> {
    // SAFETY: `info` is a correctly sized, zero-initialized `libc::sysinfo`
    // struct; the kernel only writes within its bounds.
    let info = unsafe {
        let mut info: libc::sysinfo = std::mem::zeroed();
        if libc::sysinfo(&mut info) != 0 {
            return Err(DroneError::Io(std::io::Error::last_os_error().to_string()));
        }
        info
    };

    out.insert("uptime", info.uptime as i64)
        .insert("load1", info.loads[0] as f64 / SI_LOAD_SHIFT)
        .insert("load5", info.loads[1] as f64 / SI_LOAD_SHIFT)
        .insert("load15", info.loads[2] as f64 / SI_LOAD_SHIFT)
        .insert("totalram", info.totalram as f64)
        .insert("freeram", info.freeram as f64)
        .insert("sharedram", info.sharedram as f64)
        .insert("bufferram", info.bufferram as f64)
        .insert("totalswap", info.totalswap as f64)
        .insert("freeswap", info.freeswap as f64)
        .insert("procs", info.procs as i64);

    Ok(HandlerOutcome::DataReply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_expected_fields() {
        let req = Frame {
            to: "g1".into(),
            from: "ctrl".into(),
            seq: 1,
            kind: "sysinfo".into(),
            data: None,
        };
        let mut out = DataBuilder::new();
        let ctx = HandlerContext::for_tests();
        let outcome = handle_sysinfo(&req, &mut out, &ctx).unwrap();
        assert_eq!(outcome, HandlerOutcome::DataReply);

        let value = out.into_value();
        for key in [
            "uptime",
            "load1",
            "load5",
            "load15",
            "totalram",
            "freeram",
            "sharedram",
            "bufferram",
            "totalswap",
            "freeswap",
            "procs",
        ] {
            assert!(value.get(key).is_some(), "missing field {key}");
        }
    }
}
