// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command-line surface, grounded in this project's other service
//! binaries: a `clap` derive struct plus a `--log-level` knob feeding
//! `tracing-subscriber`.

use clap::Parser;
use std::path::PathBuf;

/// udrone - multicast-controlled remote agent
#[derive(Parser, Debug)]
#[command(name = "udrone")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Network interface to join the control multicast group on.
    pub interface: String,

    /// Board tag reported in `!whois` replies; lets a controller filter
    /// drones by device class.
    #[arg(default_value = "generic")]
    pub board: String,

    /// Path to the local configuration store (JSON), backing
    /// `config_get`/`config_set`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Resolve the config file path, defaulting to a path beside the
    /// binary's working directory when unset.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from("udrone-config.json"))
    }
}
