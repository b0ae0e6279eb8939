// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in command handler modules.
//!
//! Each module is registered explicitly from `main` (§4.4); this is the
//! complete set of handlers a drone ships with, grounded in the
//! original's `cmd_*.c` modules (sysinfo/system/uci/ubus), with the
//! broken call sites corrected per §9.

pub mod comment;
pub mod local_config;
pub mod rpc;
pub mod system;
pub mod sysinfo;

use crate::registry::HandlerRegistry;
use local_config::ConfigStore;
use rpc::LocalBus;
use std::sync::Arc;

/// Shared state every handler gets a read-only borrow of. Kept separate
/// from `Dispatcher`/`SessionState` so handlers can never touch session
/// or socket state directly — only their own collaborators.
#[derive(Clone)]
pub struct HandlerContext {
    pub config: Arc<ConfigStore>,
    pub bus: Arc<LocalBus>,
}

impl HandlerContext {
    #[must_use]
    pub fn new(config: ConfigStore) -> Self {
        Self {
            config: Arc::new(config),
            bus: Arc::new(LocalBus::new()),
        }
    }

    #[must_use]
    pub fn with_bus(bus: LocalBus) -> Self {
        Self {
            config: Arc::new(ConfigStore::load(scratch_config_path())),
            bus: Arc::new(bus),
        }
    }

    /// A context backed by a throwaway config file and an empty bus, for
    /// handler unit tests that don't exercise config/rpc specifically.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            config: Arc::new(ConfigStore::load(scratch_config_path())),
            bus: Arc::new(LocalBus::new()),
        }
    }
}

/// A config path unique to this process and thread, so parallel tests
/// calling `for_tests()`/`with_bus()` never race on the same file.
fn scratch_config_path() -> std::path::PathBuf {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "udrone-test-config-{}-{:?}-{n}.json",
        std::process::id(),
        std::thread::current().id()
    ))
}

/// Register every built-in handler. Mirrors the original's module set:
/// `stdsys` (sysinfo, comment), `sys` (system), `uci` (config_get/set),
/// `ubus` (rpc). `readfile` is intentionally absent (§9: the original's
/// version was compiled out and never worked).
pub fn register_builtin_handlers(registry: &mut HandlerRegistry) {
    registry.register("sysinfo", true, sysinfo::handle_sysinfo);
    registry.register("comment", true, comment::handle_comment);
    registry.register("system", false, system::handle_system);
    registry.register("config_get", true, local_config::handle_config_get);
    registry.register("config_set", true, local_config::handle_config_set);
    registry.register("rpc", true, rpc::handle_rpc);
}
