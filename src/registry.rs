// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler registry: an ordered, append-only-then-read-only table mapping
//! command type strings to handler descriptors.
//!
//! The original registered modules via pre-main constructors; this
//! rewrite registers explicitly from `main` before the event loop starts
//! (§4.4, §9 "Modules as process-wide registries"), so startup order is
//! deterministic and the registry can be built and queried in tests
//! without touching global state.

use crate::error::DroneError;
use crate::frame::{DataBuilder, Frame};
use crate::handlers::HandlerContext;
use std::sync::Arc;

/// What a handler's return value means for the reply the dispatcher builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Reply is a bare `status { code: 0 }`.
    Status,
    /// Reply is a full data message; the handler populated `DataBuilder`.
    DataReply,
}

pub type HandlerFn =
    dyn Fn(&Frame, &mut DataBuilder, &HandlerContext) -> Result<HandlerOutcome, DroneError>
        + Send
        + Sync;

/// One registered command handler.
pub struct HandlerDescriptor {
    pub type_name: String,
    pub atomic: bool,
    pub handler: Arc<HandlerFn>,
}

/// Ordered, first-match handler table. Built once at startup via
/// [`HandlerRegistry::register`], then treated as read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerDescriptor>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `type_name`. Panics if `type_name` starts
    /// with `!` — those are reserved for the control plane and must never
    /// be registered by a handler module (§4.4).
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        atomic: bool,
        handler: impl Fn(&Frame, &mut DataBuilder, &HandlerContext) -> Result<HandlerOutcome, DroneError>
            + Send
            + Sync
            + 'static,
    ) {
        let type_name = type_name.into();
        assert!(
            !type_name.starts_with('!'),
            "handler type '{type_name}' collides with the reserved control-plane namespace"
        );
        self.handlers.push(HandlerDescriptor {
            type_name,
            atomic,
            handler: Arc::new(handler),
        });
    }

    /// Linear, first-match lookup by command type.
    #[must_use]
    pub fn lookup(&self, type_name: &str) -> Option<&HandlerDescriptor> {
        self.handlers.iter().find(|d| d.type_name == type_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
