// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed error taxonomy for the drone agent.
//!
//! Every variant maps onto a POSIX-style positive integer carried in the
//! wire protocol's `status.data.code` field (see protocol §7).

use thiserror::Error;

/// Errors a command handler or the dispatcher itself can raise.
///
/// The numeric codes intentionally mirror the errno values the original
/// implementation returned, since controllers on the wire match on them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DroneError {
    #[error("operation not supported")]
    NotSupported,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("worker busy")]
    Busy,

    #[error("sequence out of sync")]
    OutOfSync,
}

impl DroneError {
    /// POSIX errno carried on the wire as `status.data.code`.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            DroneError::NotSupported => libc::ENOTSUP as u32,
            DroneError::InvalidArgument(_) => libc::EINVAL as u32,
            DroneError::NotFound(_) => libc::ENOENT as u32,
            DroneError::Io(_) => libc::EIO as u32,
            DroneError::Busy => libc::EBUSY as u32,
            DroneError::OutOfSync => libc::ESRCH as u32,
        }
    }

    /// Human-readable description for the wire's `errstr` field.
    #[must_use]
    pub fn errstr(&self) -> String {
        self.to_string()
    }

    /// Build a `DroneError` from a raw status code (used when a handler
    /// wants to report a specific errno without a descriptive variant).
    #[must_use]
    pub fn from_code(code: u32, detail: impl Into<String>) -> Self {
        match code as i32 {
            libc::EINVAL => DroneError::InvalidArgument(detail.into()),
            libc::ENOENT => DroneError::NotFound(detail.into()),
            libc::EIO => DroneError::Io(detail.into()),
            libc::EBUSY => DroneError::Busy,
            libc::ESRCH => DroneError::OutOfSync,
            _ => DroneError::NotSupported,
        }
    }
}

/// Fatal startup failures; logged and turned into a non-zero exit code.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to create socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("failed to join multicast group: {0}")]
    MulticastJoin(#[source] std::io::Error),

    #[error("failed to register with event loop: {0}")]
    Poll(#[source] std::io::Error),
}
