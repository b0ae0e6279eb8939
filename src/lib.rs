// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Library surface for `udrone`'s control plane: the wire codec, session
//! state machine, handler registry and dispatch, and worker supervisor.
//! `main.rs` is a thin binary wiring this against a real multicast socket;
//! integration tests drive the same [`Dispatcher`] over a loopback pair.

pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod identity;
pub mod net;
pub mod registry;
pub mod session;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use frame::Frame;
pub use session::{Session, SessionState};
