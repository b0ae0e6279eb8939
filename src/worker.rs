// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker supervisor for non-atomic handlers (§4.9).
//!
//! At most one worker runs at a time. It owns a private output builder and
//! never touches the socket or session state directly; it hands its
//! finished reply to a shared slot and signals completion over a bounded
//! channel. A generation counter lets the main loop hard-cancel: bumping
//! the generation before detaching the thread makes any later completion
//! signal for the old generation discardable, since a forked child can be
//! killed but a spawned thread cannot.

use crate::error::DroneError;
use crate::frame::{status_reply, DataBuilder, Frame};
use crate::handlers::HandlerContext;
use crate::registry::{HandlerFn, HandlerOutcome};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tags a completion signal with the generation it was started under.
pub struct Completion {
    pub generation: u64,
}

/// Shared across the main loop and the worker thread. Holds at most one
/// in-flight reply, written once by the worker and read once by the loop.
#[derive(Default)]
struct ReplySlot {
    frame: Mutex<Option<Frame>>,
}

pub struct WorkerSupervisor {
    generation: Arc<AtomicU64>,
    running: bool,
    reply_addr: Option<SocketAddr>,
    slot: Arc<ReplySlot>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSupervisor {
    #[must_use]
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = bounded(1);
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            running: false,
            reply_addr: None,
            slot: Arc::new(ReplySlot::default()),
            completion_tx,
            completion_rx,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Receiver the main loop polls alongside the socket and timer.
    #[must_use]
    pub fn completion_receiver(&self) -> &Receiver<Completion> {
        &self.completion_rx
    }

    /// Spawn `handler` on the worker thread for `request`. The dispatcher
    /// has already sent the interim `accept` reply by the time this runs.
    pub fn spawn(
        &mut self,
        request: Frame,
        reply_addr: SocketAddr,
        self_id: String,
        handler: Arc<HandlerFn>,
        ctx: HandlerContext,
    ) {
        debug_assert!(!self.running, "at most one worker may run at a time (§4.9)");

        let generation = self.generation.load(Ordering::SeqCst);
        self.running = true;
        self.reply_addr = Some(reply_addr);

        let slot = Arc::clone(&self.slot);
        let tx = self.completion_tx.clone();
        let my_generation = Arc::clone(&self.generation);

        std::thread::spawn(move || {
            let mut out = DataBuilder::new();
            let reply = match handler(&request, &mut out, &ctx) {
                Ok(HandlerOutcome::Status) => status_reply(&request, &self_id, 0, None, None),
                Ok(HandlerOutcome::DataReply) => {
                    crate::frame::data_reply(&request, &self_id, out)
                }
                Err(err) => status_reply(&request, &self_id, err.code(), Some(&err.errstr()), None),
            };

            // Gate the slot write itself, not just the completion signal:
            // a cancelled worker that finishes late must never clobber a
            // later worker's reply in the shared slot (§5).
            let mut guard = slot.frame.lock();
            if my_generation.load(Ordering::SeqCst) == generation {
                *guard = Some(reply);
                drop(guard);
                let _ = tx.try_send(Completion { generation });
            }
        });
    }

    /// Called when the completion channel signals readiness. Returns the
    /// `(reply, addr)` to transmit, or `None` if the completion belonged to
    /// a since-cancelled generation.
    pub fn take_completed(&mut self, completion: Completion) -> Option<(Frame, SocketAddr)> {
        let current = self.generation.load(Ordering::SeqCst);
        if completion.generation != current {
            return None;
        }

        self.running = false;
        let addr = self.reply_addr.take()?;
        let frame = self.slot.frame.lock().take()?;
        Some((frame, addr))
    }

    /// Hard-cancel: bump the generation so a late completion from the
    /// currently-running worker (if any) is discarded, and mark idle.
    /// Does not join the thread — it's left to run to completion and then
    /// silently discard its own result (§4.9, §5).
    pub fn cancel(&mut self) {
        if self.running {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.running = false;
            self.reply_addr = None;
            self.slot.frame.lock().take();
        }
    }

    pub fn handle_invalid_request(&self, request: &Frame, _err: DroneError) {
        tracing::debug!(seq = request.seq, "rejected while worker busy");
    }
}
