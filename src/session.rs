// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-drone session state machine: `Default ⇄ Assigned ⇄ Lost`, driven by
//! the liveness timer and the `!assign`/`!reset` control primitives (§4.5).

use std::time::{Duration, Instant};

pub const DEFAULT_GROUP: &str = "!all-default";
pub const LOST_GROUP: &str = "!all-lost";
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// The three states a session can be in. The group string itself also
/// identifies the state (`DEFAULT_GROUP`/`LOST_GROUP`/anything else), but
/// this enum makes transitions explicit and exhaustively matchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Default,
    Assigned,
    Lost,
}

/// Mutable per-drone session context, owned exclusively by the event-loop
/// thread (§5 — never touched by the worker thread).
pub struct Session {
    group: String,
    state: SessionState,
    assigned_seq: u32,
    deadline: Option<Instant>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            state: SessionState::Default,
            assigned_seq: 0,
            deadline: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn assigned_seq(&self) -> u32 {
        self.assigned_seq
    }

    /// `!assign { group, seq? }`. Rejects the default group name per §8's
    /// boundary behavior; any other transition is accepted unconditionally.
    pub fn assign(&mut self, group: &str, seq: Option<u32>, now: Instant) -> Result<(), ()> {
        if group.is_empty() || group == DEFAULT_GROUP {
            return Err(());
        }
        self.group = group.to_string();
        self.state = SessionState::Assigned;
        if let Some(seq) = seq {
            self.assigned_seq = seq;
        }
        self.arm_timer(now);
        Ok(())
    }

    /// `!reset`. Unconditional, idempotent transition to `Default`.
    pub fn reset(&mut self) {
        self.group = DEFAULT_GROUP.to_string();
        self.state = SessionState::Default;
        self.assigned_seq = 0;
        self.deadline = None;
    }

    /// Advances `assigned_seq` for a freshly accepted in-order command.
    pub fn advance(&mut self, seq: u32) {
        self.assigned_seq = seq;
    }

    /// Rearms the liveness timer; a no-op from `Default` (§4.6: timer only
    /// runs once an assignment exists).
    pub fn rearm_timer(&mut self, now: Instant) {
        if self.state != SessionState::Default {
            self.arm_timer(now);
        }
    }

    fn arm_timer(&mut self, now: Instant) {
        self.deadline = Some(now + LIVENESS_TIMEOUT);
    }

    /// Time until the timer should next be checked, for the poll timeout.
    #[must_use]
    pub fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// Applies a timer expiry if the deadline has passed. Returns `true` if
    /// a state transition occurred (the caller then hard-cancels any
    /// running worker, per §4.5/§5).
    pub fn expire_if_due(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }
        self.step_expiry(now)
    }

    /// Forces the same transition `expire_if_due` would make once the
    /// deadline passes, regardless of the deadline. Used when an
    /// out-of-sync command must push the session toward `Lost`/`Default`
    /// immediately (§4.6 "out-of-sync ... force timer-expiry transition").
    pub fn force_expire(&mut self, now: Instant) -> bool {
        self.step_expiry(now)
    }

    fn step_expiry(&mut self, now: Instant) -> bool {
        match self.state {
            SessionState::Assigned => {
                self.state = SessionState::Lost;
                self.group = LOST_GROUP.to_string();
                self.arm_timer(now);
                true
            }
            SessionState::Lost => {
                self.reset();
                true
            }
            SessionState::Default => false,
        }
    }

    /// Address filter (§4.6 step 2): exact match on unique ID or current
    /// group, never a prefix/truncated comparison.
    #[must_use]
    pub fn accepts_address(&self, to: &str, unique_id: &str) -> bool {
        to == unique_id || to == self.group
    }
}
