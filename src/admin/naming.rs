// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Port and name allocation: the collision-resolution state machine every
//! device runs before it may call itself registered.

use crate::admin::timers::Timer;
use crate::error::{Error, Result};
use crate::property::{Message, MessageBuilder, Value};

/// The allocator's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingState {
    ProbingPort,
    ProbingName,
    Registered,
    Failed,
    Released,
}

/// Drives the `probing-port -> probing-name -> registered` handshake
/// described for the admin bus: broadcast intent, listen for a collision
/// during a quiet window, and either settle or bump the candidate and
/// retry, bounded by a retry budget.
pub struct Allocator {
    state: NamingState,
    identifier: String,
    candidate_port: u16,
    candidate_ordinal: u32,
    collisions_seen: u32,
    attempts: u32,
    max_attempts: u32,
    deadline: Timer,
    port_window_ms: u64,
    name_window_ms: u64,
}

impl Allocator {
    pub fn new(
        now_ms: u64,
        identifier: impl Into<String>,
        preferred_port: u16,
        port_window_ms: u64,
        name_window_ms: u64,
        max_attempts: u32,
    ) -> Self {
        Allocator {
            state: NamingState::ProbingPort,
            identifier: identifier.into(),
            candidate_port: preferred_port,
            candidate_ordinal: 1,
            collisions_seen: 0,
            attempts: 0,
            max_attempts,
            deadline: Timer::once(now_ms, port_window_ms),
            port_window_ms,
            name_window_ms,
        }
    }

    /// The quiet window for the allocator's current phase.
    fn current_window_ms(&self) -> u64 {
        match self.state {
            NamingState::ProbingPort => self.port_window_ms,
            _ => self.name_window_ms,
        }
    }

    pub fn state(&self) -> NamingState {
        self.state
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn candidate_port(&self) -> u16 {
        self.candidate_port
    }

    pub fn candidate_ordinal(&self) -> u32 {
        self.candidate_ordinal
    }

    /// The `<identifier>.<ordinal>` name once `state()` is `Registered`.
    pub fn ordinal_name(&self) -> String {
        format!("{}.{}", self.identifier, self.candidate_ordinal)
    }

    /// A peer claimed the same port (during `ProbingPort`) or the same
    /// `(identifier, ordinal)` (during `ProbingName`). Bumps the
    /// candidate and restarts the quiet window.
    pub fn observe_collision(&mut self, now_ms: u64) {
        if matches!(self.state, NamingState::Registered | NamingState::Failed) {
            return;
        }
        self.collisions_seen += 1;
        match self.state {
            NamingState::ProbingPort => self.candidate_port = self.candidate_port.wrapping_add(1).max(1024),
            NamingState::ProbingName => self.candidate_ordinal += 1,
            _ => {}
        }
        self.deadline = Timer::once(now_ms, self.current_window_ms());
    }

    /// Advance the state machine; call every `poll()`. Returns `true` if
    /// the state transitioned.
    pub fn tick(&mut self, now_ms: u64) -> Result<bool> {
        if !matches!(self.state, NamingState::ProbingPort | NamingState::ProbingName) {
            return Ok(false);
        }
        if !self.deadline.is_due(now_ms) {
            return Ok(false);
        }

        self.attempts += 1;
        if self.attempts > self.max_attempts {
            self.state = NamingState::Failed;
            return Err(Error::NamingFailed(format!(
                "exhausted {} attempts allocating {}",
                self.max_attempts, self.identifier
            )));
        }

        self.state = match self.state {
            NamingState::ProbingPort => NamingState::ProbingName,
            NamingState::ProbingName => NamingState::Registered,
            other => other,
        };
        self.deadline = Timer::once(now_ms, self.current_window_ms());
        Ok(true)
    }

    pub fn release(&mut self) {
        self.state = NamingState::Released;
    }
}

/// Build the `/name/registered <identifier> <ordinal>` claim broadcast the
/// instant a device settles on its ordinal, so that any peer still in
/// `ProbingName` with the same candidate observes the collision and bumps
/// before it would otherwise commit.
pub fn build_registered_announcement(identifier: &str, ordinal: u32) -> Message {
    MessageBuilder::new("/name/registered")
        .positional(Value::Str(identifier.to_string()))
        .positional(Value::I32(ordinal as i32))
        .build()
}
