//! Idle connection reaper.
//!
//! A recurring tick on the event loop closes connections that have received
//! nothing for longer than the idle timeout. Reaping is best-effort: a
//! connection missed by one sweep is caught by the next.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::server::engine::SessionId;
use crate::server::lifecycle::Connections;

/// Interval whose first tick fires one full `period` from now.
pub fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl Connections {
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Closes every connection idle for strictly longer than the timeout.
    ///
    /// Works from a snapshot of the engine's live sessions, so sessions that
    /// disappear while the sweep runs are simply skipped. Returns how many
    /// connections were closed.
    pub fn reap_idle(&mut self, now: Instant) -> usize {
        let snapshot: Vec<SessionId> = self.engine.sessions();
        let mut closed = 0;

        for session in snapshot {
            let Some(state) = self.state(session) else {
                continue;
            };
            if state.closing {
                continue;
            }
            let idle = state.idle_for(now);
            if idle <= self.idle_timeout {
                continue;
            }

            tracing::error!(
                peer = %state.peer,
                %session,
                idle_secs = idle.as_secs_f64(),
                "idle too long, closing"
            );
            self.close(session);
            closed += 1;
        }
        closed
    }
}
