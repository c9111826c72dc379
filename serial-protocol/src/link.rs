use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::{Duration, Instant};

/// Minimum spacing of presence checks.
pub const LINK_CHECK_PERIOD: Duration = Duration::from_ticks(1000);

/// Physical serial endpoints of the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    /// Programming port (S1), used for diagnostics.
    Programming,
    /// Native port (S2), carrying the command protocol.
    Data,
}

/// A change in presence of one endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub endpoint: Endpoint,
    pub connected: bool,
}

/// Tracks presence of both serial endpoints, sampled at most once per [LINK_CHECK_PERIOD].
#[derive(Clone, Debug, Default)]
pub struct LinkMonitor {
    last_check: Option<Instant>,
    programming: bool,
    data: bool,
}

impl LinkMonitor {
    pub const fn new() -> Self {
        Self {
            last_check: None,
            programming: false,
            data: false,
        }
    }

    /// Whether the programming port was present at the last check.
    pub fn programming(&self) -> bool {
        self.programming
    }

    /// Whether the data port was present at the last check.
    pub fn data(&self) -> bool {
        self.data
    }

    /// Sample endpoint presence.
    ///
    /// # Args
    /// * `now` - Current time.
    /// * `programming` - Presence of the programming port.
    /// * `data` - Presence of the data port.
    ///
    /// # Returns
    /// The endpoints that connected or disconnected since the last check. Empty if the last
    /// check was less than [LINK_CHECK_PERIOD] ago.
    pub fn check(
        &mut self,
        now: Instant,
        programming: bool,
        data: bool,
    ) -> Vec<Transition, 2> {
        let mut transitions = Vec::new();

        if let Some(last) = self.last_check {
            match now.checked_duration_since(last) {
                Some(elapsed) if elapsed < LINK_CHECK_PERIOD => {
                    return transitions
                }
                _ => {}
            }
        }
        self.last_check = Some(now);

        for (endpoint, state, present) in [
            (Endpoint::Programming, &mut self.programming, programming),
            (Endpoint::Data, &mut self.data, data),
        ] {
            if *state != present {
                *state = present;
                log::info!(
                    "{endpoint:?} port {}",
                    if present { "connected" } else { "disconnected" }
                );
                // Two endpoints, two slots
                transitions
                    .push(Transition {
                        endpoint,
                        connected: present,
                    })
                    .ok();
            }
        }

        transitions
    }
}
