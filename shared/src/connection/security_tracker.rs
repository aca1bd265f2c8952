use log::warn;

use crate::connection::connection_config::SecurityConfig;

/// Counts peer-caused protocol violations and decides when a connection has
/// seen enough of them
pub struct SecurityTracker {
    config: SecurityConfig,
    events: u32,
    last_check: f64,
    sustained_periods: u32,
}

impl SecurityTracker {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            events: 0,
            last_check: 0.0,
            sustained_periods: 0,
        }
    }

    pub fn record_event(&mut self) {
        self.events += 1;
    }

    pub fn sustained_periods(&self) -> u32 {
        self.sustained_periods
    }

    /// Evaluates the window ending at `now`. Returns true when the
    /// connection must close.
    pub fn check(&mut self, now: f64) -> bool {
        let elapsed = now - self.last_check;
        if elapsed <= self.config.check_interval {
            return false;
        }

        let rate = f64::from(self.events) / elapsed;
        self.events = 0;
        self.last_check = now;

        if !self.config.enabled {
            return false;
        }

        if rate >= self.config.max_events_per_second {
            warn!("Security events at {:.1}/s exceed the maximum rate", rate);
            return true;
        }

        if rate >= self.config.sustained_events_per_second {
            self.sustained_periods += 1;
            if self.sustained_periods > self.config.max_sustained_periods {
                warn!(
                    "Security events above {:.1}/s for {} consecutive checks",
                    self.config.sustained_events_per_second, self.sustained_periods
                );
                return true;
            }
        } else {
            self.sustained_periods = 0;
        }

        false
    }
}
