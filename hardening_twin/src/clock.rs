//! Simulated shift clock.
//!
//! Each tick advances simulated time by a fixed step (1 s by default), so the
//! 5 Hz live loop runs five times faster than the shop floor.

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use hardening_common::consts::SIM_STEP_MS;
use hardening_common::telemetry::Shift;

/// Simulated time as an anchor instant plus accumulated offset.
#[derive(Debug, Clone)]
pub struct SimClock {
    anchor: NaiveDateTime,
    elapsed: TimeDelta,
    step: TimeDelta,
}

impl SimClock {
    /// Clock anchored at the current local time.
    pub fn new(step_ms: u64) -> Self {
        Self::starting_at(Local::now().naive_local(), step_ms)
    }

    /// Clock anchored at a fixed instant.
    pub fn starting_at(anchor: NaiveDateTime, step_ms: u64) -> Self {
        let step = i64::try_from(step_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .filter(|s| *s > TimeDelta::zero())
            .unwrap_or_else(default_step);
        Self {
            anchor,
            elapsed: TimeDelta::zero(),
            step,
        }
    }

    /// Advance by one step.
    #[inline]
    pub fn tick(&mut self) {
        self.elapsed += self.step;
    }

    /// Current simulated instant.
    pub fn now(&self) -> NaiveDateTime {
        self.anchor
            .checked_add_signed(self.elapsed)
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Simulated seconds since the anchor.
    pub fn elapsed_secs(&self) -> i64 {
        self.elapsed.num_seconds()
    }

    pub fn shift_info(&self) -> (Shift, &'static str) {
        let shift = Shift::from_hour(self.now().hour());
        (shift, shift.operator_id())
    }

    /// `Day N, HH:MM:SS`, N counting calendar days from the anchor, starting at 1.
    pub fn format(&self) -> String {
        let now = self.now();
        let day = (now.date() - self.anchor.date()).num_days() + 1;
        format!("Day {day}, {}", now.format("%H:%M:%S"))
    }

    /// Re-anchor to the current local time, back to day 1.
    pub fn reset(&mut self) {
        self.anchor = Local::now().naive_local();
        self.elapsed = TimeDelta::zero();
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(SIM_STEP_MS)
    }
}

fn default_step() -> TimeDelta {
    TimeDelta::seconds(1)
}
