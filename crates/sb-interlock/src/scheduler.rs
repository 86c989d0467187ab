//! Self-tuning signal update scheduler.
//!
//! Each tick updates signals round-robin until the time budget is spent.
//! After a full rotation the budget is re-derived from what the rotation
//! cost, moving at most `max_adjust_us` per rotation.

use std::time::Duration;

use sb_core::SignalId;
use sb_core::timing::{AccumulatingTimer, Timer};
use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::interlocking::Interlocking;

/// Round-robin position and budget.
#[derive(Debug)]
pub struct UpdateScheduler {
    config: SchedulerConfig,
    next_index: usize,
    target_us: u64,
    rotation: AccumulatingTimer,
    rotations: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub elapsed: Duration,
    /// The tick reached the end of the signal list.
    pub rotation_complete: bool,
    /// Budget for the next tick, in microseconds.
    pub target_us: u64,
}

impl UpdateScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            next_index: 0,
            target_us: config.initial_target_us.max(1),
            rotation: AccumulatingTimer::new(),
            rotations: 0,
        }
    }

    pub fn target_us(&self) -> u64 {
        self.target_us
    }

    /// Signal the next tick starts with.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Completed rotations.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub(crate) fn set_next_index(&mut self, index: usize) {
        self.next_index = index;
    }

    fn finish_rotation(&mut self) {
        let total_us = u64::try_from(self.rotation.total().as_micros()).unwrap_or(u64::MAX);
        let wanted = total_us / self.config.batch_divisor.max(1);
        let step = self.config.max_adjust_us;
        let target = if wanted > self.target_us {
            self.target_us.saturating_add(step).min(wanted)
        } else {
            self.target_us.saturating_sub(step).max(wanted)
        };
        self.target_us = target.max(1);
        self.rotations += 1;
        trace!(
            rotation_us = total_us,
            updates = self.rotation.count(),
            per_update_ns = u64::try_from(self.rotation.average().as_nanos()).unwrap_or(u64::MAX),
            target_us = self.target_us,
            "update rotation complete"
        );
        self.rotation.reset();
    }
}

impl Interlocking {
    /// Run one scheduler tick.
    ///
    /// With `pre_update` every signal is updated once, regardless of budget.
    pub fn tick(&mut self, pre_update: bool) -> TickReport {
        let count = self.signals.len();
        let timer = Timer::start("signal update");
        if pre_update {
            let mut updated = 0;
            for slot in 0..count {
                if !self.signals[slot].no_update {
                    self.update_signal(SignalId::from_usize(slot));
                    updated += 1;
                }
            }
            let elapsed = timer.stop();
            self.scheduler.set_next_index(0);
            debug!(
                signals = updated,
                elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                "full signal update"
            );
            return TickReport {
                updated,
                elapsed,
                rotation_complete: true,
                target_us: self.scheduler.target_us(),
            };
        }
        if count == 0 {
            return TickReport {
                updated: 0,
                elapsed: Duration::ZERO,
                rotation_complete: false,
                target_us: self.scheduler.target_us(),
            };
        }

        let budget = Duration::from_micros(self.scheduler.target_us());
        let interval = self.scheduler.config.check_interval.max(1);
        let mut index = self.scheduler.next_index().min(count);
        let mut updated = 0;
        let mut since_check = 0;
        let mut rotation_complete = false;
        loop {
            if index >= count {
                index = 0;
                rotation_complete = true;
                break;
            }
            if !self.signals[index].no_update {
                self.update_signal(SignalId::from_usize(index));
                updated += 1;
                since_check += 1;
            }
            index += 1;
            if since_check >= interval {
                since_check = 0;
                if timer.elapsed() >= budget {
                    break;
                }
            }
        }
        if index >= count {
            index = 0;
            rotation_complete = true;
        }

        let elapsed = timer.stop();
        self.scheduler.rotation.record(elapsed, updated as u64);
        self.scheduler.set_next_index(index);
        if rotation_complete {
            self.scheduler.finish_rotation();
        }
        TickReport {
            updated,
            elapsed,
            rotation_complete,
            target_us: self.scheduler.target_us(),
        }
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_moves_by_at_most_the_clamp() {
        let mut scheduler = UpdateScheduler::new(SchedulerConfig::default());
        scheduler.rotation.record(Duration::from_millis(100), 50);
        scheduler.finish_rotation();
        assert_eq!(scheduler.target_us(), 1_010);
        assert_eq!(scheduler.rotations(), 1);
        assert_eq!(scheduler.rotation.count(), 0);

        scheduler.rotation.record(Duration::from_micros(200), 50);
        scheduler.finish_rotation();
        assert_eq!(scheduler.target_us(), 1_000);
    }

    #[test]
    fn budget_settles_on_the_rotation_cost() {
        let config = SchedulerConfig {
            initial_target_us: 100,
            max_adjust_us: 1_000,
            ..SchedulerConfig::default()
        };
        let mut scheduler = UpdateScheduler::new(config);
        scheduler.rotation.record(Duration::from_micros(400), 10);
        scheduler.finish_rotation();
        assert_eq!(scheduler.target_us(), 20);
        scheduler.finish_rotation();
        assert_eq!(scheduler.target_us(), 1);
    }
}
