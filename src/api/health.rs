//! Shared run state for the scheduler and the /health endpoint.
//! Written by the Scheduler, read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

/// STARTING → SYNCING ⇄ IDLE → STOPPED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Starting,
    Syncing,
    Idle,
    Stopped,
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SchedulerState::Syncing,
            2 => SchedulerState::Idle,
            3 => SchedulerState::Stopped,
            _ => SchedulerState::Starting,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SchedulerState::Starting => 0,
            SchedulerState::Syncing => 1,
            SchedulerState::Idle => 2,
            SchedulerState::Stopped => 3,
        }
    }
}

#[derive(Default)]
pub struct HealthState {
    state: AtomicU8,
    /// Set while a sync cycle runs; the overlap guard.
    cycle_in_flight: AtomicBool,
    /// Millisecond timestamp of the last finished cycle (0 = none).
    last_sync_at_ms: AtomicI64,
    last_sync_ok: AtomicBool,
    last_records_written: AtomicU64,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_skipped: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: SchedulerState,
    pub cycle_in_flight: bool,
    pub last_sync_at_ms: Option<i64>,
    pub last_sync_ok: Option<bool>,
    pub last_records_written: u64,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub ticks_skipped: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, s: SchedulerState) {
        self.state.store(s.as_u8(), Ordering::Relaxed);
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Claim the single cycle slot. False when a cycle is already running.
    pub fn try_begin_cycle(&self) -> bool {
        self.cycle_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_cycle(&self) {
        self.cycle_in_flight.store(false, Ordering::Release);
    }

    pub fn cycle_in_flight(&self) -> bool {
        self.cycle_in_flight.load(Ordering::Acquire)
    }

    pub fn record_success(&self, at_ms: i64, records_written: usize) {
        self.last_sync_at_ms.store(at_ms, Ordering::Relaxed);
        self.last_sync_ok.store(true, Ordering::Relaxed);
        self.last_records_written.store(records_written as u64, Ordering::Relaxed);
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, at_ms: i64) {
        self.last_sync_at_ms.store(at_ms, Ordering::Relaxed);
        self.last_sync_ok.store(false, Ordering::Relaxed);
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ticks_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_at = self.last_sync_at_ms.load(Ordering::Relaxed);
        let has_run = last_at != 0;
        HealthSnapshot {
            state: self.state(),
            cycle_in_flight: self.cycle_in_flight(),
            last_sync_at_ms: has_run.then_some(last_at),
            last_sync_ok: has_run.then(|| self.last_sync_ok.load(Ordering::Relaxed)),
            last_records_written: self.last_records_written.load(Ordering::Relaxed),
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Releases the cycle slot when dropped, so a panicking cycle cannot wedge the scheduler.
pub struct CycleGuard<'a> {
    health: &'a HealthState,
}

impl<'a> CycleGuard<'a> {
    pub fn acquire(health: &'a HealthState) -> Option<Self> {
        health.try_begin_cycle().then_some(Self { health })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.health.end_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_cycle_slot() {
        let health = HealthState::new();
        let guard = CycleGuard::acquire(&health).expect("first claim");
        assert!(CycleGuard::acquire(&health).is_none());
        drop(guard);
        assert!(CycleGuard::acquire(&health).is_some());
    }

    #[test]
    fn snapshot_reports_no_sync_before_first_cycle() {
        let health = HealthState::new();
        let snap = health.snapshot();
        assert_eq!(snap.state, SchedulerState::Starting);
        assert_eq!(snap.last_sync_at_ms, None);
        assert_eq!(snap.last_sync_ok, None);

        health.record_failure(42);
        let snap = health.snapshot();
        assert_eq!(snap.last_sync_ok, Some(false));
        assert_eq!(snap.cycles_failed, 1);
    }
}
