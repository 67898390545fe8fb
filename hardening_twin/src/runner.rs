//! Paced tick loop and the control surface.
//!
//! The [`TickRunner`] owns the [`MachineController`] on a dedicated thread.
//! Control calls arrive as [`ControlCommand`]s and are applied between
//! ticks; the latest [`MachineStatus`] is published for readers. The machine
//! only advances while it is producing (not IDLE, not DOWN).

use hardening_common::telemetry::MachineStatus;
use parking_lot::RwLock;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::drift::{Direction, DriftParam, FaultSpec};
use crate::error::TwinError;
use crate::machine::{MachineController, ManualControl};

/// Request applied by the tick thread between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    StartCycle,
    Stop,
    Reset,
    Repair,
    /// `None` picks a drift parameter at random.
    InjectFault(Option<FaultSpec>),
    InjectDrift(DriftParam, Direction),
    SetManual(ManualControl),
    DisableManual,
}

/// Thread-safe control surface for whatever serves external requests.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: Sender<ControlCommand>,
    status: Arc<RwLock<MachineStatus>>,
    ambient_c: f64,
}

assert_impl_all!(ControlHandle: Send, Sync, Clone);

impl ControlHandle {
    fn send(&self, command: ControlCommand) -> Result<(), TwinError> {
        debug!(?command, "control command");
        self.tx.send(command).map_err(|_| TwinError::RunnerStopped)
    }

    pub fn start_cycle(&self) -> Result<(), TwinError> {
        self.send(ControlCommand::StartCycle)
    }

    pub fn stop(&self) -> Result<(), TwinError> {
        self.send(ControlCommand::Stop)
    }

    pub fn reset(&self) -> Result<(), TwinError> {
        self.send(ControlCommand::Reset)
    }

    pub fn repair(&self) -> Result<(), TwinError> {
        self.send(ControlCommand::Repair)
    }

    /// Unknown names are rejected here, before reaching the machine.
    pub fn inject_fault(&self, kind: Option<&str>) -> Result<(), TwinError> {
        let spec = kind.map(str::parse::<FaultSpec>).transpose()?;
        self.inject_fault_spec(spec)
    }

    pub fn inject_fault_spec(&self, spec: Option<FaultSpec>) -> Result<(), TwinError> {
        self.send(ControlCommand::InjectFault(spec))
    }

    pub fn inject_drift(&self, param: DriftParam, direction: Direction) -> Result<(), TwinError> {
        self.send(ControlCommand::InjectDrift(param, direction))
    }

    pub fn set_manual_control(
        &self,
        enabled: bool,
        temp_ceiling_c: f64,
        flow_target_lpm: f64,
    ) -> Result<(), TwinError> {
        if !enabled {
            return self.disable_manual_control();
        }
        let manual = ManualControl::validated(temp_ceiling_c, flow_target_lpm, self.ambient_c)?;
        self.send(ControlCommand::SetManual(manual))
    }

    pub fn disable_manual_control(&self) -> Result<(), TwinError> {
        self.send(ControlCommand::DisableManual)
    }

    /// Latest published status.
    pub fn status(&self) -> MachineStatus {
        self.status.read().clone()
    }
}

/// Tick loop statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Loop iterations.
    pub cycles: u64,
    /// Iterations that advanced the machine.
    pub ticks: u64,
    /// Finished records emitted.
    pub records: u64,
    /// Iterations that overran the period.
    pub overruns: u64,
    pub max_cycle_time_us: u64,
}

pub struct TickRunner {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<TickStats>>,
    control: ControlHandle,
}

impl TickRunner {
    /// Move `machine` onto a new tick thread paced at `period`.
    pub fn spawn(mut machine: MachineController, period: Duration) -> Result<Self, TwinError> {
        let (tx, rx) = mpsc::channel();
        let status = Arc::new(RwLock::new(machine.get_status()));
        let running = Arc::new(AtomicBool::new(true));
        let control = ControlHandle {
            tx,
            status: Arc::clone(&status),
            ambient_c: machine.ambient(),
        };

        let loop_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("twin-tick".to_string())
            .spawn(move || run_loop(machine, rx, status, loop_running, period))
            .map_err(|e| TwinError::RunnerThread(e.to_string()))?;

        info!("Tick runner started (period={}ms)", period.as_millis());
        Ok(Self {
            running,
            thread: Some(thread),
            control,
        })
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Stop the loop and join the thread.
    pub fn shutdown(mut self) -> Result<TickStats, TwinError> {
        self.running.store(false, Ordering::SeqCst);
        let thread = self
            .thread
            .take()
            .ok_or_else(|| TwinError::RunnerThread("already joined".to_string()))?;
        thread
            .join()
            .map_err(|_| TwinError::RunnerThread("tick thread panicked".to_string()))
    }
}

impl Drop for TickRunner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_loop(
    mut machine: MachineController,
    rx: Receiver<ControlCommand>,
    status: Arc<RwLock<MachineStatus>>,
    running: Arc<AtomicBool>,
    period: Duration,
) -> TickStats {
    let mut stats = TickStats::default();
    let period_us = period.as_micros() as u64;

    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        loop {
            match rx.try_recv() {
                Ok(command) => apply(&mut machine, command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if machine.state().is_producing() {
            if machine.tick().is_some() {
                stats.records += 1;
            }
            stats.ticks += 1;
        }
        *status.write() = machine.get_status();

        stats.cycles += 1;
        let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
        stats.max_cycle_time_us = stats.max_cycle_time_us.max(cycle_time_us);
        if cycle_time_us > period_us {
            stats.overruns += 1;
            if stats.overruns <= 10 || stats.overruns % 1000 == 0 {
                warn!(
                    "Tick overrun #{}: cycle took {}us (period {}us)",
                    stats.overruns, cycle_time_us, period_us
                );
            }
        }

        let elapsed = cycle_start.elapsed();
        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }

    info!(
        "Tick runner stopped after {} cycles ({} ticks, {} records, {} overruns)",
        stats.cycles, stats.ticks, stats.records, stats.overruns
    );
    stats
}

fn apply(machine: &mut MachineController, command: ControlCommand) {
    match command {
        ControlCommand::StartCycle => {
            machine.start_cycle();
        }
        ControlCommand::Stop => machine.stop(),
        ControlCommand::Reset => machine.reset(),
        ControlCommand::Repair => machine.repair(),
        ControlCommand::InjectFault(spec) => {
            machine.inject_fault_spec(spec);
        }
        ControlCommand::InjectDrift(param, direction) => {
            machine.inject_drift(param, direction);
        }
        ControlCommand::SetManual(manual) => {
            if let Err(e) =
                machine.set_manual_control(true, manual.temp_ceiling_c, manual.flow_target_lpm)
            {
                warn!("Manual control rejected: {}", e);
            }
        }
        ControlCommand::DisableManual => machine.disable_manual_control(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardening_common::config::TwinConfig;
    use hardening_common::telemetry::{EventStatus, ProcessState};

    fn runner() -> TickRunner {
        let mut config = TwinConfig::default();
        config.tick.seed = Some(21);
        TickRunner::spawn(MachineController::new(&config), Duration::from_millis(1)).unwrap()
    }

    fn wait_for(handle: &ControlHandle, pred: impl Fn(&MachineStatus) -> bool) -> MachineStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = handle.status();
            if pred(&status) {
                return status;
            }
            assert!(Instant::now() < deadline, "timed out in {:?}", status.state);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn idle_machine_does_not_tick() {
        let runner = runner();
        thread::sleep(Duration::from_millis(20));
        let stats = runner.shutdown().unwrap();
        assert!(stats.cycles > 0);
        assert_eq!(stats.ticks, 0);
    }

    #[test]
    fn start_produces_parts_until_stopped() {
        let runner = runner();
        let control = runner.control();
        control.start_cycle().unwrap();

        let status = wait_for(&control, |s| s.telemetry.ok_count >= 2);
        assert!(status.state.is_producing());

        control.stop().unwrap();
        let status = wait_for(&control, |s| s.state == ProcessState::Idle);
        assert!(status.telemetry.part_id.is_none());
        assert!(status.telemetry.ok_count >= 2);

        let stats = runner.shutdown().unwrap();
        assert!(stats.records >= 2);
    }

    #[test]
    fn unknown_fault_is_rejected_at_the_handle() {
        let runner = runner();
        assert!(matches!(
            runner.control().inject_fault(Some("meteor")),
            Err(TwinError::UnknownFaultKind(_))
        ));
        assert!(runner.control().inject_fault(Some("pressure")).is_ok());
        assert!(matches!(
            runner.control().set_manual_control(true, 0.0, 120.0),
            Err(TwinError::InvalidManualLimits(_))
        ));
    }

    #[test]
    fn breakdown_halts_ticking_until_repaired() {
        let runner = runner();
        let control = runner.control();
        control.inject_drift(DriftParam::Power, Direction::Up).unwrap();
        control.start_cycle().unwrap();

        let status = wait_for(&control, |s| s.state == ProcessState::Down);
        let downtime = status.telemetry.downtime.unwrap();
        assert!(downtime.reason.starts_with("Inverter Overcurrent"));
        let last = status.event_log.last().unwrap();
        assert_eq!(last.status, EventStatus::Down);

        control.repair().unwrap();
        let status = wait_for(&control, |s| s.state == ProcessState::Idle);
        assert!(status.telemetry.downtime.is_none());
        runner.shutdown().unwrap();
    }

    #[test]
    fn handle_fails_after_runner_is_gone() {
        let runner = runner();
        let control = runner.control();
        runner.shutdown().unwrap();
        assert!(matches!(control.start_cycle(), Err(TwinError::RunnerStopped)));
    }
}
