//! Process state machine for the hardening line.
//!
//! ```text
//!            start_cycle
//!   IDLE ───────────────▶ LOADING ──▶ HEATING ──(T ≥ target)──▶ QUENCH
//!    ▲                      ▲            │                        │
//!    │ repair               │            │ DOWN verdict           │ T ≤ exit
//!    │                      │            ▼                        ▼
//!   DOWN ◀──────────────────┼──────── (any) ◀───── DOWN ──── UNLOADING
//!                           └────────── cycle accounting ─────────┘
//! ```
//!
//! LOADING and UNLOADING are resolved within the tick they are entered.
//! The controller emits one finished record per completed part and one per
//! breakdown; the record is returned from [`MachineController::tick`] and,
//! with a bridge attached, handed to it.

use hardening_common::config::{ProcessConfig, TwinConfig};
use hardening_common::consts::EVENT_LOG_CAPACITY;
use hardening_common::telemetry::{
    Downtime, EventLogEntry, EventStatus, MachineStatus, ProcessState, TelemetrySnapshot,
    TelemetryState,
};
use heapless::Deque;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, error, info, trace, warn};

use crate::bridge::BridgeProducer;
use crate::clock::SimClock;
use crate::drift::{Direction, DriftInjector, DriftParam, DriftState, FaultSpec};
use crate::error::TwinError;
use crate::physics::ThermalModel;
use crate::rules::RuleEngine;

/// Operator override of the heating ceiling and quench flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualControl {
    /// Heating ends here and the part is held at or below it [°C].
    pub temp_ceiling_c: f64,
    pub flow_target_lpm: f64,
}

impl ManualControl {
    /// Check the limits against the part's ambient floor.
    pub fn validated(
        temp_ceiling_c: f64,
        flow_target_lpm: f64,
        ambient_c: f64,
    ) -> Result<Self, TwinError> {
        if !temp_ceiling_c.is_finite() || temp_ceiling_c <= ambient_c {
            return Err(TwinError::InvalidManualLimits(format!(
                "temperature ceiling {temp_ceiling_c} must be above ambient {ambient_c}"
            )));
        }
        if !flow_target_lpm.is_finite() || flow_target_lpm < 0.0 {
            return Err(TwinError::InvalidManualLimits(format!(
                "flow target {flow_target_lpm} cannot be negative"
            )));
        }
        Ok(Self {
            temp_ceiling_c,
            flow_target_lpm,
        })
    }
}

/// Process readings fed to the thermal model and reported in telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Readings {
    power_kw: f64,
    flow_lpm: f64,
    pressure_bar: f64,
    scan_speed_mm_s: f64,
    tempering_speed_mm_s: f64,
    quench_water_temp_c: f64,
}

pub struct MachineController {
    process: ProcessConfig,
    clock: SimClock,
    thermal: ThermalModel,
    rules: RuleEngine,
    drift: DriftInjector,
    rng: StdRng,

    state: ProcessState,
    state_ticks: u32,
    inputs: Readings,
    peaks: Readings,
    peak_part_temp_c: f64,

    part_id: Option<String>,
    coil_life: u32,
    ok_count: u64,
    ng_count: u64,
    /// Set only while DOWN.
    downtime: Option<Downtime>,
    event_log: Deque<EventLogEntry, EVENT_LOG_CAPACITY>,
    manual: Option<ManualControl>,
    bridge: Option<BridgeProducer>,
}

impl MachineController {
    /// Controller in IDLE with the clock anchored at the current local time.
    ///
    /// The RNG is seeded from `tick.seed` when set, otherwise from entropy.
    pub fn new(config: &TwinConfig) -> Self {
        let rng = match config.tick.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let nominal_water = config.process.quench_water_temp_c;
        Self {
            process: config.process.clone(),
            clock: SimClock::new(config.tick.sim_step_ms),
            thermal: ThermalModel::new(config.thermal),
            rules: RuleEngine::new(config.rules.clone()),
            drift: DriftInjector::new(config.drift),
            rng,
            state: ProcessState::Idle,
            state_ticks: 0,
            inputs: Readings::default(),
            peaks: idle_peaks(nominal_water),
            peak_part_temp_c: 0.0,
            part_id: None,
            coil_life: config.rules.coil_life_max,
            ok_count: 0,
            ng_count: 0,
            downtime: None,
            event_log: Deque::new(),
            manual: None,
            bridge: None,
        }
    }

    /// Replace the clock (fixed anchor for reproducible runs).
    pub fn with_clock(mut self, clock: SimClock) -> Self {
        self.clock = clock;
        self
    }

    /// Hand every emitted record to `producer`.
    pub fn attach_bridge(&mut self, producer: BridgeProducer) {
        self.bridge = Some(producer);
    }

    // ─── Control surface ───────────────────────────────────────────

    /// IDLE → LOADING with a fresh part. Returns whether a cycle was started.
    pub fn start_cycle(&mut self) -> bool {
        match self.state {
            ProcessState::Idle => {
                let part = self.new_part_id();
                info!(part_id = %part, "starting production");
                self.part_id = Some(part);
                self.transition(ProcessState::Loading);
                true
            }
            ProcessState::Down => {
                warn!("start rejected: machine is DOWN, repair first");
                false
            }
            _ => false,
        }
    }

    /// Force IDLE from any state, DOWN included. Counters and coil life are
    /// kept; the part, drift, downtime and physics are discarded.
    pub fn stop(&mut self) {
        info!(state = %self.state, "stop requested");
        self.drift.clear();
        self.thermal.reset();
        self.inputs = Readings::default();
        self.peaks = idle_peaks(self.process.quench_water_temp_c);
        self.peak_part_temp_c = 0.0;
        self.part_id = None;
        self.downtime = None;
        self.transition(ProcessState::Idle);
    }

    /// Back to a freshly constructed machine: counters, coil life, clock,
    /// rule streak and event log all cleared. Manual mode is kept.
    pub fn reset(&mut self) {
        self.stop();
        self.clock.reset();
        self.rules.reset();
        self.coil_life = self.rules.config().coil_life_max;
        self.ok_count = 0;
        self.ng_count = 0;
        self.event_log.clear();
        info!("machine reset: counters, coil life and event log cleared");
    }

    /// Clear drift and the NG streak; DOWN → IDLE.
    pub fn repair(&mut self) {
        self.drift.clear();
        self.rules.reset();
        if self.state == ProcessState::Down {
            self.downtime = None;
            self.transition(ProcessState::Idle);
            info!("machine repaired, now IDLE");
        } else {
            debug!(state = %self.state, "repair applied, drift cleared");
        }
    }

    /// Start a drift fault. `kind` is a drift parameter or a named failure;
    /// `None` picks a parameter at random.
    pub fn inject_fault(&mut self, kind: Option<&str>) -> Result<DriftState, TwinError> {
        let spec = kind.map(str::parse::<FaultSpec>).transpose()?;
        Ok(self.inject_fault_spec(spec))
    }

    /// [`Self::inject_fault`] with the name already parsed.
    pub fn inject_fault_spec(&mut self, spec: Option<FaultSpec>) -> DriftState {
        let spec = spec.unwrap_or_else(|| FaultSpec {
            param: DriftInjector::pick_random(&mut self.rng),
            direction: None,
        });
        match spec.direction {
            Some(direction) => self.drift.start_with(spec.param, direction),
            None => self.drift.start(spec.param, &mut self.rng),
        }
    }

    /// Start a drift with a fixed direction.
    pub fn inject_drift(&mut self, param: DriftParam, direction: Direction) -> DriftState {
        self.drift.start_with(param, direction)
    }

    pub fn set_manual_control(
        &mut self,
        enabled: bool,
        temp_ceiling_c: f64,
        flow_target_lpm: f64,
    ) -> Result<(), TwinError> {
        if !enabled {
            self.disable_manual_control();
            return Ok(());
        }
        let manual =
            ManualControl::validated(temp_ceiling_c, flow_target_lpm, self.thermal.ambient())?;
        self.manual = Some(manual);
        info!(temp_ceiling_c, flow_target_lpm, "manual control enabled");
        Ok(())
    }

    pub fn disable_manual_control(&mut self) {
        if self.manual.take().is_some() {
            info!("manual control disabled");
        }
    }

    /// State, fresh live snapshot and the event log, oldest first.
    pub fn get_status(&mut self) -> MachineStatus {
        MachineStatus {
            state: self.state,
            telemetry: self.live_snapshot(),
            event_log: self.event_log.iter().cloned().collect(),
        }
    }

    // ─── Accessors ─────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[inline]
    pub fn state_ticks(&self) -> u32 {
        self.state_ticks
    }

    pub fn ok_count(&self) -> u64 {
        self.ok_count
    }

    pub fn ng_count(&self) -> u64 {
        self.ng_count
    }

    /// Installed coil life, before any coil-wear drift.
    pub fn coil_life(&self) -> u32 {
        self.coil_life
    }

    pub fn part_temp(&self) -> f64 {
        self.thermal.temperature()
    }

    /// Ambient floor of the thermal model.
    pub fn ambient(&self) -> f64 {
        self.thermal.ambient()
    }

    pub fn drift_state(&self) -> DriftState {
        self.drift.state()
    }

    pub fn part_id(&self) -> Option<&str> {
        self.part_id.as_deref()
    }

    pub fn downtime(&self) -> Option<&Downtime> {
        self.downtime.as_ref()
    }

    pub fn manual_control(&self) -> Option<ManualControl> {
        self.manual
    }

    pub fn consecutive_ng(&self) -> u32 {
        self.rules.consecutive_ng()
    }

    pub fn event_log(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.event_log.iter()
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    // ─── Tick ──────────────────────────────────────────────────────

    /// Advance the machine by one tick.
    ///
    /// Returns the finished record emitted during this tick (completed part
    /// or breakdown), if any.
    pub fn tick(&mut self) -> Option<TelemetrySnapshot> {
        self.clock.tick();
        self.state_ticks = self.state_ticks.saturating_add(1);

        if self.state.is_active() && self.part_id.is_none() {
            let part = self.new_part_id();
            warn!(state = %self.state, part_id = %part, "running without a part id, regenerated");
            self.part_id = Some(part);
        }

        self.inputs = self.raw_inputs();
        self.drift.advance();
        self.apply_drift();
        // Quench water stays off while heating, whatever the flow drift says.
        if self.state == ProcessState::Heating {
            self.inputs.flow_lpm = 0.0;
        }
        self.track_input_peaks();

        let Readings {
            power_kw, flow_lpm, ..
        } = self.inputs;
        self.thermal.update(power_kw, flow_lpm, &mut self.rng);
        if let Some(manual) = self.manual {
            self.thermal.clamp_to(manual.temp_ceiling_c);
        }
        if self.state == ProcessState::Heating {
            self.peak_part_temp_c = self.peak_part_temp_c.max(self.thermal.temperature());
        }
        trace!(
            state = %self.state,
            ticks = self.state_ticks,
            temp = self.thermal.temperature(),
            power_kw,
            flow_lpm,
            "tick"
        );

        if self.state.is_active() {
            let live = self.live_snapshot();
            let outcome = self.rules.evaluate(&live, false, &mut self.rng);
            if let Some(downtime) = outcome.downtime() {
                return Some(self.enter_down(downtime));
            }
        }

        self.advance_state()
    }

    fn advance_state(&mut self) -> Option<TelemetrySnapshot> {
        let watchdog = self.process.watchdog_ticks;
        loop {
            match self.state {
                ProcessState::Loading => self.transition(ProcessState::Heating),
                ProcessState::Heating => {
                    if self.thermal.temperature() >= self.heating_target() {
                        self.transition(ProcessState::Quench);
                    } else if self.state_ticks > watchdog {
                        self.watchdog_timeout();
                        self.transition(ProcessState::Quench);
                    }
                    return None;
                }
                ProcessState::Quench => {
                    if self.thermal.temperature() <= self.process.quench_exit_c {
                        self.transition(ProcessState::Unloading);
                    } else if self.state_ticks > watchdog {
                        self.watchdog_timeout();
                        self.transition(ProcessState::Unloading);
                    } else {
                        return None;
                    }
                }
                ProcessState::Unloading => return self.complete_cycle(),
                ProcessState::Idle | ProcessState::Down => return None,
            }
        }
    }

    /// Cycle accounting for the part leaving the coil.
    fn complete_cycle(&mut self) -> Option<TelemetrySnapshot> {
        let check = self.peak_record(TelemetryState::Completed);
        let outcome = self.rules.evaluate(&check, true, &mut self.rng);
        if let Some(downtime) = outcome.downtime() {
            return Some(self.enter_down(downtime));
        }

        let ng_reason = outcome.ng_reason();
        match &ng_reason {
            Some(reason) => {
                self.ng_count += 1;
                warn!(part_id = ?self.part_id, %reason, "NG part produced");
                self.push_event(EventStatus::Ng, reason.clone());
            }
            None => self.ok_count += 1,
        }
        self.coil_life = self.next_coil_life();

        let status = if ng_reason.is_some() { "NG" } else { "OK" };
        let mut record = self.peak_record(TelemetryState::Completed);
        record.ng_reason = ng_reason;
        info!(
            part_id = ?record.part_id,
            status,
            peak_temp = record.peak_part_temp_c,
            ok = self.ok_count,
            ng = self.ng_count,
            "cycle finished"
        );

        self.part_id = Some(self.new_part_id());
        self.transition(ProcessState::Loading);
        self.transition(ProcessState::Heating);
        Some(self.emit(record))
    }

    fn enter_down(&mut self, downtime: Downtime) -> TelemetrySnapshot {
        error!(
            code = %downtime.code,
            reason = %downtime.reason,
            repair_ticks = downtime.repair_ticks,
            part_id = ?self.part_id,
            "machine DOWN"
        );
        self.ng_count += 1;
        self.push_event(EventStatus::Down, downtime.reason.clone());
        self.transition(ProcessState::Down);

        let mut record = self.peak_record(TelemetryState::Down);
        record.downtime = Some(downtime.clone());
        self.downtime = Some(downtime);
        self.emit(record)
    }

    fn transition(&mut self, next: ProcessState) {
        debug!(from = %self.state, to = %next, "transition");
        self.state = next;
        self.state_ticks = 0;
        if next == ProcessState::Loading {
            self.peaks = idle_peaks(self.process.quench_water_temp_c);
            self.peak_part_temp_c = 0.0;
            self.thermal.reset();
        }
    }

    fn watchdog_timeout(&self) {
        if self.manual.is_some() {
            info!(state = %self.state, ticks = self.state_ticks, "manual limit timeout, forcing transition");
        } else {
            warn!(state = %self.state, ticks = self.state_ticks, "watchdog timeout, forcing transition");
        }
    }

    fn heating_target(&self) -> f64 {
        self.manual
            .map_or(self.process.heating_target_c, |m| m.temp_ceiling_c)
    }

    fn raw_inputs(&mut self) -> Readings {
        let p = &self.process;
        let water = p.quench_water_temp_c;
        match self.state {
            ProcessState::Heating => Readings {
                power_kw: p.heating_power_kw,
                scan_speed_mm_s: p.heating_scan_speed_mm_s,
                quench_water_temp_c: water,
                ..Readings::default()
            },
            ProcessState::Quench => {
                let target = self
                    .manual
                    .map_or(p.quench_flow_lpm, |m| m.flow_target_lpm);
                let jitter = p.quench_flow_jitter_lpm;
                let flow = self.rng.gen_range(target - jitter..=target + jitter);
                let pressure = self
                    .rng
                    .gen_range(p.quench_pressure_min_bar..=p.quench_pressure_max_bar);
                Readings {
                    power_kw: 0.0,
                    flow_lpm: flow.max(0.0),
                    pressure_bar: pressure,
                    scan_speed_mm_s: p.quench_scan_speed_mm_s,
                    tempering_speed_mm_s: p.quench_tempering_speed_mm_s,
                    quench_water_temp_c: water,
                }
            }
            _ => Readings {
                quench_water_temp_c: water,
                ..Readings::default()
            },
        }
    }

    fn apply_drift(&mut self) {
        let max = self.rules.config().coil_life_max;
        let d = &self.drift;
        let i = &mut self.inputs;
        i.pressure_bar = d.apply(DriftParam::Pressure, i.pressure_bar, max);
        i.flow_lpm = d.apply(DriftParam::Flow, i.flow_lpm, max);
        i.power_kw = d.apply(DriftParam::Power, i.power_kw, max);
        i.scan_speed_mm_s = d.apply(DriftParam::ScanSpeed, i.scan_speed_mm_s, max);
        i.quench_water_temp_c = d.apply(DriftParam::QuenchWaterTemp, i.quench_water_temp_c, max);
    }

    fn track_input_peaks(&mut self) {
        let i = self.inputs;
        let peaks = &mut self.peaks;
        match self.state {
            ProcessState::Heating => {
                peaks.power_kw = peaks.power_kw.max(i.power_kw);
                peaks.scan_speed_mm_s = peaks.scan_speed_mm_s.max(i.scan_speed_mm_s);
            }
            ProcessState::Quench => {
                peaks.flow_lpm = peaks.flow_lpm.max(i.flow_lpm);
                peaks.pressure_bar = peaks.pressure_bar.max(i.pressure_bar);
                peaks.tempering_speed_mm_s = peaks.tempering_speed_mm_s.max(i.tempering_speed_mm_s);
                let nominal = self.process.quench_water_temp_c;
                if (i.quench_water_temp_c - nominal).abs()
                    > (peaks.quench_water_temp_c - nominal).abs()
                {
                    peaks.quench_water_temp_c = i.quench_water_temp_c;
                }
            }
            _ => {}
        }
    }

    /// Coil life after one more part, wrapping to a new coil at zero.
    fn next_coil_life(&self) -> u32 {
        if self.coil_life <= 1 {
            let max = self.rules.config().coil_life_max;
            info!(coil_life_max = max, "coil life exhausted, coil replaced");
            max
        } else {
            self.coil_life - 1
        }
    }

    /// Coil life as the rules see it, reduced by coil-wear drift.
    fn effective_coil_life(&self) -> u32 {
        match self.drift.offset_for(DriftParam::CoilLife) {
            Some(wear) => {
                let (lo, hi) = DriftParam::CoilLife.range(self.rules.config().coil_life_max);
                (f64::from(self.coil_life) - wear).round().clamp(lo, hi) as u32
            }
            None => self.coil_life,
        }
    }

    fn new_part_id(&mut self) -> String {
        format!("PART-{:08X}", self.rng.r#gen::<u32>())
    }

    fn push_event(&mut self, status: EventStatus, reason: String) {
        if self.event_log.is_full() {
            self.event_log.pop_front();
        }
        let entry = EventLogEntry {
            time: self.clock.format(),
            part_id: self.part_id.clone(),
            status,
            reason,
        };
        // Room was made above.
        let _ = self.event_log.push_back(entry);
    }

    fn emit(&self, record: TelemetrySnapshot) -> TelemetrySnapshot {
        if let Some(bridge) = &self.bridge {
            bridge.enqueue(record.clone());
        }
        record
    }

    // ─── Snapshots ─────────────────────────────────────────────────

    fn snapshot(&self, state: TelemetryState, r: Readings) -> TelemetrySnapshot {
        let (shift, operator) = self.clock.shift_info();
        TelemetrySnapshot {
            timestamp: self.clock.now(),
            sim_clock: self.clock.format(),
            state,
            state_ticks: self.state_ticks,
            power_kw: r.power_kw,
            flow_lpm: r.flow_lpm,
            pressure_bar: r.pressure_bar,
            scan_speed_mm_s: r.scan_speed_mm_s,
            tempering_speed_mm_s: r.tempering_speed_mm_s,
            quench_water_temp_c: r.quench_water_temp_c,
            part_temp_c: self.thermal.temperature(),
            peak_part_temp_c: self.peak_part_temp_c,
            coil_life: self.effective_coil_life(),
            shift,
            operator_id: operator.to_string(),
            part_id: self.part_id.clone(),
            ok_count: self.ok_count,
            ng_count: self.ng_count,
            downtime: None,
            ng_reason: None,
        }
    }

    /// Snapshot with the cycle's peak readings in place of the live ones.
    fn peak_record(&self, state: TelemetryState) -> TelemetrySnapshot {
        self.snapshot(state, self.peaks)
    }

    /// Current readings with Gaussian sensor noise on the active channels.
    fn live_snapshot(&mut self) -> TelemetrySnapshot {
        let noise = self.process.sensor_noise;
        let mut r = self.inputs;
        r.power_kw = noisy(r.power_kw, noise.power_kw, &mut self.rng);
        r.flow_lpm = noisy(r.flow_lpm, noise.flow_lpm, &mut self.rng);
        r.pressure_bar = noisy(r.pressure_bar, noise.pressure_bar, &mut self.rng);

        let mut snapshot = self.snapshot(self.state.into(), r);
        if self.state == ProcessState::Down {
            snapshot.downtime = self.downtime.clone();
        }
        snapshot
    }
}

fn idle_peaks(nominal_water_c: f64) -> Readings {
    Readings {
        quench_water_temp_c: nominal_water_c,
        ..Readings::default()
    }
}

fn noisy(value: f64, sigma: f64, rng: &mut StdRng) -> f64 {
    if value <= 0.0 || sigma <= 0.0 {
        return value;
    }
    match Normal::new(value, sigma) {
        Ok(dist) => dist.sample(rng).max(0.0),
        Err(_) => value,
    }
}
