use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::lma::calibrate::CalibFs;
use crate::lma::energy::{ConsumptionData, SystemEnergy};
use crate::lma::error::LmaError;
use crate::lma::phase::Phase;
use crate::lma::port::{ImpulseLed, Port};
use crate::lma::power::{compute_window, Window, WindowResult};
use crate::lma::types::*;

/// State shared between the application and the interrupt callbacks.
pub(crate) struct Core {
    pub(crate) config: Config,
    pub(crate) phases: Vec<Phase, MAX_PHASES>,
    pub(crate) energy: SystemEnergy,
    pub(crate) calib_fs: CalibFs,
    pub(crate) running: bool,
}

impl Core {
    pub(crate) fn phase(&self, id: PhaseId) -> Result<&Phase, LmaError> {
        self.phases.get(id.0).ok_or(LmaError::UnknownPhase(id.0))
    }

    pub(crate) fn phase_mut(&mut self, id: PhaseId) -> Result<&mut Phase, LmaError> {
        self.phases.get_mut(id.0).ok_or(LmaError::UnknownPhase(id.0))
    }

    /// Sums the energy units of every phase into the ledger unit.
    pub(crate) fn publish_energy_unit(&mut self) {
        let mut unit = EnergyUnit::default();
        for phase in self.phases.iter() {
            unit += phase.energy_units;
        }
        self.energy.unit = unit;
    }

    /// Hard resets a phase and drops its share of the ledger unit.
    pub(crate) fn hard_reset_phase<P: Port>(
        &mut self,
        id: PhaseId,
        port: &P,
    ) -> Result<&mut Phase, LmaError> {
        self.phase_mut(id)?.hard_reset(port);
        self.publish_energy_unit();
        self.phase_mut(id)
    }
}

/// Metrology engine context.
///
/// Owns the phase registry, the energy ledger and the calibration state. The
/// platform calls [`Lma::on_adc`], [`Lma::on_timer`] and [`Lma::on_rtc`] from its
/// interrupts; the application uses the remaining methods. All shared state
/// lives behind one critical section.
pub struct Lma<P: Port> {
    pub(crate) port: P,
    pub(crate) core: Mutex<RefCell<Core>>,
}

impl<P: Port> Lma<P> {
    /// Initializes the engine: LEDs off, then ADC, timer and RTC drivers.
    pub fn new(port: P, config: Config) -> Result<Self, LmaError> {
        config.validate().map_err(LmaError::InvalidArgument)?;

        for led in ImpulseLed::ALL {
            port.impulse_off(led);
        }
        port.adc_init();
        port.tmr_init();
        port.rtc_init();

        log::info!(
            "LMA initialized: fs {:.2} Hz, {} line cycles per window, meter constant {:.1} Ws",
            config.gcalib.fs,
            config.update_interval,
            config.meter_constant
        );

        Ok(Self {
            port,
            core: Mutex::new(RefCell::new(Core {
                config,
                phases: Vec::new(),
                energy: SystemEnergy::default(),
                calib_fs: CalibFs::default(),
                running: false,
            })),
        })
    }

    /// Stops the engine and clears the phase registry.
    pub fn deinit(&self) {
        self.stop();
        self.with_core(|core| {
            core.phases.clear();
            core.calib_fs = CalibFs::default();
            core.publish_energy_unit();
        });
        log::info!("LMA deinitialized");
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        critical_section::with(|cs| f(&mut self.core.borrow_ref_mut(cs)))
    }

    fn with_phase<R>(
        &self,
        id: PhaseId,
        f: impl FnOnce(&mut Phase) -> R,
    ) -> Result<R, LmaError> {
        self.with_core(|core| core.phase_mut(id).map(f))
    }

    pub fn start(&self) {
        self.with_core(|core| core.running = true);
        self.port.adc_start();
        self.port.tmr_start();
        self.port.rtc_start();
        log::info!("LMA started");
    }

    pub fn stop(&self) {
        self.port.adc_stop();
        self.port.tmr_stop();
        self.port.rtc_stop();
        self.with_core(|core| core.running = false);
        log::info!("LMA stopped");
    }

    pub fn is_running(&self) -> bool {
        self.with_core(|core| core.running)
    }

    pub fn config(&self) -> Config {
        self.with_core(|core| core.config)
    }

    /// Replaces the configuration. Only allowed while stopped.
    pub fn set_config(&self, config: Config) -> Result<(), LmaError> {
        config.validate().map_err(LmaError::InvalidArgument)?;
        self.with_core(|core| {
            if core.running {
                return Err(LmaError::Running("configuration change"));
            }
            core.config = config;
            Ok(())
        })
    }

    /*
    * @brief Register a new phase.
    * @return Handle of the phase; phases are processed in registration order
    */
    pub fn register_phase(&self) -> Result<PhaseId, LmaError> {
        let id = self.with_core(|core| {
            let index = core.phases.len();
            core.phases
                .push(Phase::new(&self.port, index as u32))
                .map_err(|_| LmaError::RegistryFull)?;
            Ok(PhaseId(index))
        })?;
        log::info!("Registered phase {}", id.0);
        Ok(id)
    }

    /// Attaches a neutral current channel to a phase.
    pub fn register_neutral(&self, id: PhaseId, calib: NeutralCalibration) -> Result<(), LmaError> {
        calib.validate().map_err(LmaError::InvalidArgument)?;
        self.with_phase(id, |phase| phase.neutral = Some(calib))?;
        log::info!("Registered neutral on phase {}", id.0);
        Ok(())
    }

    pub fn load_calibration(&self, id: PhaseId, calib: &PhaseCalibration) -> Result<(), LmaError> {
        calib.validate().map_err(LmaError::InvalidArgument)?;
        self.with_phase(id, |phase| phase.calib = *calib)
    }

    pub fn load_neutral_calibration(
        &self,
        id: PhaseId,
        calib: &NeutralCalibration,
    ) -> Result<(), LmaError> {
        calib.validate().map_err(LmaError::InvalidArgument)?;
        self.with_core(|core| match core.phase_mut(id)?.neutral.as_mut() {
            Some(neutral) => {
                *neutral = *calib;
                Ok(())
            }
            None => Err(LmaError::NoNeutral(id.0)),
        })
    }

    pub fn set_computation_hook(
        &self,
        id: PhaseId,
        hook: Option<ComputationHook>,
    ) -> Result<(), LmaError> {
        self.with_phase(id, |phase| phase.hook = hook)
    }

    pub fn phase_calibration(&self, id: PhaseId) -> Result<PhaseCalibration, LmaError> {
        self.with_phase(id, |phase| phase.calib)
    }

    pub fn neutral_calibration(&self, id: PhaseId) -> Result<Option<NeutralCalibration>, LmaError> {
        self.with_phase(id, |phase| phase.neutral)
    }

    /// Copy of the full phase state.
    pub fn phase_snapshot(&self, id: PhaseId) -> Result<Phase, LmaError> {
        self.with_phase(id, |phase| phase.clone())
    }

    pub fn phase_count(&self) -> usize {
        self.with_core(|core| core.phases.len())
    }

    pub fn angle_calibration_status(&self, id: PhaseId) -> Result<CalibrationStatus, LmaError> {
        self.with_phase(id, |phase| phase.pa_error.status)
    }

    /// Restores a ledger, e.g. from non-volatile storage.
    ///
    /// Every accumulator must hold less than one meter constant and the unit must be finite.
    pub fn energy_set(&self, energy: &SystemEnergy) -> Result<(), LmaError> {
        let unit = energy.unit;
        if !(unit.act.is_finite() && unit.app.is_finite() && unit.react.is_finite()) {
            return Err(LmaError::InvalidArgument("energy unit must be finite"));
        }
        self.with_core(|core| {
            if !energy.is_within(core.config.meter_constant) {
                return Err(LmaError::InvalidArgument("accumulator outside one meter constant"));
            }
            core.energy = *energy;
            Ok(())
        })
    }

    pub fn energy_get(&self) -> SystemEnergy {
        self.with_core(|core| core.energy)
    }

    pub fn status(&self, id: PhaseId) -> Result<Status, LmaError> {
        self.with_phase(id, |phase| phase.status)
    }

    pub fn measurements(&self, id: PhaseId) -> Result<Measurements, LmaError> {
        self.with_phase(id, |phase| phase.measurements)
    }

    pub fn vrms(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_phase(id, |phase| phase.measurements.vrms)
    }

    pub fn irms(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_phase(id, |phase| phase.measurements.irms)
    }

    pub fn irms_neutral(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_core(|core| {
            let phase = core.phase(id)?;
            match phase.neutral {
                Some(_) => Ok(phase.measurements.irms_neutral),
                None => Err(LmaError::NoNeutral(id.0)),
            }
        })
    }

    pub fn fline(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_phase(id, |phase| phase.measurements.fline)
    }

    pub fn active_power(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_phase(id, |phase| phase.measurements.p)
    }

    pub fn reactive_power(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_phase(id, |phase| phase.measurements.q)
    }

    pub fn apparent_power(&self, id: PhaseId) -> Result<f32, LmaError> {
        self.with_phase(id, |phase| phase.measurements.s)
    }

    pub fn energy_units(&self, id: PhaseId) -> Result<EnergyUnit, LmaError> {
        self.with_phase(id, |phase| phase.energy_units)
    }

    /// Converts a ledger into Wh with the configured meter constant.
    pub fn consumption_data(&self, energy: &SystemEnergy) -> ConsumptionData {
        energy.consumption(self.config().meter_constant)
    }

    /// True once per published window. Reading clears the flag.
    pub fn measurements_ready(&self, id: PhaseId) -> bool {
        self.with_core(|core| match core.phases.get_mut(id.0) {
            Some(phase) => core::mem::take(&mut phase.sigs.measurements_ready),
            None => false,
        })
    }

    /*
    * @brief ADC interrupt callback.
    * @param inputs One entry per registered phase, in registration order.
    *        Extra entries are ignored.
    * @note While the sampling frequency calibration runs the samples are only counted.
    */
    pub fn on_adc(&self, inputs: &[PhaseInputs]) {
        critical_section::with(|cs| {
            let mut core = self.core.borrow_ref_mut(cs);
            let core = &mut *core;

            if core.calib_fs.running {
                core.calib_fs.adc_counter += 1;
                return;
            }

            let update_interval = core.config.update_interval;
            let mut calibrating = false;
            for (phase, sample) in core.phases.iter_mut().zip(inputs) {
                calibrating |= phase.process(&self.port, sample, update_interval);
            }

            if !calibrating {
                core.energy.process_interval(&self.port, core.config.meter_constant);
            }
        });
    }

    /*
    * @brief Timer interrupt callback.
    * @note Ready snapshots are copied in one critical section, computed outside of it and
    *       published in a second one. A phase that was hard reset in between keeps its reset
    *       state.
    */
    pub fn on_timer(&self) {
        let mut pending: Vec<(usize, u32, Window), MAX_PHASES> = Vec::new();

        let config = self.with_core(|core| {
            for (index, phase) in core.phases.iter_mut().enumerate() {
                if phase.sigs.accumulators_ready {
                    phase.sigs.accumulators_ready = false;
                    let window = Window {
                        snapshot: phase.snapshot,
                        calib: phase.calib,
                        neutral: phase.neutral,
                        hook: phase.hook,
                        status: phase.status,
                    };
                    // Capacity matches the registry.
                    let _ = pending.push((index, phase.epoch, window));
                }
            }
            core.config
        });

        if pending.is_empty() {
            return;
        }

        let mut results: Vec<(usize, u32, WindowResult), MAX_PHASES> = Vec::new();
        for (index, epoch, window) in &pending {
            let _ = results.push((*index, *epoch, compute_window(&self.port, window, &config)));
        }

        self.with_core(|core| {
            for (index, epoch, result) in &results {
                if let Some(phase) = core.phases.get_mut(*index) {
                    if phase.epoch == *epoch {
                        phase.measurements = result.measurements;
                        phase.energy_units = result.energy_units;
                        phase.status = result.status;
                        phase.sigs.measurements_ready = true;
                    }
                }
            }

            core.publish_energy_unit();
        });

        for (index, _, result) in &results {
            log::debug!(
                "Phase {} window: {:.2} V {:.3} A {:.3} Hz, status {:#04x}",
                index,
                result.measurements.vrms,
                result.measurements.irms,
                result.measurements.fline,
                result.status.bits()
            );
        }
    }

    /// RTC interrupt callback; drives the sampling frequency calibration.
    pub fn on_rtc(&self) {
        self.with_core(|core| core.calib_fs.on_rtc(&self.port));
    }
}
