use crate::lma::port::{Accumulators, Port, Samples, Workspace};
use crate::lma::signal::{crossing_fraction, ZeroCross};
use crate::lma::types::*;

/// State of the phase-angle error sub-mode used during phase calibration.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PhaseAngleError {
    pub status: CalibrationStatus,
    pub v_zero_cross: ZeroCross,
    pub i_zero_cross: ZeroCross,
    pub sample_counter: u32, // Coincident crossings seen
    pub v_fraction: f32,     // Sum of voltage crossing fractions
    pub i_fraction: f32,     // Sum of current crossing fractions
}

impl PhaseAngleError {
    fn primed(samples: &Samples) -> Self {
        Self {
            v_zero_cross: ZeroCross::primed(samples.voltage),
            i_zero_cross: ZeroCross::primed(samples.current),
            ..Default::default()
        }
    }

    /// Average offset of the current crossing from the voltage crossing, in degrees.
    pub fn correction(&self, deg_per_sample: f32) -> f32 {
        if self.sample_counter == 0 {
            return 0.0;
        }
        let n = self.sample_counter as f32;
        (self.i_fraction / n - self.v_fraction / n) * deg_per_sample
    }
}

/// One registered measurement phase.
#[derive(Clone, Debug)]
pub struct Phase {
    pub(crate) ws: Workspace,
    pub(crate) snapshot: Accumulators,
    pub(crate) zero_cross: ZeroCross,
    pub(crate) calib: PhaseCalibration,
    pub(crate) pa_error: PhaseAngleError,
    pub(crate) measurements: Measurements,
    pub(crate) energy_units: EnergyUnit,
    pub(crate) status: Status,
    pub(crate) sigs: Signals,
    pub(crate) neutral: Option<NeutralCalibration>,
    pub(crate) hook: Option<ComputationHook>,
    pub(crate) phase_number: u32,
    pub(crate) epoch: u32,
}

impl Phase {
    pub(crate) fn new<P: Port>(port: &P, phase_number: u32) -> Self {
        let mut phase = Self {
            ws: Workspace::default(),
            snapshot: Accumulators::default(),
            zero_cross: ZeroCross::default(),
            calib: PhaseCalibration::default(),
            pa_error: PhaseAngleError::default(),
            measurements: Measurements::default(),
            energy_units: EnergyUnit::default(),
            status: Status::OK,
            sigs: Signals::default(),
            neutral: None,
            hook: None,
            phase_number,
            epoch: 0,
        };
        phase.hard_reset(port);
        phase
    }

    /// Returns the phase to its registration state. Calibration, neutral and hook are kept.
    pub(crate) fn hard_reset<P: Port>(&mut self, port: &P) {
        self.ws.samples = Samples::default();
        port.acc_reset(&mut self.ws, self.phase_number);
        self.snapshot = Accumulators::default();
        self.zero_cross = ZeroCross::default();
        self.pa_error = PhaseAngleError::default();
        self.measurements = Measurements::default();
        self.energy_units = EnergyUnit::default();
        self.status = Status::OK;
        self.sigs = Signals::default();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Arms the angle calibration sub-mode against the current workspace samples.
    pub(crate) fn prime_angle_calibration(&mut self) {
        self.pa_error = PhaseAngleError::primed(&self.ws.samples);
        self.sigs.calibrate_angle_error = true;
    }

    /// Per sample work of the ADC callback.
    ///
    /// Returns true while the phase is in the angle calibration sub-mode.
    pub(crate) fn process<P: Port>(
        &mut self,
        port: &P,
        inputs: &PhaseInputs,
        update_interval: u32,
    ) -> bool {
        let neutral = if self.neutral.is_some() { inputs.n_sample } else { 0 };
        self.ws.samples = Samples {
            voltage: inputs.v_sample,
            voltage90: inputs.v90_sample,
            current: inputs.i_sample,
            neutral,
        };

        if self.sigs.calibrate_angle_error {
            self.angle_error_process(update_interval);
            return true;
        }

        let was_synced = self.zero_cross.is_synced();
        self.zero_cross.detect(inputs.v_sample);

        if !self.zero_cross.is_synced() {
            return false;
        }

        if !was_synced {
            // Windows are aligned to the first crossing.
            port.acc_reset(&mut self.ws, self.phase_number);
            return false;
        }

        port.acc_run(&mut self.ws, self.phase_number);

        // The closing sample ends this window and seeds the next one.
        if self.zero_cross.count() >= update_interval {
            port.acc_load(&self.ws, &mut self.snapshot, self.phase_number);
            self.sigs.accumulators_ready = true;
            port.acc_reset(&mut self.ws, self.phase_number);
            self.zero_cross.restart_count();
        }

        false
    }

    fn angle_error_process(&mut self, update_interval: u32) {
        let samples = self.ws.samples;
        let pa = &mut self.pa_error;

        let v_last = pa.v_zero_cross.last_sample();
        let i_last = pa.i_zero_cross.last_sample();
        let v_crossed = pa.v_zero_cross.detect(samples.voltage);
        let i_crossed = pa.i_zero_cross.detect(samples.current);

        match (v_crossed, i_crossed) {
            (true, true) => {
                pa.v_fraction += crossing_fraction(v_last, samples.voltage);
                pa.i_fraction += crossing_fraction(i_last, samples.current);
                pa.sample_counter += 1;

                if pa.sample_counter > update_interval {
                    pa.status = CalibrationStatus::Ok;
                    self.sigs.calibrate_angle_error = false;
                }
            }
            (true, false) | (false, true) => pa.status = CalibrationStatus::PhaseAngleError,
            (false, false) => {}
        }
    }

    pub fn phase_number(&self) -> u32 {
        self.phase_number
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    /// Accumulators of the last closed window.
    pub fn snapshot(&self) -> &Accumulators {
        &self.snapshot
    }

    pub fn zero_cross(&self) -> &ZeroCross {
        &self.zero_cross
    }

    pub fn calibration(&self) -> &PhaseCalibration {
        &self.calib
    }

    pub fn neutral_calibration(&self) -> Option<&NeutralCalibration> {
        self.neutral.as_ref()
    }

    pub fn angle_error(&self) -> &PhaseAngleError {
        &self.pa_error
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    pub fn energy_units(&self) -> &EnergyUnit {
        &self.energy_units
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn signals(&self) -> &Signals {
        &self.sigs
    }
}
