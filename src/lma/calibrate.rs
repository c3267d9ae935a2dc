use std::time::{Duration, Instant};

use crate::lma::error::{CalibrationStage, LmaError};
use crate::lma::port::Port;
use crate::lma::processing::{Core, Lma};
use crate::lma::types::*;

/// Bounds the polling loops of the blocking calibrations.
pub trait Deadline {
    fn expired(&mut self) -> bool;
}

/// Waits forever.
#[derive(Copy, Clone, Debug, Default)]
pub struct Unbounded;

impl Deadline for Unbounded {
    fn expired(&mut self) -> bool {
        false
    }
}

/// Expires once `limit` has elapsed since creation.
#[derive(Copy, Clone, Debug)]
pub struct Timeout {
    started: Instant,
    limit: Duration,
}

impl Timeout {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }
}

impl Deadline for Timeout {
    fn expired(&mut self) -> bool {
        self.started.elapsed() >= self.limit
    }
}

/// Sampling frequency calibration state, driven by the RTC callback.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CalibFs {
    pub start: bool,
    pub running: bool,
    pub finished: bool,
    pub rtc_counter: u32,
    pub adc_counter: u32,
}

impl CalibFs {
    fn arm(&mut self, rtc_cycles: u32) {
        *self = CalibFs {
            start: true,
            rtc_counter: rtc_cycles,
            ..Default::default()
        };
    }

    /// The first tick after arming starts the ADC; the ADC is stopped after `rtc_cycles` more.
    pub(crate) fn on_rtc<P: Port>(&mut self, port: &P) {
        if self.start {
            self.start = false;
            self.running = true;
            port.adc_start();
        } else if self.running {
            self.rtc_counter = self.rtc_counter.saturating_sub(1);
            if self.rtc_counter == 0 {
                port.adc_stop();
                self.running = false;
                self.finished = true;
            }
        }
    }

    fn take_result(&mut self) -> Option<u32> {
        if self.finished {
            self.finished = false;
            Some(self.adc_counter)
        } else {
            None
        }
    }
}

impl<P: Port> Lma<P> {
    fn poll_until<T, D: Deadline>(
        &self,
        deadline: &mut D,
        mut ready: impl FnMut(&mut Core) -> Option<T>,
    ) -> Option<T> {
        loop {
            if let Some(value) = self.with_core(&mut ready) {
                return Some(value);
            }
            if deadline.expired() {
                return None;
            }
            self.port.idle();
        }
    }

    fn restart(&self) {
        self.port.adc_start();
        self.port.tmr_start();
    }

    /// Puts the phase back into measurement mode after a failed calibration.
    fn abort_phase_calibration(&self, id: PhaseId, update_interval: u32) {
        self.with_core(|core| {
            core.config.update_interval = update_interval;
            let _ = core.hard_reset_phase(id, &self.port);
        });
        self.restart();
    }

    /*
    * @brief Calibrate the gains and the phase-angle correction of one phase.
    * @param args Phase, applied RMS voltage and current, and window length in line cycles
    * @param deadline Bounds each blocking stage
    * @return The new calibration, also loaded into the phase
    * @note Blocks until the ADC callback has delivered a window and the angle stage has seen
    *       enough coincident crossings. Must not be called from a callback. ADC and timer are
    *       running again when it returns, on success or failure.
    */
    pub fn phase_calibrate<D: Deadline>(
        &self,
        args: &PhaseCalibArgs,
        mut deadline: D,
    ) -> Result<PhaseCalibration, LmaError> {
        if !(args.vrms_tgt > 0.0) || !(args.irms_tgt > 0.0) {
            return Err(LmaError::InvalidArgument("calibration targets must be positive"));
        }
        if args.line_cycles == 0 {
            return Err(LmaError::InvalidArgument("line_cycles must be at least one"));
        }
        let id = args.phase;
        self.with_core(|core| core.phase(id).map(|_| ()))?;

        log::info!(
            "Calibrating phase {}: {:.2} V, {:.3} A over {} line cycles",
            id.0,
            args.vrms_tgt,
            args.irms_tgt,
            args.line_cycles
        );

        self.port.adc_stop();
        self.port.tmr_stop();

        let update_interval = self.with_core(|core| {
            let backup = core.config.update_interval;
            core.config.update_interval = args.line_cycles;
            let _ = core.hard_reset_phase(id, &self.port);
            backup
        });

        self.port.adc_start();
        let snapshot = self.poll_until(&mut deadline, |core| {
            let phase = core.phases.get_mut(id.0)?;
            core::mem::take(&mut phase.sigs.accumulators_ready).then_some(phase.snapshot)
        });
        self.port.adc_stop();

        let Some(snapshot) = snapshot else {
            log::warn!("Phase {} calibration timed out waiting for a window", id.0);
            self.abort_phase_calibration(id, update_interval);
            return Err(LmaError::CalibrationTimeout(CalibrationStage::Coefficients));
        };
        if snapshot.vacc == 0 || snapshot.iacc == 0 {
            log::warn!("Phase {} calibration saw no voltage or current", id.0);
            self.abort_phase_calibration(id, update_interval);
            return Err(LmaError::NoSignal);
        }

        let port = &self.port;
        let n = port.acc_to_float(snapshot.sample_count as Acc);
        let rms = |acc: Acc, target: f32| {
            let mean = port.fp_div(port.acc_to_float(acc), n);
            port.fp_div(port.fp_sqrt(mean), target)
        };
        let vrms_coeff = rms(snapshot.vacc, args.vrms_tgt);
        let irms_coeff = rms(snapshot.iacc, args.irms_tgt);
        let p_coeff = port.fp_mul(vrms_coeff, irms_coeff);
        let neutral_coeff = rms(snapshot.nacc, args.irms_tgt);

        let deg_per_sample = self.with_core(|core| {
            core.config.update_interval = update_interval;
            if let Ok(phase) = core.hard_reset_phase(id, &self.port) {
                phase.calib.vrms_coeff = vrms_coeff;
                phase.calib.irms_coeff = irms_coeff;
                phase.calib.p_coeff = p_coeff;
                if let Some(neutral) = phase.neutral.as_mut() {
                    if snapshot.nacc > 0 {
                        neutral.irms_coeff = neutral_coeff;
                    }
                }
                phase.prime_angle_calibration();
            }
            core.config.gcalib.deg_per_sample
        });

        self.port.adc_start();
        let angle_error = self.poll_until(&mut deadline, |core| {
            let phase = core.phases.get(id.0)?;
            (!phase.sigs.calibrate_angle_error).then_some(phase.pa_error)
        });
        self.port.adc_stop();

        let Some(angle_error) = angle_error else {
            let status = self.with_core(|core| core.phase(id).map(|phase| phase.pa_error.status));
            log::warn!("Phase {} angle calibration timed out ({:?})", id.0, status);
            self.abort_phase_calibration(id, update_interval);
            return Err(LmaError::CalibrationTimeout(CalibrationStage::PhaseAngle));
        };

        let correction = angle_error.correction(deg_per_sample);
        let calib = self.with_core(|core| {
            let phase = core.hard_reset_phase(id, &self.port)?;
            phase.calib.vi_phase_correction = correction;
            Ok::<_, LmaError>(phase.calib)
        })?;

        self.restart();

        log::info!(
            "Phase {} calibrated: vrms_coeff {:.4}, irms_coeff {:.4}, p_coeff {:.4}, \
             vi correction {:.4} deg",
            id.0,
            calib.vrms_coeff,
            calib.irms_coeff,
            calib.p_coeff,
            calib.vi_phase_correction
        );

        Ok(calib)
    }

    /*
    * @brief Measure the sampling frequency against the RTC.
    * @param args RTC period, nominal line frequency and RTC periods to count over
    * @param deadline Bounds the wait for the RTC to finish the count
    * @return The new global calibration, also written into the configuration
    * @note The RTC must be running. ADC and timer are running again when it returns.
    */
    pub fn global_calibrate<D: Deadline>(
        &self,
        args: &GlobalCalibArgs,
        mut deadline: D,
    ) -> Result<GlobalCalibration, LmaError> {
        if !(args.rtc_period > 0.0) || !(args.fline_target > 0.0) {
            return Err(LmaError::InvalidArgument("rtc_period and fline_target must be positive"));
        }
        if args.rtc_cycles == 0 {
            return Err(LmaError::InvalidArgument("rtc_cycles must be at least one"));
        }

        log::info!(
            "Calibrating sampling frequency over {} RTC periods of {:.3} s",
            args.rtc_cycles,
            args.rtc_period
        );

        self.port.adc_stop();
        self.port.tmr_stop();

        self.with_core(|core| core.calib_fs.arm(args.rtc_cycles));
        let count = self.poll_until(&mut deadline, |core| core.calib_fs.take_result());

        let Some(count) = count else {
            log::warn!("Sampling frequency calibration timed out");
            self.with_core(|core| core.calib_fs = CalibFs::default());
            self.restart();
            return Err(LmaError::CalibrationTimeout(CalibrationStage::SamplingFrequency));
        };
        if count == 0 {
            self.restart();
            return Err(LmaError::NoSignal);
        }

        let period = self.port.fp_mul(args.rtc_period, args.rtc_cycles as f32);
        let fs = self.port.fp_div(self.port.acc_to_float(count as Acc), period);
        let gcalib = self.with_core(|core| {
            let interval = core.config.update_interval;
            let gcalib = GlobalCalibration::from_sampling(fs, args.fline_target, interval);
            core.config.gcalib = gcalib;
            gcalib
        });

        self.restart();

        log::info!(
            "Sampling frequency calibrated: fs {:.3} Hz, fline_coeff {:.2}, {:.4} deg/sample",
            gcalib.fs,
            gcalib.fline_coeff,
            gcalib.deg_per_sample
        );

        Ok(gcalib)
    }
}
