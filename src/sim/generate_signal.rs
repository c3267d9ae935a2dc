use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{PI, SQRT_2};

use crate::lma::types::{PhaseCalibration, Sample};

/// ADC counts per volt: divider ratio times 2^24 counts per volt at the ADC pin.
pub const VIN_TO_COUNTS: f64 = 0.0012623 * 16_777_216.0;
/// ADC counts per amp: shunt gain times 2^24 counts per volt at the ADC pin.
pub const AMPS_TO_COUNTS: f64 = 8.0 * 0.0004 * 16_777_216.0;

const HARM_ORDER: f64 = 5.0;

fn voltage(v: f64) -> f64 {
    v * VIN_TO_COUNTS
}

fn current(i: f64) -> f64 {
    i * AMPS_TO_COUNTS
}

fn offset(deg: f64) -> f64 {
    deg * 2.0 * PI / 360.0
}

/// Description of the simulated mains.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SignalParams {
    pub fs: f64,
    pub fline: f64,
    pub vrms: f64,
    pub irms: f64,
    pub phase_shift: f64,       // I relative to V in degrees, lagging is negative
    pub num_phases: usize,      // Phases are 120 degrees apart
    pub noise_percent: f64,     // Random noise, percent of peak
    pub harmonic_percent: f64,  // 5th harmonic, percent of peak
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            fs: 3906.25,
            fline: 50.0,
            vrms: 230.0,
            irms: 10.0,
            phase_shift: 0.0,
            num_phases: 1,
            noise_percent: 0.0,
            harmonic_percent: 0.0,
        }
    }
}

impl SignalParams {
    /// Calibration that maps the simulated ADC counts back to volts and amps.
    pub fn ideal_calibration(&self) -> PhaseCalibration {
        PhaseCalibration {
            vrms_coeff: VIN_TO_COUNTS as f32,
            irms_coeff: AMPS_TO_COUNTS as f32,
            vi_phase_correction: 0.0,
            p_coeff: (VIN_TO_COUNTS * AMPS_TO_COUNTS) as f32,
        }
    }

    /// Noise free voltage and current, in counts, at sample `s` of `phase`.
    fn clean(&self, s: f64, phase: usize) -> (f64, f64) {
        let angle = offset(phase as f64 * 120.0) + 2.0 * PI * self.fline / self.fs * s;
        let angle_i = angle + offset(self.phase_shift);
        let harm = self.harmonic_percent / 100.0;

        let v = voltage(self.vrms * SQRT_2) * (angle.sin() + harm * (HARM_ORDER * angle).sin());
        let i = current(self.irms * SQRT_2) * (angle_i.sin() + harm * (HARM_ORDER * angle_i).sin());
        (v, i)
    }
}

/// Sample by sample signal source for the driver thread.
#[derive(Clone, Debug)]
pub struct Waveform {
    params: SignalParams,
    rng: StdRng,
}

impl Waveform {
    pub fn new(params: SignalParams, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// Voltage and current counts of `phase` at sample index `n`.
    pub fn sample(&mut self, n: u64, phase: usize) -> (Sample, Sample) {
        let (v, i) = self.params.clean(n as f64, phase);
        let noise = self.params.noise_percent / 100.0;
        if noise == 0.0 {
            return (v.trunc() as Sample, i.trunc() as Sample);
        }

        let v_noise = voltage(self.params.vrms * SQRT_2) * noise * self.rng.gen_range(-1.0..1.0);
        let i_noise = current(self.params.irms * SQRT_2) * noise * self.rng.gen_range(-1.0..1.0);
        ((v + v_noise).trunc() as Sample, (i + i_noise).trunc() as Sample)
    }
}

/// Generated buffers of one phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseSignals {
    pub voltage: Vec<Sample>,
    pub current: Vec<Sample>,
}

/*
* @brief Generate `n_samples` of voltage and current for every phase.
* @param params Signal description
* @param n_samples Buffer length
* @param seed Seed of the noise generator
*/
pub fn generate_signals(params: &SignalParams, n_samples: usize, seed: u64) -> Vec<PhaseSignals> {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = Array1::range(0.0, n_samples as f64, 1.0);
    let noise = params.noise_percent / 100.0;

    (0..params.num_phases)
        .map(|phase| {
            let mut signals = PhaseSignals::default();
            for &s in samples.iter() {
                let (v, i) = params.clean(s, phase);
                let v_noise = voltage(params.vrms * SQRT_2) * noise * rng.gen_range(-1.0..1.0);
                let i_noise = current(params.irms * SQRT_2) * noise * rng.gen_range(-1.0..1.0);
                signals.voltage.push((v + v_noise).trunc() as Sample);
                signals.current.push((i + i_noise).trunc() as Sample);
            }
            signals
        })
        .collect()
}
