#![allow(dead_code)]

use metrology_lma::lma::{Config, Lma, PhaseId, PhaseInputs, PhaseShift90};
use metrology_lma::sim::{generate_signals, SignalParams, SimPort};

pub const FS: f64 = 3906.25;

pub fn close(value: f32, expected: f32, tolerance: f32) -> bool {
    (value - expected).abs() <= tolerance * expected.abs().max(1.0)
}

/// Engine with one calibrated phase per simulated phase.
pub fn engine(config: Config, params: &SignalParams) -> (Lma<SimPort>, Vec<PhaseId>) {
    let lma = Lma::new(SimPort::default(), config).unwrap();
    let ids = (0..params.num_phases)
        .map(|_| {
            let id = lma.register_phase().unwrap();
            lma.load_calibration(id, &params.ideal_calibration()).unwrap();
            id
        })
        .collect();
    (lma, ids)
}

/// Feeds `n_samples` of the simulated mains straight into the callbacks, with the
/// timer firing every 10 ms. `before_sample` runs ahead of every ADC callback.
pub fn feed(
    lma: &Lma<SimPort>,
    params: &SignalParams,
    n_samples: usize,
    mut before_sample: impl FnMut(&Lma<SimPort>),
) {
    let signals = generate_signals(params, n_samples, 1);
    let mut shifters: Vec<PhaseShift90> = signals
        .iter()
        .map(|_| PhaseShift90::new(params.fs as f32, params.fline as f32).unwrap())
        .collect();
    let timer_every = (params.fs * 0.01).round() as usize;

    for n in 0..n_samples {
        let inputs: Vec<PhaseInputs> = signals
            .iter()
            .zip(shifters.iter_mut())
            .map(|(phase, shifter)| PhaseInputs {
                v_sample: phase.voltage[n],
                v90_sample: shifter.shift(phase.voltage[n]),
                i_sample: phase.current[n],
                n_sample: phase.current[n],
            })
            .collect();

        before_sample(lma);
        lma.on_adc(&inputs);

        if (n + 1) % timer_every == 0 {
            lma.on_timer();
        }
    }
}

pub fn seconds(s: f64) -> usize {
    (s * FS) as usize
}
