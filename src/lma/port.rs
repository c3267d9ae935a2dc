use crate::lma::error::LmaError;
use crate::lma::types::{Acc, Sample};

/// Raw samples of the sample currently being processed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Samples {
    pub voltage: Sample,
    pub voltage90: Sample,
    pub current: Sample,
    pub neutral: Sample,
}

/// Running sums of a measurement window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Accumulators {
    pub vacc: Acc, // Sum of V^2
    pub iacc: Acc, // Sum of I^2
    pub pacc: Acc, // Sum of V*I
    pub qacc: Acc, // Sum of V90*I
    pub nacc: Acc, // Sum of In^2
    pub sample_count: u32,
}

impl Accumulators {
    /// Starts a window on `samples`.
    pub fn seed(samples: &Samples) -> Self {
        let mut accs = Accumulators::default();
        accs.add(samples);
        accs
    }

    /// Adds the products of `samples` to the running sums.
    pub fn add(&mut self, samples: &Samples) {
        let v = samples.voltage as Acc;
        let v90 = samples.voltage90 as Acc;
        let i = samples.current as Acc;
        let n = samples.neutral as Acc;

        self.vacc += v * v;
        self.iacc += i * i;
        self.pacc += v * i;
        self.qacc += v90 * i;
        self.nacc += n * n;
        self.sample_count += 1;
    }
}

/// Per phase scratch area shared with the accumulation primitives.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Workspace {
    pub samples: Samples,
    pub accs: Accumulators,
}

/// Identifies one of the three impulse outputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImpulseLed {
    Active,
    Reactive,
    Apparent,
}

impl ImpulseLed {
    pub const ALL: [ImpulseLed; 3] =
        [ImpulseLed::Active, ImpulseLed::Reactive, ImpulseLed::Apparent];

    pub const fn index(self) -> usize {
        match self {
            ImpulseLed::Active => 0,
            ImpulseLed::Reactive => 1,
            ImpulseLed::Apparent => 2,
        }
    }
}

/// Platform adaptation layer.
///
/// The engine calls the accumulation and math hooks from inside its critical
/// section, so implementations must not call back into the engine. The
/// defaults are plain software versions; a target with a DSP or fixed point
/// unit overrides the ones it can accelerate.
pub trait Port {
    /// Seeds the window with the current workspace samples.
    fn acc_reset(&self, ws: &mut Workspace, _phase_number: u32) {
        ws.accs = Accumulators::seed(&ws.samples);
    }

    /// Accumulates the current workspace samples.
    fn acc_run(&self, ws: &mut Workspace, _phase_number: u32) {
        let samples = ws.samples;
        ws.accs.add(&samples);
    }

    /// Copies the running sums into the phase snapshot.
    fn acc_load(&self, ws: &Workspace, snapshot: &mut Accumulators, _phase_number: u32) {
        *snapshot = ws.accs;
    }

    fn acc_to_float(&self, acc: Acc) -> f32 {
        acc as f32
    }

    fn fp_mul(&self, a: f32, b: f32) -> f32 {
        a * b
    }

    fn fp_div(&self, a: f32, b: f32) -> f32 {
        a / b
    }

    fn fp_sqrt(&self, a: f32) -> f32 {
        a.sqrt()
    }

    fn fp_abs(&self, a: f32) -> f32 {
        a.abs()
    }

    fn adc_init(&self) {}
    fn adc_start(&self);
    fn adc_stop(&self);

    fn tmr_init(&self) {}
    fn tmr_start(&self);
    fn tmr_stop(&self);

    fn rtc_init(&self) {}
    fn rtc_start(&self);
    fn rtc_stop(&self);

    fn impulse_on(&self, led: ImpulseLed);
    fn impulse_off(&self, led: ImpulseLed);

    /// Called between polls while a blocking calibration waits on the callbacks.
    fn idle(&self) {
        core::hint::spin_loop();
    }
}

/// Depth of the delay line. The quarter cycle delay must stay below `SHIFT_DEPTH - 1` samples,
/// which covers 50 Hz mains up to about 25 kHz sampling.
pub const SHIFT_DEPTH: usize = 128;

const FRACTION_BITS: u32 = 10;
const FRACTION_ONE: i64 = 1 << FRACTION_BITS;

/// Delays the voltage channel by a quarter line cycle to produce V90.
///
/// The delay is `fs / (4 * fline)` samples. The fractional part is applied by
/// linear interpolation between the two neighbouring delayed samples.
#[derive(Clone, Debug)]
pub struct PhaseShift90 {
    buffer: [Sample; SHIFT_DEPTH],
    head: usize,
    whole: usize,
    weight: i64,
}

impl PhaseShift90 {
    pub fn new(fs: f32, fline: f32) -> Result<Self, LmaError> {
        let delay = fs / (4.0 * fline);
        if !(delay.is_finite() && delay >= 0.0) {
            return Err(LmaError::InvalidArgument("fs and fline must be positive"));
        }
        if delay > (SHIFT_DEPTH - 2) as f32 {
            return Err(LmaError::InvalidArgument("quarter cycle delay exceeds the delay line"));
        }
        let whole = delay as usize;
        let weight = ((delay - whole as f32) * FRACTION_ONE as f32).round() as i64;

        Ok(Self {
            buffer: [0; SHIFT_DEPTH],
            head: 0,
            whole,
            weight,
        })
    }

    /// Delay in samples, including the fractional part.
    pub fn delay(&self) -> f32 {
        self.whole as f32 + self.weight as f32 / FRACTION_ONE as f32
    }

    /// Pushes `sample` and returns the delayed sample.
    pub fn shift(&mut self, sample: Sample) -> Sample {
        self.buffer[self.head] = sample;

        let near = self.buffer[(self.head + SHIFT_DEPTH - self.whole) % SHIFT_DEPTH] as i64;
        let far = self.buffer[(self.head + SHIFT_DEPTH - self.whole - 1) % SHIFT_DEPTH] as i64;

        self.head = (self.head + 1) % SHIFT_DEPTH;

        ((near * (FRACTION_ONE - self.weight) + far * self.weight) >> FRACTION_BITS) as Sample
    }

    pub fn clear(&mut self) {
        self.buffer = [0; SHIFT_DEPTH];
        self.head = 0;
    }
}
