/// Raw ADC sample.
pub type Sample = i32;

/// Accumulator for products of raw samples (twice the sample width).
pub type Acc = i64;

pub const FREQ_NOMINAL_50: f32 = 50.0;

/// Sampling frequency the default configuration is tuned for.
pub const DEFAULT_FS: f32 = 3906.25;

/// Maximum number of phases the registry can hold.
pub const MAX_PHASES: usize = 4;

/// Seconds per hour, used to convert Ws to Wh.
pub const SECONDS_PER_HOUR: f32 = 3600.0;

/// Compensation hook applied to P, Q and S: `(irms, vrms, fline) -> factor`.
pub type ComputationHook = fn(f32, f32, f32) -> f32;

/// Handle returned by phase registration. Phases are processed in handle order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId(pub(crate) usize);

impl PhaseId {
    /// Zero indexed registration number.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Per phase event flags.
///
/// Sag and swell are mutually exclusive; the no-load bits are independent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Status(u8);

impl Status {
    pub const OK: Status = Status(0);
    /// |P| below `Config::no_load_p`.
    pub const NO_ACTIVE_LOAD: Status = Status(1);
    /// |Q| below `Config::no_load_p`.
    pub const NO_REACTIVE_LOAD: Status = Status(2);
    /// |S| below `Config::no_load_p`.
    pub const NO_APPARENT_LOAD: Status = Status(4);
    /// Vrms below `Config::v_sag`.
    pub const VOLTAGE_SAG: Status = Status(8);
    /// Vrms above `Config::v_swell`.
    pub const VOLTAGE_SWELL: Status = Status(16);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Status) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Status) {
        self.0 &= !other.0;
    }

}

impl core::ops::BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

/// Outcome of the phase-angle error stage of a phase calibration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CalibrationStatus {
    #[default]
    Ok,
    /// Current and voltage did not cross zero on the same sample.
    /// Suspect a non unity power factor load.
    PhaseAngleError,
}

/// Samples handed to a phase on each ADC interrupt.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseInputs {
    pub v_sample: Sample,   // Raw voltage sample
    pub v90_sample: Sample, // Voltage sample shifted by 90 degrees
    pub i_sample: Sample,   // Raw current sample
    pub n_sample: Sample,   // Raw neutral current sample (ignored without a neutral)
}

/// Snapshot of the measurements of one phase.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Measurements {
    pub vrms: f32,
    pub irms: f32,
    pub irms_neutral: f32,
    pub fline: f32,
    pub p: f32,
    pub q: f32,
    pub s: f32,
}

/// Energy per ADC interval (Ws, VARs, VAs) computed from the last window.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EnergyUnit {
    pub act: f32,
    pub app: f32,
    pub react: f32,
}

impl core::ops::AddAssign for EnergyUnit {
    fn add_assign(&mut self, rhs: EnergyUnit) {
        self.act += rhs.act;
        self.app += rhs.app;
        self.react += rhs.react;
    }
}

/// System wide calibration data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlobalCalibration {
    pub fs: f32,             // Sampling frequency
    pub fline_coeff: f32,    // fs * update_interval, divided by the window sample count
    pub deg_per_sample: f32, // Degrees of line cycle per sample
}

impl GlobalCalibration {
    /// Derives the frequency coefficients from a known sampling frequency.
    pub fn from_sampling(fs: f32, fline_nominal: f32, update_interval: u32) -> Self {
        Self {
            fs,
            fline_coeff: fs * update_interval as f32,
            deg_per_sample: (360.0 * fline_nominal) / fs,
        }
    }
}

impl Default for GlobalCalibration {
    fn default() -> Self {
        Self::from_sampling(DEFAULT_FS, FREQ_NOMINAL_50, 25)
    }
}

/// Per phase calibration data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseCalibration {
    pub vrms_coeff: f32,
    pub irms_coeff: f32,
    /// I relative to V in degrees: I lags V is negative, I leads V is positive.
    pub vi_phase_correction: f32,
    pub p_coeff: f32,
}

impl PhaseCalibration {
    /// Gains must be finite and positive; the measurement engine divides by them.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !is_gain(self.vrms_coeff) || !is_gain(self.irms_coeff) || !is_gain(self.p_coeff) {
            return Err("calibration gains must be finite and positive");
        }
        if !self.vi_phase_correction.is_finite() {
            return Err("phase correction must be finite");
        }
        Ok(())
    }
}

impl Default for PhaseCalibration {
    fn default() -> Self {
        Self {
            vrms_coeff: 1.0,
            irms_coeff: 1.0,
            vi_phase_correction: 0.0,
            p_coeff: 1.0,
        }
    }
}

/// Neutral channel calibration data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NeutralCalibration {
    pub irms_coeff: f32,
}

impl NeutralCalibration {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !is_gain(self.irms_coeff) {
            return Err("neutral gain must be finite and positive");
        }
        Ok(())
    }
}

fn is_gain(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl Default for NeutralCalibration {
    fn default() -> Self {
        Self { irms_coeff: 1.0 }
    }
}

/// Flags exchanged between the interrupt callbacks and the application.
/// Every flag is cleared by its consumer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    pub accumulators_ready: bool,
    pub measurements_ready: bool,
    pub calibrate_angle_error: bool,
}

/// Arguments for a per phase calibration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseCalibArgs {
    pub phase: PhaseId,
    pub vrms_tgt: f32,    // Applied RMS voltage
    pub irms_tgt: f32,    // Applied RMS current
    pub line_cycles: u32, // Line cycles to accumulate the coefficients over
}

/// Arguments for the sampling frequency calibration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlobalCalibArgs {
    pub rtc_period: f32,   // RTC period in seconds
    pub fline_target: f32, // Nominal line frequency
    pub rtc_cycles: u32,   // RTC periods to count ADC samples over
}

/// Runtime configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Config {
    pub gcalib: GlobalCalibration,
    pub update_interval: u32, // Line cycles per measurement window
    pub fline_tol_low: f32,
    pub fline_tol_high: f32,
    pub meter_constant: f32, // Ws per impulse: 3,600,000 / [imp/kWh]
    pub no_load_i: f32,
    pub no_load_p: f32,
    pub v_sag: f32,
    pub v_swell: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gcalib: GlobalCalibration::default(),
            update_interval: 25,
            fline_tol_low: 25.0,
            fline_tol_high: 75.0,
            meter_constant: 4500.0,
            no_load_i: 0.01,
            no_load_p: 2.0,
            v_sag: 50.0,
            v_swell: 280.0,
        }
    }
}

impl Config {
    /// Checks the fields the callbacks divide by or count against.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.update_interval == 0 {
            return Err("update_interval must be at least one line cycle");
        }
        if !(self.gcalib.fs > 0.0) {
            return Err("sampling frequency must be positive");
        }
        // fline is fline_coeff over the window sample count.
        let expected = self.gcalib.fs * self.update_interval as f32;
        if !((self.gcalib.fline_coeff - expected).abs() <= expected * 1e-4) {
            return Err("fline_coeff does not match fs and update_interval");
        }
        if !(self.meter_constant > 0.0) {
            return Err("meter constant must be positive");
        }
        if self.fline_tol_low > self.fline_tol_high {
            return Err("line frequency tolerance band is inverted");
        }
        if self.v_sag > self.v_swell {
            return Err("sag threshold is above the swell threshold");
        }
        Ok(())
    }
}
