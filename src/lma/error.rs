/// Blocking calibration stage that ran out of time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CalibrationStage {
    Coefficients,
    PhaseAngle,
    SamplingFrequency,
}

/// Errors returned by the engine API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LmaError {
    #[error("Phase registry full")]
    RegistryFull,

    #[error("Unknown phase: {0}")]
    UnknownPhase(usize),

    #[error("Phase {0} has no neutral channel")]
    NoNeutral(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("No signal on the inputs during calibration")]
    NoSignal,

    #[error("Calibration timed out during {0:?}")]
    CalibrationTimeout(CalibrationStage),

    #[error("Engine must be stopped: {0}")]
    Running(&'static str),
}
