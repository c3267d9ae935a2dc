pub mod calibrate;
pub mod energy;
pub mod error;
pub mod phase;
pub mod port;
pub mod power;
pub mod print;
pub mod processing;
pub mod signal;
pub mod types;

pub use calibrate::{Deadline, Timeout, Unbounded};
pub use energy::{ConsumptionData, SystemEnergy};
pub use error::{CalibrationStage, LmaError};
pub use port::{ImpulseLed, PhaseShift90, Port};
pub use processing::Lma;
pub use types::*;
