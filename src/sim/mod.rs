pub mod driver;
pub mod generate_signal;

pub use driver::{Driver, DriverConfig, SimPort};
pub use generate_signal::{generate_signals, PhaseSignals, SignalParams, Waveform};
