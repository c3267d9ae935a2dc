//! Line metrology engine.
//!
//! Turns interrupt driven voltage and current samples into RMS values, line
//! frequency, active, reactive and apparent power, and a four quadrant energy
//! ledger with impulse outputs. Platforms plug in through [`lma::Port`]; the
//! [`sim`] module provides a threaded software platform.

pub mod lma;
pub mod sim;

pub use lma::{Lma, LmaError, Port};
