use crate::lma::port::{Accumulators, Port};
use crate::lma::signal::is_frequency_in_tolerance;
use crate::lma::types::*;

/// Inputs of one window computation, copied out of the phase under the lock.
#[derive(Copy, Clone, Debug)]
pub struct Window {
    pub snapshot: Accumulators,
    pub calib: PhaseCalibration,
    pub neutral: Option<NeutralCalibration>,
    pub hook: Option<ComputationHook>,
    pub status: Status,
}

/// Results of one window computation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WindowResult {
    pub measurements: Measurements,
    pub energy_units: EnergyUnit,
    pub status: Status,
}

/*
* @brief Compute the measurements and energy units of a closed window.
* @param port Math hooks
* @param window Snapshot, calibration and previous status of the phase
* @param config Active configuration
* @return Measurements, energy units per ADC interval and the updated status
* @note A window whose line frequency falls outside the tolerance band is discarded: every
*       measurement and energy unit is zero and the status is left as it was.
*/
pub fn compute_window<P: Port>(port: &P, window: &Window, config: &Config) -> WindowResult {
    let invalid = WindowResult {
        status: window.status,
        ..Default::default()
    };

    let accs = &window.snapshot;
    if accs.sample_count == 0 {
        return invalid;
    }

    let n = port.acc_to_float(accs.sample_count as Acc);
    let fline = port.fp_div(config.gcalib.fline_coeff, n);
    if !is_frequency_in_tolerance(fline, config.fline_tol_low, config.fline_tol_high) {
        return invalid;
    }

    let vacc = port.acc_to_float(accs.vacc);
    let iacc = port.acc_to_float(accs.iacc);
    let pacc = port.acc_to_float(accs.pacc);
    let qacc = port.acc_to_float(accs.qacc);

    let calib = &window.calib;
    let vrms = port.fp_div(port.fp_sqrt(port.fp_div(vacc, n)), calib.vrms_coeff);
    let mut irms = port.fp_div(port.fp_sqrt(port.fp_div(iacc, n)), calib.irms_coeff);
    let irms_neutral = match window.neutral {
        Some(neutral) => {
            let nacc = port.acc_to_float(accs.nacc);
            port.fp_div(port.fp_sqrt(port.fp_div(nacc, n)), neutral.irms_coeff)
        }
        None => 0.0,
    };

    let power_divisor = port.fp_mul(n, calib.p_coeff);
    let mut p = port.fp_div(pacc, power_divisor);
    let mut q = port.fp_div(qacc, power_divisor);
    // sqrt(iacc * vacc), split to stay inside the f32 range.
    let mut s = port.fp_div(port.fp_mul(port.fp_sqrt(iacc), port.fp_sqrt(vacc)), power_divisor);

    if let Some(hook) = window.hook {
        let factor = hook(irms, vrms, fline);
        p = port.fp_mul(p, factor);
        q = port.fp_mul(q, factor);
        s = port.fp_mul(s, factor);
    }

    let mut status = window.status;
    if vrms < config.v_sag {
        status.insert(Status::VOLTAGE_SAG);
        status.remove(Status::VOLTAGE_SWELL);
    } else if vrms > config.v_swell {
        status.insert(Status::VOLTAGE_SWELL);
        status.remove(Status::VOLTAGE_SAG);
    } else {
        status.remove(Status::VOLTAGE_SAG | Status::VOLTAGE_SWELL);
    }

    if irms < config.no_load_i {
        irms = 0.0;
    }

    let (p, act) = apply_no_load(port, p, config, &mut status, Status::NO_ACTIVE_LOAD);
    let (q, react) = apply_no_load(port, q, config, &mut status, Status::NO_REACTIVE_LOAD);
    let (s, app) = apply_no_load(port, s, config, &mut status, Status::NO_APPARENT_LOAD);

    WindowResult {
        measurements: Measurements {
            vrms,
            irms,
            irms_neutral,
            fline,
            p,
            q,
            s,
        },
        energy_units: EnergyUnit { act, app, react },
        status,
    }
}

/*
* @brief Apply the no-load threshold to a power value.
* @return The power and its energy per ADC interval, both zero below the threshold
*/
fn apply_no_load<P: Port>(
    port: &P,
    power: f32,
    config: &Config,
    status: &mut Status,
    flag: Status,
) -> (f32, f32) {
    if port.fp_abs(power) < config.no_load_p {
        status.insert(flag);
        (0.0, 0.0)
    } else {
        status.remove(flag);
        (power, port.fp_div(power, config.gcalib.fs))
    }
}

/*
* @brief Power factor from the apparent and active power.
* @return P / S clamped to [-1, 1], or 0 without apparent load
*/
pub fn power_factor(p: f32, s: f32) -> f32 {
    if s == 0.0 {
        return 0.0;
    }
    (p / s).clamp(-1.0, 1.0)
}
