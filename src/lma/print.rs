use crate::lma::energy::ConsumptionData;
use crate::lma::power::power_factor;
use crate::lma::types::*;

/*
* @brief Print the measurements of one phase.
* @param phase Phase number
* @param m Measurements of the last window
*/
pub fn print_measurements(phase: usize, m: &Measurements) {
    log::info!("Phase {}:", phase);
    log::info!("  Voltage: {:.3} V", m.vrms);
    log::info!("  Current: {:.3} A", m.irms);
    log::info!("  Frequency: {:.3} Hz", m.fline);
    log::info!("  Active: {:.3} W", m.p);
    log::info!("  Reactive: {:.3} VAR", m.q);
    log::info!("  Apparent: {:.3} VA", m.s);
    log::info!("  Factor: {:.3}\n", power_factor(m.p, m.s));
}

/*
* @brief Print the neutral current of a phase.
*/
pub fn print_neutral(phase: usize, irms_neutral: f32) {
    log::info!("Phase {} neutral: {:.3} A\n", phase, irms_neutral);
}

/*
* @brief Print the status flags of one phase.
*/
pub fn print_status(phase: usize, status: Status) {
    if status.is_ok() {
        log::info!("Phase {} status: OK", phase);
        return;
    }

    let flags = [
        (Status::NO_ACTIVE_LOAD, "no active load"),
        (Status::NO_REACTIVE_LOAD, "no reactive load"),
        (Status::NO_APPARENT_LOAD, "no apparent load"),
        (Status::VOLTAGE_SAG, "voltage sag"),
        (Status::VOLTAGE_SWELL, "voltage swell"),
    ];
    for (flag, description) in flags {
        if status.contains(flag) {
            log::info!("Phase {} status: {}", phase, description);
        }
    }
}

/*
* @brief Print the calibration data of one phase.
*/
pub fn print_calibration(phase: usize, calib: &PhaseCalibration) {
    log::info!("Phase {} calibration:", phase);
    log::info!("  vrms_coeff: {:.4}", calib.vrms_coeff);
    log::info!("  irms_coeff: {:.4}", calib.irms_coeff);
    log::info!("  p_coeff: {:.4}", calib.p_coeff);
    log::info!("  vi_phase_correction: {:.4} deg\n", calib.vi_phase_correction);
}

/*
* @brief Print the global calibration data.
*/
pub fn print_global_calibration(gcalib: &GlobalCalibration) {
    log::info!("Global calibration:");
    log::info!("  fs: {:.3} Hz", gcalib.fs);
    log::info!("  fline_coeff: {:.3}", gcalib.fline_coeff);
    log::info!("  deg_per_sample: {:.4}\n", gcalib.deg_per_sample);
}

/*
* @brief Print the energy ledger in Wh.
*/
pub fn print_consumption(data: &ConsumptionData) {
    log::info!("Active Energy:");
    log::info!("  Imported Energy: {:.4} Wh", data.act_imp);
    log::info!("  Exported Energy: {:.4} Wh\n", data.act_exp);
    log::info!("Apparent Energy:");
    log::info!("  Imported Energy: {:.4} VAh", data.app_imp);
    log::info!("  Exported Energy: {:.4} VAh\n", data.app_exp);
    log::info!("Reactive Energy:");
    log::info!("  Inductive Imported: {:.4} VARh", data.l_react_imp);
    log::info!("  Inductive Exported: {:.4} VARh", data.l_react_exp);
    log::info!("  Capacitive Imported: {:.4} VARh", data.c_react_imp);
    log::info!("  Capacitive Exported: {:.4} VARh\n", data.c_react_exp);
}
