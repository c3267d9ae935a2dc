mod common;

use common::{close, engine, feed, seconds};
use metrology_lma::lma::{Config, Measurements, NeutralCalibration, Status};
use metrology_lma::sim::SignalParams;

#[test]
fn resistive_load_reads_back_applied_values() {
    let params = SignalParams::default();
    let (lma, ids) = engine(Config::default(), &params);
    let id = ids[0];

    feed(&lma, &params, seconds(2.0), |_| {});

    assert!(lma.measurements_ready(id));
    let m = lma.measurements(id).unwrap();
    assert!(close(m.vrms, 230.0, 0.005), "vrms {}", m.vrms);
    assert!(close(m.irms, 10.0, 0.005), "irms {}", m.irms);
    // The closing crossing sample counts in the window, so fline reads slightly low.
    assert!(close(m.fline, 50.0, 0.002), "fline {}", m.fline);
    assert!(m.fline < 50.0, "fline {}", m.fline);
    assert!(close(m.p, 2300.0, 0.01), "p {}", m.p);
    assert!(close(m.s, 2300.0, 0.01), "s {}", m.s);
    assert_eq!(m.q, 0.0);

    let status = lma.status(id).unwrap();
    assert!(status.contains(Status::NO_REACTIVE_LOAD));
    assert!(!status.contains(Status::NO_ACTIVE_LOAD));
    assert!(!status.contains(Status::VOLTAGE_SAG | Status::VOLTAGE_SWELL));
}

#[test]
fn lagging_load_reads_inductive_power() {
    let params = SignalParams {
        phase_shift: -60.0,
        ..Default::default()
    };
    let (lma, ids) = engine(Config::default(), &params);

    feed(&lma, &params, seconds(2.0), |_| {});

    let m = lma.measurements(ids[0]).unwrap();
    assert!(close(m.p, 1150.0, 0.01), "p {}", m.p);
    assert!(close(m.q, 1991.9, 0.01), "q {}", m.q);
    assert!(close(m.s, 2300.0, 0.01), "s {}", m.s);
    assert!(lma.status(ids[0]).unwrap().is_ok());
}

#[test]
fn out_of_band_frequency_discards_windows() {
    let params = SignalParams {
        fline: 20.0,
        ..Default::default()
    };
    let (lma, ids) = engine(Config::default(), &params);

    feed(&lma, &params, seconds(3.0), |_| {});

    assert!(lma.measurements_ready(ids[0]));
    assert_eq!(lma.measurements(ids[0]).unwrap(), Measurements::default());
    assert_eq!(lma.energy_units(ids[0]).unwrap().act, 0.0);
    assert_eq!(lma.status(ids[0]).unwrap(), Status::OK);
}

#[test]
fn voltage_swell_is_flagged() {
    let params = SignalParams {
        vrms: 290.0,
        ..Default::default()
    };
    let (lma, ids) = engine(Config::default(), &params);

    feed(&lma, &params, seconds(1.0), |_| {});

    let status = lma.status(ids[0]).unwrap();
    assert!(status.contains(Status::VOLTAGE_SWELL));
    assert!(!status.contains(Status::VOLTAGE_SAG));
}

#[test]
fn no_load_zeroes_current_and_power() {
    let params = SignalParams {
        irms: 0.005,
        ..Default::default()
    };
    let (lma, ids) = engine(Config::default(), &params);

    feed(&lma, &params, seconds(1.0), |_| {});

    let m = lma.measurements(ids[0]).unwrap();
    assert_eq!(m.irms, 0.0);
    assert_eq!(m.p, 0.0);
    assert_eq!(m.s, 0.0);
    let status = lma.status(ids[0]).unwrap();
    let no_load = Status::NO_ACTIVE_LOAD | Status::NO_REACTIVE_LOAD | Status::NO_APPARENT_LOAD;
    assert!(status.contains(no_load));
    assert_eq!(lma.energy_get().unit.app, 0.0);
}

#[test]
fn three_phase_system_sums_energy_units() {
    let params = SignalParams {
        num_phases: 3,
        ..Default::default()
    };
    let (lma, ids) = engine(Config::default(), &params);

    feed(&lma, &params, seconds(2.0), |_| {});

    for &id in &ids {
        let m = lma.measurements(id).unwrap();
        assert!(close(m.vrms, 230.0, 0.005), "phase {} vrms {}", id.index(), m.vrms);
        assert!(close(m.p, 2300.0, 0.01), "phase {} p {}", id.index(), m.p);
    }
    let total = lma.energy_get().unit;
    assert!(close(total.act, 3.0 * 2300.0 / common::FS as f32, 0.01), "unit {}", total.act);
}

#[test]
fn neutral_current_is_measured() {
    let params = SignalParams::default();
    let (lma, ids) = engine(Config::default(), &params);
    let irms_coeff = params.ideal_calibration().irms_coeff;
    lma.register_neutral(ids[0], NeutralCalibration { irms_coeff }).unwrap();

    feed(&lma, &params, seconds(1.0), |_| {});

    let irms_neutral = lma.irms_neutral(ids[0]).unwrap();
    assert!(close(irms_neutral, 10.0, 0.005), "neutral {irms_neutral}");
}

#[test]
fn computation_hook_scales_power() {
    let params = SignalParams::default();
    let (lma, ids) = engine(Config::default(), &params);
    lma.set_computation_hook(ids[0], Some(|_irms, _vrms, _fline| 1.1)).unwrap();

    feed(&lma, &params, seconds(1.0), |_| {});

    let m = lma.measurements(ids[0]).unwrap();
    assert!(close(m.p, 2530.0, 0.01), "p {}", m.p);
    assert!(close(m.vrms, 230.0, 0.005), "vrms {}", m.vrms);
}
