mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::close;
use metrology_lma::lma::{
    CalibrationStatus, Config, GlobalCalibArgs, Lma, PhaseCalibArgs, PhaseCalibration, PhaseId,
    Timeout,
};
use metrology_lma::sim::{Driver, DriverConfig, SignalParams, SimPort, Waveform};

const TIMEOUT: Duration = Duration::from_secs(60);

fn wait_for_window(lma: &Lma<SimPort>, id: PhaseId) {
    let started = Instant::now();
    while !lma.measurements_ready(id) {
        assert!(started.elapsed() < TIMEOUT, "no measurement window");
        thread::sleep(Duration::from_millis(1));
    }
}

fn running_engine(params: SignalParams) -> (Arc<Lma<SimPort>>, PhaseId, Driver) {
    let lma = Arc::new(Lma::new(SimPort::default(), Config::default()).unwrap());
    let id = lma.register_phase().unwrap();
    let driver =
        Driver::spawn(lma.clone(), Waveform::new(params, 1), DriverConfig::default()).unwrap();
    lma.start();
    (lma, id, driver)
}

fn calibrate(lma: &Lma<SimPort>, id: PhaseId) -> PhaseCalibration {
    let args = PhaseCalibArgs {
        phase: id,
        vrms_tgt: 230.0,
        irms_tgt: 10.0,
        line_cycles: 25,
    };
    lma.phase_calibrate(&args, Timeout::new(TIMEOUT)).unwrap()
}

#[test]
fn phase_calibration_round_trip() {
    let params = SignalParams::default();
    let (lma, id, driver) = running_engine(params);

    let calib = calibrate(&lma, id);
    let ideal = params.ideal_calibration();

    assert!(close(calib.vrms_coeff, ideal.vrms_coeff, 1e-3), "vrms_coeff {}", calib.vrms_coeff);
    assert!(close(calib.irms_coeff, ideal.irms_coeff, 1e-3), "irms_coeff {}", calib.irms_coeff);
    assert!(close(calib.p_coeff, ideal.p_coeff, 2e-3), "p_coeff {}", calib.p_coeff);
    assert!(calib.vi_phase_correction.abs() < 0.01, "correction {}", calib.vi_phase_correction);
    assert_eq!(lma.phase_calibration(id).unwrap(), calib);
    assert_eq!(lma.angle_calibration_status(id).unwrap(), CalibrationStatus::Ok);
    assert_eq!(lma.config().update_interval, 25);
    assert!(lma.port().adc_running());
    assert!(lma.port().tmr_running());

    wait_for_window(&lma, id);
    let m = lma.measurements(id).unwrap();
    assert!(close(m.vrms, 230.0, 0.01), "vrms {}", m.vrms);
    assert!(close(m.irms, 10.0, 0.01), "irms {}", m.irms);
    assert!(close(m.p, 2300.0, 0.01), "p {}", m.p);
    assert!(close(m.fline, 50.0, 0.002), "fline {}", m.fline);
    assert_eq!(m.q, 0.0);

    lma.stop();
    driver.stop();
}

#[test]
fn global_calibration_measures_sampling_frequency() {
    let params = SignalParams::default();
    let (lma, id, driver) = running_engine(params);
    lma.load_calibration(id, &params.ideal_calibration()).unwrap();

    let args = GlobalCalibArgs {
        rtc_period: 1.0,
        fline_target: 50.0,
        rtc_cycles: 3,
    };
    let gcalib = lma.global_calibrate(&args, Timeout::new(TIMEOUT)).unwrap();

    assert!(close(gcalib.fs, 3906.25, 1e-3), "fs {}", gcalib.fs);
    assert!(close(gcalib.deg_per_sample, 4.608, 1e-3), "deg {}", gcalib.deg_per_sample);
    assert!(close(gcalib.fline_coeff, 3906.25 * 25.0, 1e-3), "coeff {}", gcalib.fline_coeff);
    assert_eq!(lma.config().gcalib, gcalib);
    assert!(lma.port().adc_running());

    // The first window after the count may span the pause in phase processing.
    lma.measurements_ready(id);
    wait_for_window(&lma, id);
    wait_for_window(&lma, id);
    let m = lma.measurements(id).unwrap();
    assert!(close(m.fline, 50.0, 0.002), "fline {}", m.fline);
    assert!(close(m.vrms, 230.0, 0.01), "vrms {}", m.vrms);

    lma.stop();
    driver.stop();
}

#[test]
fn lagging_current_gives_negative_angle_correction() {
    let params = SignalParams {
        phase_shift: -2.0,
        ..Default::default()
    };
    let (lma, id, driver) = running_engine(params);

    let calib = calibrate(&lma, id);

    assert!(calib.vi_phase_correction < -0.5, "correction {}", calib.vi_phase_correction);
    assert!(calib.vi_phase_correction > -2.5, "correction {}", calib.vi_phase_correction);

    lma.stop();
    driver.stop();
}
