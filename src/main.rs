use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use metrology_lma::lma::energy::{Impulse, SystemEnergy};
use metrology_lma::lma::print;
use metrology_lma::lma::{
    Config, GlobalCalibArgs, GlobalCalibration, ImpulseLed, Lma, NeutralCalibration, PhaseCalibArgs,
    Timeout,
};
use metrology_lma::sim::{Driver, DriverConfig, SignalParams, SimPort, Waveform};

/// Line metrology simulator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Runs the metrology engine against a simulated mains",
    long_about = None
)]
struct Args {
    /// RMS voltage of the simulated mains
    #[arg(long, default_value_t = 230.0)]
    vrms: f64,

    /// RMS current of the simulated load
    #[arg(long, default_value_t = 10.0)]
    irms: f64,

    /// Current phase relative to voltage in degrees (lagging is negative)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    phase_shift: f64,

    /// Line frequency
    #[arg(long, default_value_t = 50.0)]
    fline: f64,

    /// ADC sampling frequency
    #[arg(long, default_value_t = 3906.25)]
    fs: f64,

    /// Number of phases, 120 degrees apart
    #[arg(long, default_value_t = 1)]
    phases: usize,

    /// Attach a neutral channel to the first phase
    #[arg(long)]
    neutral: bool,

    /// Random noise in percent of peak
    #[arg(long, default_value_t = 0.0)]
    noise: f64,

    /// Calibrate every phase and the sampling frequency before measuring
    #[arg(short, long)]
    calibrate: bool,

    /// Simulated seconds of measurement
    #[arg(short, long, default_value_t = 5.0)]
    seconds: f64,

    /// Pace the simulation against the wall clock
    #[arg(short, long)]
    realtime: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

const CALIBRATION_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let params = SignalParams {
        fs: args.fs,
        fline: args.fline,
        vrms: args.vrms,
        irms: args.irms,
        phase_shift: args.phase_shift,
        num_phases: args.phases.max(1),
        noise_percent: args.noise,
        ..Default::default()
    };

    let config = Config {
        gcalib: GlobalCalibration::from_sampling(args.fs as f32, args.fline as f32, 25),
        update_interval: 25,
        fline_tol_low: (args.fline / 2.0) as f32,
        fline_tol_high: (args.fline * 1.5) as f32,
        ..Default::default()
    };

    let lma = Arc::new(Lma::new(SimPort::default(), config)?);

    let mut ids = Vec::new();
    for _ in 0..params.num_phases {
        let id = lma.register_phase()?;
        lma.load_calibration(id, &params.ideal_calibration())?;
        ids.push(id);
    }
    if args.neutral {
        let irms_coeff = params.ideal_calibration().irms_coeff;
        lma.register_neutral(ids[0], NeutralCalibration { irms_coeff })?;
    }

    // Impulse LEDs stay lit for 10 ms.
    lma.energy_set(&SystemEnergy {
        impulse: Impulse {
            led_on_count: (0.01 * args.fs) as u32,
            ..Default::default()
        },
        ..Default::default()
    })?;

    let driver_config = DriverConfig {
        fs: args.fs,
        realtime: args.realtime,
        ..Default::default()
    };
    let driver = Driver::spawn(lma.clone(), Waveform::new(params, 0x4c4d41), driver_config)?;

    lma.start();

    if args.calibrate {
        for &id in &ids {
            let calib = lma.phase_calibrate(
                &PhaseCalibArgs {
                    phase: id,
                    vrms_tgt: args.vrms as f32,
                    irms_tgt: args.irms as f32,
                    line_cycles: 25,
                },
                Timeout::new(CALIBRATION_TIMEOUT),
            )?;
            print::print_calibration(id.index(), &calib);
        }

        let gcalib = lma.global_calibrate(
            &GlobalCalibArgs {
                rtc_period: driver_config.rtc_period as f32,
                fline_target: args.fline as f32,
                rtc_cycles: 3,
            },
            Timeout::new(CALIBRATION_TIMEOUT),
        )?;
        print::print_global_calibration(&gcalib);
    }

    let start = driver.ticks();
    let target = start + (args.seconds * args.fs) as u64;
    let poll = if args.realtime {
        Duration::from_millis(100)
    } else {
        Duration::from_millis(1)
    };
    let mut reported = 0u64;
    let report_every = args.fs as u64;

    while driver.ticks() < target {
        thread::sleep(poll);

        if driver.ticks() - start < reported + report_every {
            continue;
        }
        reported += report_every;

        for &id in &ids {
            if lma.measurements_ready(id) {
                print::print_measurements(id.index(), &lma.measurements(id)?);
                print::print_status(id.index(), lma.status(id)?);
            }
        }
        if args.neutral {
            print::print_neutral(ids[0].index(), lma.irms_neutral(ids[0])?);
        }
    }

    lma.stop();
    let ticks = driver.stop();

    let energy = lma.energy_get();
    print::print_consumption(&lma.consumption_data(&energy));
    log::info!(
        "Simulated {:.2} s, {} active impulse(s), active LED {}",
        ticks as f64 / args.fs,
        lma.port().impulse_count(ImpulseLed::Active),
        if energy.impulse.led(ImpulseLed::Active).on { "on" } else { "off" }
    );

    lma.deinit();
    Ok(())
}
