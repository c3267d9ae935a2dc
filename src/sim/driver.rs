use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::lma::error::LmaError;
use crate::lma::port::{ImpulseLed, PhaseShift90, Port};
use crate::lma::processing::Lma;
use crate::lma::types::{PhaseInputs, MAX_PHASES};
use crate::sim::generate_signal::Waveform;

/// Port backed by atomics; the driver thread plays the role of the interrupt controller.
#[derive(Debug, Default)]
pub struct SimPort {
    adc: AtomicBool,
    tmr: AtomicBool,
    rtc: AtomicBool,
    leds: [AtomicBool; 3],
    impulses: [AtomicU64; 3],
}

impl SimPort {
    pub fn adc_running(&self) -> bool {
        self.adc.load(Ordering::Acquire)
    }

    pub fn tmr_running(&self) -> bool {
        self.tmr.load(Ordering::Acquire)
    }

    pub fn rtc_running(&self) -> bool {
        self.rtc.load(Ordering::Acquire)
    }

    pub fn led_on(&self, led: ImpulseLed) -> bool {
        self.leds[led.index()].load(Ordering::Acquire)
    }

    /// Impulses emitted on `led` since creation.
    pub fn impulse_count(&self, led: ImpulseLed) -> u64 {
        self.impulses[led.index()].load(Ordering::Acquire)
    }
}

impl Port for SimPort {
    fn adc_start(&self) {
        self.adc.store(true, Ordering::Release);
    }

    fn adc_stop(&self) {
        self.adc.store(false, Ordering::Release);
    }

    fn tmr_start(&self) {
        self.tmr.store(true, Ordering::Release);
    }

    fn tmr_stop(&self) {
        self.tmr.store(false, Ordering::Release);
    }

    fn rtc_start(&self) {
        self.rtc.store(true, Ordering::Release);
    }

    fn rtc_stop(&self) {
        self.rtc.store(false, Ordering::Release);
    }

    fn impulse_on(&self, led: ImpulseLed) {
        self.leds[led.index()].store(true, Ordering::Release);
        self.impulses[led.index()].fetch_add(1, Ordering::AcqRel);
    }

    fn impulse_off(&self, led: ImpulseLed) {
        self.leds[led.index()].store(false, Ordering::Release);
    }

    fn idle(&self) {
        thread::yield_now();
    }
}

/// Interrupt timing of the simulation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub fs: f64,         // ADC sampling frequency
    pub rtc_period: f64, // Seconds between RTC interrupts
    pub tmr_period: f64, // Seconds between timer interrupts
    pub realtime: bool,  // Pace the samples against the wall clock
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fs: 3906.25,
            rtc_period: 1.0,
            tmr_period: 0.01,
            realtime: false,
        }
    }
}

/// Background thread feeding a waveform into the engine callbacks.
///
/// Every tick is one ADC period. The RTC and timer fire on their own periods
/// whenever the engine has them running; the ADC callback only sees the tick
/// while the ADC is running.
pub struct Driver {
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    /// Fails when the quarter cycle delay of the waveform does not fit the V90 delay line.
    pub fn spawn(
        lma: Arc<Lma<SimPort>>,
        mut waveform: Waveform,
        config: DriverConfig,
    ) -> Result<Driver, LmaError> {
        let params = *waveform.params();
        let phases = params.num_phases.min(MAX_PHASES);
        let mut shifters = (0..phases)
            .map(|_| PhaseShift90::new(config.fs as f32, params.fline as f32))
            .collect::<Result<Vec<_>, _>>()?;

        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));

        let thread_stop = stop.clone();
        let thread_ticks = ticks.clone();
        let handle = thread::spawn(move || {
            let mut inputs = [PhaseInputs::default(); MAX_PHASES];

            let rtc_every = config.fs * config.rtc_period;
            let tmr_every = config.fs * config.tmr_period;
            let pace_every = (config.fs / params.fline).max(1.0) as u64;
            let mut next_rtc = rtc_every;
            let mut next_tmr = tmr_every;
            let started = Instant::now();
            let mut tick: u64 = 0;

            log::debug!(
                "Driver started: {} phase(s), fs {:.2} Hz, realtime {}",
                phases,
                config.fs,
                config.realtime
            );

            while !thread_stop.load(Ordering::Acquire) {
                let now = tick as f64;
                if now >= next_rtc {
                    next_rtc += rtc_every;
                    if lma.port().rtc_running() {
                        lma.on_rtc();
                    }
                }
                if now >= next_tmr {
                    next_tmr += tmr_every;
                    if lma.port().tmr_running() {
                        lma.on_timer();
                    }
                }

                let channels = inputs.iter_mut().zip(shifters.iter_mut());
                for (phase, (input, shifter)) in channels.enumerate() {
                    let (v, i) = waveform.sample(tick, phase);
                    *input = PhaseInputs {
                        v_sample: v,
                        v90_sample: shifter.shift(v),
                        i_sample: i,
                        n_sample: i,
                    };
                }
                if lma.port().adc_running() {
                    lma.on_adc(&inputs[..phases]);
                }

                tick += 1;
                thread_ticks.store(tick, Ordering::Release);

                if config.realtime && tick % pace_every == 0 {
                    let due = started + Duration::from_secs_f64(tick as f64 / config.fs);
                    let now = Instant::now();
                    if due > now {
                        spin_sleep::sleep(due - now);
                    }
                }
            }

            log::debug!("Driver stopped after {} ticks", tick);
        });

        Ok(Driver {
            stop,
            ticks,
            handle: Some(handle),
        })
    }

    /// ADC periods simulated so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Stops the thread and returns the number of simulated ticks.
    pub fn stop(mut self) -> u64 {
        self.shutdown();
        self.ticks()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Driver thread panicked");
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
