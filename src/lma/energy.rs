use crate::lma::port::{ImpulseLed, Port};
use crate::lma::types::{EnergyUnit, SECONDS_PER_HOUR};

/// One register per energy category.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EnergyRegisters<T> {
    pub act_imp: T,
    pub act_exp: T,
    pub app_imp: T,
    pub app_exp: T,
    pub c_react_imp: T,
    pub c_react_exp: T,
    pub l_react_imp: T,
    pub l_react_exp: T,
}

/// Energy in Wh per category.
pub type ConsumptionData = EnergyRegisters<f32>;

/// Impulse LED with its on-time counter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LedState {
    pub on: bool,
    pub counter: u32,
}

/// Impulse output configuration and state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Impulse {
    /// ADC intervals an LED stays on after a rollover.
    pub led_on_count: u32,
    pub active: LedState,
    pub reactive: LedState,
    pub apparent: LedState,
}

impl Impulse {
    pub fn led(&self, led: ImpulseLed) -> &LedState {
        match led {
            ImpulseLed::Active => &self.active,
            ImpulseLed::Reactive => &self.reactive,
            ImpulseLed::Apparent => &self.apparent,
        }
    }

    fn led_mut(&mut self, led: ImpulseLed) -> &mut LedState {
        match led {
            ImpulseLed::Active => &mut self.active,
            ImpulseLed::Reactive => &mut self.reactive,
            ImpulseLed::Apparent => &mut self.apparent,
        }
    }

    /*
    * @brief Turn an LED on and restart its on-time.
    */
    fn trigger<P: Port>(&mut self, port: &P, led: ImpulseLed) {
        let state = self.led_mut(led);
        state.on = true;
        state.counter = 0;
        port.impulse_on(led);
    }

    /*
    * @brief Advance the on-time of every lit LED, turning off the expired ones.
    */
    fn decay<P: Port>(&mut self, port: &P) {
        let led_on_count = self.led_on_count;
        for led in ImpulseLed::ALL {
            let state = self.led_mut(led);
            if state.on {
                state.counter += 1;
                if state.counter > led_on_count {
                    state.on = false;
                    port.impulse_off(led);
                }
            }
        }
    }
}

/// System wide energy ledger.
///
/// Each accumulator holds the Ws below one meter constant; every full meter
/// constant moves into the matching counter and fires an impulse.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SystemEnergy {
    /// Sum of the per phase energy units, published by the timer callback.
    pub unit: EnergyUnit,
    pub accumulator: EnergyRegisters<f32>,
    pub counter: EnergyRegisters<u64>,
    pub impulse: Impulse,
}

impl SystemEnergy {
    /*
    * @brief Energy stage of the ADC callback.
    * @param port LED hooks
    * @param meter_constant Ws per impulse
    * @note Active import also feeds apparent import; reactive is split into inductive and
    *       capacitive by the sign of the reactive unit. Export registers hold magnitudes.
    */
    pub fn process_interval<P: Port>(&mut self, port: &P, meter_constant: f32) {
        use ImpulseLed::{Active, Apparent, Reactive};

        self.impulse.decay(port);

        let unit = self.unit;
        let acc = &mut self.accumulator;
        let counter = &mut self.counter;
        let impulse = &mut self.impulse;
        let mut book = |acc: &mut f32, counter: &mut u64, unit: f32, led: ImpulseLed| {
            accumulate(acc, counter, unit, meter_constant, impulse, port, led)
        };

        if unit.act >= 0.0 {
            book(&mut acc.act_imp, &mut counter.act_imp, unit.act, Active);
            book(&mut acc.app_imp, &mut counter.app_imp, unit.app, Apparent);

            if unit.react >= 0.0 {
                book(&mut acc.l_react_imp, &mut counter.l_react_imp, unit.react, Reactive);
            } else {
                book(&mut acc.c_react_exp, &mut counter.c_react_exp, -unit.react, Reactive);
            }
        } else {
            book(&mut acc.act_exp, &mut counter.act_exp, -unit.act, Active);
            book(&mut acc.app_exp, &mut counter.app_exp, unit.app, Apparent);

            if unit.react >= 0.0 {
                book(&mut acc.c_react_imp, &mut counter.c_react_imp, unit.react, Reactive);
            } else {
                book(&mut acc.l_react_exp, &mut counter.l_react_exp, -unit.react, Reactive);
            }
        }
    }

    /// True when every accumulator holds less than one meter constant.
    pub fn is_within(&self, meter_constant: f32) -> bool {
        let acc = &self.accumulator;
        [
            acc.act_imp,
            acc.act_exp,
            acc.app_imp,
            acc.app_exp,
            acc.c_react_imp,
            acc.c_react_exp,
            acc.l_react_imp,
            acc.l_react_exp,
        ]
        .iter()
        .all(|value| (0.0..meter_constant).contains(value))
    }

    /*
    * @brief Convert the ledger into Wh per category.
    * @param meter_constant Ws per counter tick
    */
    pub fn consumption(&self, meter_constant: f32) -> ConsumptionData {
        let wh = |counter: u64, acc: f32| {
            (counter as f32 * meter_constant + acc) / SECONDS_PER_HOUR
        };

        ConsumptionData {
            act_imp: wh(self.counter.act_imp, self.accumulator.act_imp),
            act_exp: wh(self.counter.act_exp, self.accumulator.act_exp),
            app_imp: wh(self.counter.app_imp, self.accumulator.app_imp),
            app_exp: wh(self.counter.app_exp, self.accumulator.app_exp),
            c_react_imp: wh(self.counter.c_react_imp, self.accumulator.c_react_imp),
            c_react_exp: wh(self.counter.c_react_exp, self.accumulator.c_react_exp),
            l_react_imp: wh(self.counter.l_react_imp, self.accumulator.l_react_imp),
            l_react_exp: wh(self.counter.l_react_exp, self.accumulator.l_react_exp),
        }
    }
}

/*
* @brief Book one interval of energy into a register.
* @note Whole meter constants move into the counter in one step and fire the LED once.
*       Non-finite units are dropped.
*/
fn accumulate<P: Port>(
    acc: &mut f32,
    counter: &mut u64,
    unit: f32,
    meter_constant: f32,
    impulse: &mut Impulse,
    port: &P,
    led: ImpulseLed,
) {
    if !unit.is_finite() {
        return;
    }

    *acc += unit;
    if *acc >= meter_constant {
        let quanta = (*acc / meter_constant).floor();
        *counter = counter.saturating_add(quanta as u64);

        let rest = *acc - quanta * meter_constant;
        *acc = if (0.0..meter_constant).contains(&rest) { rest } else { 0.0 };
        impulse.trigger(port, led);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct LedPort {
        events: RefCell<Vec<(ImpulseLed, bool)>>,
    }

    impl Port for LedPort {
        fn adc_start(&self) {}
        fn adc_stop(&self) {}
        fn tmr_start(&self) {}
        fn tmr_stop(&self) {}
        fn rtc_start(&self) {}
        fn rtc_stop(&self) {}

        fn impulse_on(&self, led: ImpulseLed) {
            self.events.borrow_mut().push((led, true));
        }

        fn impulse_off(&self, led: ImpulseLed) {
            self.events.borrow_mut().push((led, false));
        }
    }

    fn ledger(act: f32, react: f32, app: f32) -> SystemEnergy {
        SystemEnergy {
            unit: EnergyUnit { act, app, react },
            impulse: Impulse {
                led_on_count: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn inductive_import_quadrant() {
        let port = LedPort::default();
        let mut energy = ledger(1.0, 0.5, 1.25);
        energy.process_interval(&port, 100.0);

        assert_eq!(energy.accumulator.act_imp, 1.0);
        assert_eq!(energy.accumulator.app_imp, 1.25);
        assert_eq!(energy.accumulator.l_react_imp, 0.5);
        assert_eq!(energy.accumulator.c_react_exp, 0.0);
        assert_eq!(energy.accumulator.act_exp, 0.0);
    }

    #[test]
    fn capacitive_export_quadrant() {
        let port = LedPort::default();
        let mut energy = ledger(1.0, -0.5, 1.25);
        energy.process_interval(&port, 100.0);

        assert_eq!(energy.accumulator.act_imp, 1.0);
        assert_eq!(energy.accumulator.c_react_exp, 0.5);
        assert_eq!(energy.accumulator.l_react_imp, 0.0);
    }

    #[test]
    fn capacitive_import_quadrant() {
        let port = LedPort::default();
        let mut energy = ledger(-1.0, 0.5, 1.25);
        energy.process_interval(&port, 100.0);

        assert_eq!(energy.accumulator.act_exp, 1.0);
        assert_eq!(energy.accumulator.app_exp, 1.25);
        assert_eq!(energy.accumulator.c_react_imp, 0.5);
        assert_eq!(energy.accumulator.act_imp, 0.0);
        assert_eq!(energy.accumulator.app_imp, 0.0);
    }

    #[test]
    fn inductive_export_quadrant() {
        let port = LedPort::default();
        let mut energy = ledger(-1.0, -0.5, 1.25);
        energy.process_interval(&port, 100.0);

        assert_eq!(energy.accumulator.act_exp, 1.0);
        assert_eq!(energy.accumulator.l_react_exp, 0.5);
    }

    #[test]
    fn rollover_fires_impulse_and_led_decays() {
        let port = LedPort::default();
        let mut energy = ledger(1.5, 0.0, 0.0);

        energy.process_interval(&port, 2.0);
        assert!(port.events.borrow().is_empty());

        energy.process_interval(&port, 2.0);
        assert_eq!(energy.counter.act_imp, 1);
        assert_eq!(energy.accumulator.act_imp, 1.0);
        assert!(energy.impulse.active.on);
        assert_eq!(*port.events.borrow(), vec![(ImpulseLed::Active, true)]);

        energy.unit = EnergyUnit::default();
        energy.process_interval(&port, 2.0);
        energy.process_interval(&port, 2.0);
        assert!(energy.impulse.active.on);
        energy.process_interval(&port, 2.0);
        assert!(!energy.impulse.active.on);
        assert_eq!(
            *port.events.borrow(),
            vec![(ImpulseLed::Active, true), (ImpulseLed::Active, false)]
        );
    }

    #[test]
    fn apparent_export_drives_apparent_led() {
        let port = LedPort::default();
        let mut energy = ledger(-1.0, 0.0, 3.0);
        energy.process_interval(&port, 2.0);

        assert_eq!(energy.counter.app_exp, 1);
        assert!(energy.impulse.apparent.on);
        assert!(!energy.impulse.active.on);
    }

    #[test]
    fn ledger_matches_integrated_energy() {
        let port = LedPort::default();
        let units = [0.5, 1.25, -0.75, 2.0, 0.25, -1.5];
        let meter_constant = 4.0;
        let mut energy = ledger(0.0, 0.0, 0.0);
        let mut imported = 0.0;
        let mut exported = 0.0;

        for round in 0..200 {
            let act = units[round % units.len()];
            energy.unit = EnergyUnit { act, app: act.abs(), react: act / 2.0 };
            energy.process_interval(&port, meter_constant);

            if act >= 0.0 {
                imported += act;
            } else {
                exported -= act;
            }

            assert!(energy.is_within(meter_constant));
        }

        let total_imp = energy.counter.act_imp as f32 * meter_constant + energy.accumulator.act_imp;
        let total_exp = energy.counter.act_exp as f32 * meter_constant + energy.accumulator.act_exp;
        assert_eq!(total_imp, imported);
        assert_eq!(total_exp, exported);
    }

    #[test]
    fn large_unit_rolls_over_repeatedly() {
        let port = LedPort::default();
        let mut energy = ledger(9.0, 0.0, 0.0);
        energy.process_interval(&port, 4.0);

        assert_eq!(energy.counter.act_imp, 2);
        assert_eq!(energy.accumulator.act_imp, 1.0);
    }

    #[test]
    fn huge_accumulator_rolls_over_in_one_step() {
        let port = LedPort::default();
        let mut energy = ledger(1.0, 0.0, 0.0);
        energy.accumulator.act_imp = 1e12;
        energy.process_interval(&port, 10.0);

        assert!(energy.counter.act_imp > 90_000_000_000);
        assert!(energy.is_within(10.0));
        assert!(energy.impulse.active.on);
    }

    #[test]
    fn non_finite_unit_is_not_booked() {
        let port = LedPort::default();
        let mut energy = ledger(f32::INFINITY, f32::NAN, f32::INFINITY);
        energy.process_interval(&port, 10.0);

        assert_eq!(energy.accumulator, EnergyRegisters::default());
        assert_eq!(energy.counter, EnergyRegisters::default());
        assert!(port.events.borrow().is_empty());
    }

    #[test]
    fn consumption_in_watt_hours() {
        let mut energy = SystemEnergy::default();
        energy.counter.act_imp = 2;
        energy.accumulator.act_imp = 1800.0;
        energy.accumulator.l_react_exp = 360.0;
        let consumption = energy.consumption(4500.0);

        assert_eq!(consumption.act_imp, 3.0);
        assert_eq!(consumption.l_react_exp, 0.1);
        assert_eq!(consumption.app_imp, 0.0);
    }
}
