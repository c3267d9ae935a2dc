use crate::lma::types::Sample;

/// Rising zero-crossing tracker for one channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ZeroCross {
    last_sample: Sample,
    debounce: bool,
    synced: bool,
    count: u32,
}

impl ZeroCross {
    /*
    * @brief Tracker that ignores the first sample it sees.
    * @note Used to prime the angle calibration so that the sample preceding priming cannot fake
    *       a crossing.
    */
    pub fn primed(last_sample: Sample) -> Self {
        Self {
            last_sample,
            debounce: true,
            synced: true,
            count: 0,
        }
    }

    /*
    * @brief Feed a new sample.
    * @param sample New sample
    * @return true if a rising crossing (last <= 0, new > 0) happened on this sample
    * @note A crossing arms a one sample debounce. The first crossing only synchronizes the tracker;
    *       later ones increment the cycle counter.
    */
    pub fn detect(&mut self, sample: Sample) -> bool {
        let crossed = if self.debounce {
            self.debounce = false;
            false
        } else if self.last_sample <= 0 && sample > 0 {
            self.debounce = true;
            if self.synced {
                self.count = self.count.saturating_add(1);
            } else {
                self.synced = true;
            }
            true
        } else {
            false
        };

        self.last_sample = sample;
        crossed
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Line cycles since the tracker synchronized or since the last `restart_count`.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_sample(&self) -> Sample {
        self.last_sample
    }

    pub fn restart_count(&mut self) {
        self.count = 0;
    }
}

/*
* @brief Is the frequency within the tolerance band?
* @param fline Measured line frequency
* @param low Lower bound, inclusive
* @param high Upper bound, inclusive
*/
pub fn is_frequency_in_tolerance(fline: f32, low: f32, high: f32) -> bool {
    fline >= low && fline <= high
}

/*
* @brief Position of a rising crossing inside the sample interval.
* @param last Sample before the crossing
* @param new Sample after the crossing
* @return new / (new - last), or 0 when the previous sample sits on zero
*/
pub fn crossing_fraction(last: Sample, new: Sample) -> f32 {
    if last == 0 {
        return 0.0;
    }
    new as f32 / (new as f32 - last as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(cycles: usize, half: usize) -> impl Iterator<Item = Sample> {
        (0..cycles * 2 * half).map(move |n| if (n / half) % 2 == 0 { -100 } else { 100 })
    }

    #[test]
    fn first_crossing_synchronizes_without_counting() {
        let mut zc = ZeroCross::default();

        assert!(!zc.detect(-5));
        assert!(!zc.is_synced());
        assert!(zc.detect(5));
        assert!(zc.is_synced());
        assert_eq!(zc.count(), 0);
    }

    #[test]
    fn counts_each_rising_crossing_after_sync() {
        let mut zc = ZeroCross::default();
        let crossings = square(6, 10).filter(|&s| zc.detect(s)).count();

        assert_eq!(crossings, 6);
        assert_eq!(zc.count(), 5);
    }

    #[test]
    fn debounce_skips_the_sample_after_a_crossing() {
        let mut zc = ZeroCross::default();
        zc.detect(-1);
        assert!(zc.detect(1));
        // The sample right after a crossing is never checked.
        assert!(!zc.detect(-1));
        assert!(zc.detect(1));
        assert!(!zc.detect(0));
        assert!(zc.detect(1));
    }

    #[test]
    fn count_is_monotonic_until_restart() {
        let mut zc = ZeroCross::default();
        let mut previous = 0;
        for s in square(10, 7) {
            zc.detect(s);
            assert!(zc.count() >= previous);
            previous = zc.count();
        }
        zc.restart_count();
        assert_eq!(zc.count(), 0);
        assert!(zc.is_synced());
    }

    #[test]
    fn primed_tracker_ignores_first_sample() {
        let mut zc = ZeroCross::primed(0);

        assert!(!zc.detect(10));
        assert!(!zc.detect(20));
        assert!(!zc.detect(-20));
        assert!(zc.detect(20));
    }

    #[test]
    fn fraction_of_crossing() {
        assert_eq!(crossing_fraction(-30, 10), 0.25);
        assert_eq!(crossing_fraction(0, 10), 0.0);
    }

    #[test]
    fn tolerance_band_is_inclusive() {
        assert!(is_frequency_in_tolerance(25.0, 25.0, 75.0));
        assert!(is_frequency_in_tolerance(75.0, 25.0, 75.0));
        assert!(!is_frequency_in_tolerance(20.0, 25.0, 75.0));
        assert!(!is_frequency_in_tolerance(80.0, 25.0, 75.0));
    }
}
