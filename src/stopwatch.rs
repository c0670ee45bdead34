//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Elapsed-time stopwatch.
//!

/// Monotonic elapsed-time stopwatch used for the status refresh gate and the
/// unsolicited-data watchdog.
pub struct Stopwatch {
    started: std::time::Instant
}

impl Stopwatch {
    pub fn new() -> Stopwatch {
        Stopwatch{ started: std::time::Instant::now() }
    }

    pub fn reset(&mut self) {
        self.started = std::time::Instant::now();
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Moves the start time into the past; lets tests exercise timeout paths
    /// without sleeping.
    #[cfg(test)]
    pub fn backdate(&mut self, seconds: u64) {
        self.started -= std::time::Duration::from_secs(seconds);
    }
}

impl Default for Stopwatch {
    fn default() -> Stopwatch { Stopwatch::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_new_stopwatch_elapsed_is_small() {
        let sw = Stopwatch::new();
        assert!(sw.elapsed_seconds() < 1.0);
    }

    #[test]
    fn given_backdated_stopwatch_elapsed_reflects_it() {
        let mut sw = Stopwatch::new();
        sw.backdate(40);
        assert!(sw.elapsed_seconds() >= 40.0);

        sw.reset();
        assert!(sw.elapsed_seconds() < 1.0);
    }
}
