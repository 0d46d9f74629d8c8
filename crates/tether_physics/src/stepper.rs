//! # Fixed-Timestep Accumulator
//!
//! Converts irregular wall-clock elapsed time into a whole number of
//! fixed-size simulation steps. The leftover fraction carries over, so
//! the simulation advances at exactly the configured rate on average.
//!
//! A hitch (debugger pause, window drag) could owe hundreds of steps;
//! catching them all up would stall the tick and owe even more next
//! time. Steps owed beyond the cap are forfeited and the accumulator is
//! reset.

/// Accumulates elapsed time and meters out fixed steps.
#[derive(Clone, Copy, Debug)]
pub struct FixedStepper {
    fixed_dt: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedStepper {
    /// Builds a stepper for the given step size and per-tick step cap.
    #[must_use]
    pub fn new(fixed_dt: f32, max_steps: u32) -> Self {
        Self {
            fixed_dt,
            max_steps: max_steps.max(1),
            accumulator: 0.0,
        }
    }

    /// The fixed step size in seconds.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Banks `elapsed` seconds and returns how many fixed steps to run
    /// now. Negative elapsed time (clock weirdness) banks nothing.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        self.accumulator += elapsed.max(0.0);
        let owed = (self.accumulator / self.fixed_dt) as u32;
        if owed > self.max_steps {
            tracing::warn!(
                owed,
                cap = self.max_steps,
                "fell behind real time, forfeiting steps"
            );
            self.accumulator = 0.0;
            return self.max_steps;
        }
        self.accumulator -= owed as f32 * self.fixed_dt;
        owed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn sub_step_elapsed_accumulates_into_a_later_step() {
        let mut stepper = FixedStepper::new(DT, 5);
        assert_eq!(stepper.advance(DT * 0.6), 0);
        assert_eq!(stepper.advance(DT * 0.6), 1);
    }

    #[test]
    fn exact_multiples_yield_exact_step_counts() {
        let mut stepper = FixedStepper::new(DT, 5);
        assert_eq!(stepper.advance(DT * 3.0), 3);
        // The remainder after three steps is ~0, not a fourth step.
        assert_eq!(stepper.advance(0.0), 0);
    }

    #[test]
    fn hitch_is_clamped_and_the_debt_forgiven() {
        let mut stepper = FixedStepper::new(DT, 5);
        assert_eq!(stepper.advance(2.0), 5);
        // The two seconds of debt were dropped, not deferred.
        assert_eq!(stepper.advance(0.0), 0);
        assert_eq!(stepper.advance(DT), 1);
    }

    #[test]
    fn negative_elapsed_banks_nothing() {
        let mut stepper = FixedStepper::new(DT, 5);
        assert_eq!(stepper.advance(-1.0), 0);
        assert_eq!(stepper.advance(DT), 1);
    }

    #[test]
    fn average_rate_matches_fixed_dt() {
        let mut stepper = FixedStepper::new(DT, 8);
        let mut total = 0;
        // Irregular frame times averaging 1/60 should produce ~600
        // steps over 10 simulated seconds.
        for frame in 0..600 {
            let jitter = if frame % 2 == 0 { 0.4 } else { 1.6 };
            total += stepper.advance(DT * jitter);
        }
        assert!((595..=600).contains(&total), "total = {total}");
    }
}
