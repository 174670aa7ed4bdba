/// Who imposed a step size limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintType {
    Navigator = 0,
    Aborter = 1,
    User = 2,
}

/// Step size as the smallest of several independent limits.
///
/// Limits are stored as magnitudes. The stepper applies the navigation
/// direction when it takes the step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstrainedStep {
    values: [f64; 3],
}

impl ConstrainedStep {
    pub fn new(value: f64) -> Self {
        let mut values = [f64::MAX; 3];
        values[ConstraintType::User as usize] = value.abs();
        Self { values }
    }

    pub fn value(&self) -> f64 {
        self.values.iter().copied().fold(f64::MAX, f64::min)
    }

    pub fn value_of(&self, constraint: ConstraintType) -> f64 {
        self.values[constraint as usize]
    }

    /// Tighten a limit. With `release` the previous limit is dropped first.
    pub fn update(&mut self, value: f64, constraint: ConstraintType, release: bool) {
        let slot = &mut self.values[constraint as usize];
        if release {
            *slot = f64::MAX;
        }
        *slot = slot.min(value.abs());
    }

    pub fn release(&mut self, constraint: ConstraintType) {
        self.values[constraint as usize] = f64::MAX;
    }
}

impl Default for ConstrainedStep {
    fn default() -> Self {
        Self::new(f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smallest_limit_wins() {
        let mut step = ConstrainedStep::new(-100.0);
        assert_eq!(step.value(), 100.0);

        step.update(40.0, ConstraintType::Navigator, false);
        step.update(-60.0, ConstraintType::Aborter, false);
        assert_eq!(step.value(), 40.0);

        step.release(ConstraintType::Navigator);
        assert_eq!(step.value(), 60.0);
    }

    #[test]
    fn test_update_with_release_can_widen() {
        let mut step = ConstrainedStep::new(1000.0);
        step.update(10.0, ConstraintType::Navigator, false);
        step.update(20.0, ConstraintType::Navigator, false);
        assert_eq!(step.value_of(ConstraintType::Navigator), 10.0);

        step.update(20.0, ConstraintType::Navigator, true);
        assert_eq!(step.value_of(ConstraintType::Navigator), 20.0);
    }
}
