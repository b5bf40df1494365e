//! Annealing of the exponent of importance weights.
use crate::{
    error::{ReplayBufferError, Result},
    replay_buffer::PerConfig,
};

/// Linear schedule of the exponent $\beta$ of importance weights.
///
/// $\beta$ moves from `beta_0` to `beta_final` over `n_opts_final` priority
/// updates and stays at `beta_final` afterwards. Both ends are finite and
/// non-negative, so the scheduled value never needs clamping.
///
/// ```rust
/// use border_replay::IwScheduler;
///
/// let mut scheduler = IwScheduler::new(0.4, 1.0, 2).unwrap();
/// scheduler.step();
/// assert!((scheduler.beta() - 0.7).abs() < 1e-6);
/// assert!(IwScheduler::new(-0.1, 1.0, 2).is_err());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct IwScheduler {
    beta_0: f32,
    beta_final: f32,
    n_opts_final: usize,
    n_opts: usize,
}

impl IwScheduler {
    /// Creates a schedule starting at its first step.
    pub fn new(beta_0: f32, beta_final: f32, n_opts_final: usize) -> Result<Self> {
        for (name, beta) in [("beta_0", beta_0), ("beta_final", beta_final)] {
            if !(beta.is_finite() && beta >= 0.0) {
                return Err(ReplayBufferError::Configuration(format!(
                    "{} must be finite and non-negative, got {}",
                    name, beta
                )));
            }
        }

        Ok(Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        })
    }

    /// Creates the schedule given by `beta_0`, `beta_final` and `n_opts_final`
    /// of a PER configuration.
    pub fn from_config(config: &PerConfig) -> Result<Self> {
        Self::new(config.beta_0, config.beta_final, config.n_opts_final)
    }

    /// Exponent of importance weights at the current step.
    pub fn beta(&self) -> f32 {
        if self.n_opts >= self.n_opts_final {
            return self.beta_final;
        }
        let progress = self.n_opts as f32 / self.n_opts_final as f32;
        self.beta_0 + (self.beta_final - self.beta_0) * progress
    }

    /// Number of steps taken so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Advances the schedule by one priority update.
    pub fn step(&mut self) {
        self.n_opts = self.n_opts.saturating_add(1);
    }

    /// Goes back to the first step.
    pub fn reset(&mut self) {
        self.n_opts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_schedule() {
        let mut s = IwScheduler::new(0.4, 1.0, 4).unwrap();
        assert_eq!(s.beta(), 0.4);
        s.step();
        s.step();
        assert!((s.beta() - 0.7).abs() < 1e-6);
        s.step();
        s.step();
        assert_eq!(s.beta(), 1.0);
        s.step();
        assert_eq!(s.beta(), 1.0);
        assert_eq!(s.n_opts(), 5);
        s.reset();
        assert_eq!(s.beta(), 0.4);
    }

    #[test]
    fn test_decreasing_schedule() {
        let mut s = IwScheduler::new(1.0, 0.0, 2).unwrap();
        s.step();
        assert!((s.beta() - 0.5).abs() < 1e-6);
        s.step();
        assert_eq!(s.beta(), 0.0);
    }

    #[test]
    fn test_zero_length_schedule() {
        let s = IwScheduler::new(0.4, 1.0, 0).unwrap();
        assert_eq!(s.beta(), 1.0);
    }

    #[test]
    fn test_invalid_betas_are_rejected() {
        for (beta_0, beta_final) in [
            (-0.1, 1.0),
            (0.4, -1.0),
            (f32::NAN, 1.0),
            (0.4, f32::INFINITY),
        ] {
            assert!(matches!(
                IwScheduler::new(beta_0, beta_final, 10),
                Err(ReplayBufferError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_from_config() {
        let config = PerConfig::default().beta_0(0.2).beta_final(0.6).n_opts_final(2);
        let mut s = IwScheduler::from_config(&config).unwrap();
        assert!((s.beta() - 0.2).abs() < 1e-6);
        s.step();
        assert!((s.beta() - 0.4).abs() < 1e-6);
        assert!(IwScheduler::from_config(&PerConfig::default().beta_0(-1.0)).is_err());
    }
}
