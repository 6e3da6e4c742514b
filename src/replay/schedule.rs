//! Linear annealing of the importance-sampling exponent.

/// Beta schedule: `beta_start` at frame 0, rising linearly to 1.0 at `beta_frames`
#[derive(Debug, Clone, PartialEq)]
pub struct BetaSchedule {
    beta_start: f64,
    beta_frames: u64,
    frames: u64,
    beta: f64,
}

impl BetaSchedule {
    pub fn new(beta_start: f64, beta_frames: u64) -> Self {
        Self {
            beta_start,
            beta_frames,
            frames: 0,
            beta: beta_start,
        }
    }

    /// Resume a schedule from persisted state
    pub fn resume(beta_start: f64, beta_frames: u64, frames: u64, beta: f64) -> Self {
        Self {
            beta_start,
            beta_frames,
            frames,
            beta: beta.clamp(beta_start.min(1.0), 1.0),
        }
    }

    /// Current exponent
    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Take one annealing step and return the new beta
    pub fn advance(&mut self) -> f64 {
        self.frames = self.frames.saturating_add(1);
        self.beta = if self.beta_frames == 0 || self.frames >= self.beta_frames {
            1.0
        } else {
            let progress = self.frames as f64 / self.beta_frames as f64;
            (self.beta_start + (1.0 - self.beta_start) * progress).min(1.0)
        };
        self.beta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_annealing() {
        let mut schedule = BetaSchedule::new(0.4, 4);
        assert_eq!(schedule.beta(), 0.4);

        schedule.advance();
        assert!((schedule.beta() - 0.55).abs() < 1e-12);
        schedule.advance();
        assert!((schedule.beta() - 0.7).abs() < 1e-12);
        schedule.advance();
        schedule.advance();
        assert_eq!(schedule.beta(), 1.0);

        schedule.advance();
        assert_eq!(schedule.beta(), 1.0);
        assert_eq!(schedule.frames(), 5);
    }

    #[test]
    fn test_zero_frames_jumps_to_one() {
        let mut schedule = BetaSchedule::new(0.5, 0);
        assert_eq!(schedule.advance(), 1.0);
    }

    #[test]
    fn test_resume() {
        let schedule = BetaSchedule::resume(0.4, 100, 50, 0.7);
        assert_eq!(schedule.frames(), 50);
        assert_eq!(schedule.beta(), 0.7);
    }
}
