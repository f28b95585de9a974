//! Configuration for the sequential impulse solver.
//!
//! [`ContactSolverInfo`] carries the timestep, iteration count, Baumgarte
//! factors, split-impulse settings and [`SolverMode`] flags for one solve.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Solver behavior switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct SolverMode: u32 {
        /// Reshuffle contact and friction rows every 8th iteration.
        const RANDOMIZE_ORDER = 0b0000_0001;
        /// Seed accumulated impulses from the previous frame.
        const USE_WARMSTARTING = 0b0000_0100;
        /// Use the pooled solver-body/row path instead of per-point resolution.
        const CACHE_FRIENDLY = 0b0000_1000;
    }
}

impl Default for SolverMode {
    fn default() -> Self {
        Self::RANDOMIZE_ORDER | Self::CACHE_FRIENDLY | Self::USE_WARMSTARTING
    }
}

/// Parameters for one constraint solve.
///
/// # Example
///
/// ```
/// use sim_types::{ContactSolverInfo, SolverMode};
///
/// let info = ContactSolverInfo::default()
///     .with_time_step(1.0 / 120.0)
///     .with_iterations(20)
///     .with_split_impulse(true);
///
/// assert!(info.validate().is_ok());
/// assert!(info.solver_mode.contains(SolverMode::USE_WARMSTARTING));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactSolverInfo {
    /// Position correction factor for point-to-point style constraints.
    pub tau: f64,
    /// Relaxation applied to Jacobian diagonals and warm-start impulses on
    /// the per-point path.
    pub damping: f64,
    /// Default friction coefficient.
    pub friction: f64,
    /// Timestep of the step being solved (seconds).
    pub time_step: f64,
    /// Default restitution coefficient.
    pub restitution: f64,
    /// Number of Gauss-Seidel sweeps.
    pub num_iterations: usize,
    /// Upper bound on positional error reduction per step.
    pub max_error_reduction: f64,
    /// Successive over-relaxation factor.
    pub sor: f64,
    /// Baumgarte error reduction parameter for velocity rows.
    pub erp: f64,
    /// Error reduction parameter for the split-impulse pass.
    pub erp2: f64,
    /// Resolve deep penetration with pseudo-velocities instead of real ones.
    pub split_impulse: bool,
    /// Penetration (negative distance) beyond which split impulse takes over.
    pub split_impulse_penetration_threshold: f64,
    /// Allowed penetration before positional correction starts.
    pub linear_slop: f64,
    /// Scale applied to last frame's impulses when warm starting.
    pub warmstarting_factor: f64,
    /// Behavior flags.
    pub solver_mode: SolverMode,
}

impl Default for ContactSolverInfo {
    fn default() -> Self {
        Self {
            tau: 0.6,
            damping: 1.0,
            friction: 0.3,
            time_step: 1.0 / 60.0,
            restitution: 0.0,
            num_iterations: 10,
            max_error_reduction: 20.0,
            sor: 1.3,
            erp: 0.2,
            erp2: 0.1,
            split_impulse: false,
            split_impulse_penetration_threshold: -0.02,
            linear_slop: 0.0,
            warmstarting_factor: 0.85,
            solver_mode: SolverMode::default(),
        }
    }
}

impl ContactSolverInfo {
    /// Fast settings for interactive use: 4 sweeps, fixed row order.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            num_iterations: 4,
            solver_mode: SolverMode::CACHE_FRIENDLY | SolverMode::USE_WARMSTARTING,
            ..Default::default()
        }
    }

    /// More sweeps and split-impulse penetration recovery.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            num_iterations: 30,
            split_impulse: true,
            ..Default::default()
        }
    }

    /// Default settings without row randomization, for reproducible runs.
    #[must_use]
    pub fn deterministic() -> Self {
        Self::default().with_mode(SolverMode::CACHE_FRIENDLY | SolverMode::USE_WARMSTARTING)
    }

    /// Set the timestep.
    #[must_use]
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Set the number of iterations.
    #[must_use]
    pub fn with_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Enable or disable split impulse.
    #[must_use]
    pub fn with_split_impulse(mut self, enabled: bool) -> Self {
        self.split_impulse = enabled;
        self
    }

    /// Replace the solver mode flags.
    #[must_use]
    pub fn with_mode(mut self, mode: SolverMode) -> Self {
        self.solver_mode = mode;
        self
    }

    /// Set the Baumgarte factors.
    #[must_use]
    pub fn with_erp(mut self, erp: f64, erp2: f64) -> Self {
        self.erp = erp;
        self.erp2 = erp2;
        self
    }

    /// Whether a mode flag is set.
    #[must_use]
    pub fn has_mode(&self, mode: SolverMode) -> bool {
        self.solver_mode.contains(mode)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.time_step));
        }

        if self.num_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "num_iterations must be at least 1",
            ));
        }

        if !(0.0..=1.0).contains(&self.erp) || !(0.0..=1.0).contains(&self.erp2) {
            return Err(crate::SimError::invalid_config("erp and erp2 must be in [0, 1]"));
        }

        if !self.warmstarting_factor.is_finite() || !self.damping.is_finite() {
            return Err(crate::SimError::invalid_config(
                "warmstarting_factor and damping must be finite",
            ));
        }

        if self.split_impulse_penetration_threshold > 0.0 {
            return Err(crate::SimError::invalid_config(
                "split_impulse_penetration_threshold must not be positive",
            ));
        }

        Ok(())
    }

    /// Steps per second.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.time_step
    }
}
