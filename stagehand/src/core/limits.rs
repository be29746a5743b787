//! Resource ceilings for the implement loop.
//!
//! The tracker lives for one implement-phase call and is never persisted. Checks run
//! between agent invocations; the agent backend enforces its own per-call timeout.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configured ceilings (`[limits]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_iterations: u32,
    pub max_duration_secs: u64,
    pub max_progress_steps: u64,
    /// Optional spend ceiling; unchecked when `None`.
    pub max_budget_usd: Option<f64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_duration_secs: 4 * 60 * 60,
            max_progress_steps: 10_000,
            max_budget_usd: None,
        }
    }
}

/// Counters accumulated during one implement-phase call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitsContext {
    pub iterations: u32,
    pub elapsed_secs: u64,
    pub progress_steps: u64,
    pub spent_usd: f64,
}

/// A ceiling that was reached.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitExceeded {
    #[error("limit exceeded: max iterations reached ({used} of {max})")]
    Iterations { used: u32, max: u32 },
    #[error("limit exceeded: max duration reached ({used}s of {max}s)")]
    Duration { used: u64, max: u64 },
    #[error("limit exceeded: max progress steps reached ({used} of {max})")]
    ProgressSteps { used: u64, max: u64 },
    #[error("limit exceeded: max budget reached (${used:.2} of ${max:.2})")]
    Budget { used: f64, max: f64 },
}

/// Check every ceiling against the counters. Iterations are checked first.
pub fn check_limits(limits: &Limits, ctx: &LimitsContext) -> Result<(), LimitExceeded> {
    if ctx.iterations >= limits.max_iterations {
        return Err(LimitExceeded::Iterations {
            used: ctx.iterations,
            max: limits.max_iterations,
        });
    }
    if ctx.elapsed_secs >= limits.max_duration_secs {
        return Err(LimitExceeded::Duration {
            used: ctx.elapsed_secs,
            max: limits.max_duration_secs,
        });
    }
    if ctx.progress_steps >= limits.max_progress_steps {
        return Err(LimitExceeded::ProgressSteps {
            used: ctx.progress_steps,
            max: limits.max_progress_steps,
        });
    }
    if let Some(max) = limits.max_budget_usd
        && ctx.spent_usd >= max
    {
        return Err(LimitExceeded::Budget {
            used: ctx.spent_usd,
            max,
        });
    }
    Ok(())
}

/// Wall-clock aware wrapper around [`LimitsContext`].
#[derive(Debug, Clone)]
pub struct LimitsTracker {
    limits: Limits,
    started: Instant,
    ctx: LimitsContext,
}

impl LimitsTracker {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            ctx: LimitsContext::default(),
        }
    }

    /// Record one finished agent iteration.
    pub fn record_iteration(&mut self, progress_steps: u64, cost_usd: Option<f64>) {
        self.ctx.iterations += 1;
        self.ctx.progress_steps += progress_steps;
        self.ctx.spent_usd += cost_usd.unwrap_or(0.0);
        self.ctx.elapsed_secs = self.started.elapsed().as_secs();
    }

    pub fn check(&self) -> Result<(), LimitExceeded> {
        check_limits(&self.limits, &self.ctx)
    }

    /// Like [`check`](Self::check) but only enforces the iteration ceiling.
    pub fn check_iterations_only(&self) -> Result<(), LimitExceeded> {
        let limits = Limits {
            max_iterations: self.limits.max_iterations,
            max_duration_secs: u64::MAX,
            max_progress_steps: u64::MAX,
            max_budget_usd: None,
        };
        check_limits(&limits, &self.ctx)
    }

    pub fn context(&self) -> &LimitsContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits {
            max_iterations: 3,
            max_duration_secs: 60,
            max_progress_steps: 10,
            max_budget_usd: Some(1.5),
        }
    }

    #[test]
    fn within_limits_passes() {
        let ctx = LimitsContext {
            iterations: 2,
            elapsed_secs: 59,
            progress_steps: 9,
            spent_usd: 1.0,
        };
        assert!(check_limits(&limits(), &ctx).is_ok());
    }

    #[test]
    fn iteration_ceiling_names_max_iterations() {
        let ctx = LimitsContext {
            iterations: 3,
            ..LimitsContext::default()
        };
        let err = check_limits(&limits(), &ctx).expect_err("limit");
        assert_eq!(err, LimitExceeded::Iterations { used: 3, max: 3 });
        assert!(err.to_string().contains("max iterations"));
    }

    #[test]
    fn duration_progress_and_budget_ceilings() {
        let base = LimitsContext::default();
        let err = check_limits(
            &limits(),
            &LimitsContext {
                elapsed_secs: 60,
                ..base.clone()
            },
        )
        .expect_err("duration");
        assert!(matches!(err, LimitExceeded::Duration { .. }));

        let err = check_limits(
            &limits(),
            &LimitsContext {
                progress_steps: 10,
                ..base.clone()
            },
        )
        .expect_err("progress");
        assert!(matches!(err, LimitExceeded::ProgressSteps { .. }));

        let err = check_limits(
            &limits(),
            &LimitsContext {
                spent_usd: 2.0,
                ..base
            },
        )
        .expect_err("budget");
        assert!(err.to_string().contains("budget"));
    }

    #[test]
    fn budget_is_ignored_when_unset() {
        let limits = Limits {
            max_budget_usd: None,
            ..limits()
        };
        let ctx = LimitsContext {
            spent_usd: 1_000.0,
            ..LimitsContext::default()
        };
        assert!(check_limits(&limits, &ctx).is_ok());
    }

    #[test]
    fn tracker_accumulates_iterations() {
        let mut tracker = LimitsTracker::new(limits());
        tracker.record_iteration(2, Some(0.25));
        tracker.record_iteration(3, None);
        assert_eq!(tracker.context().iterations, 2);
        assert_eq!(tracker.context().progress_steps, 5);
        assert!(tracker.check().is_ok());

        tracker.record_iteration(0, None);
        assert!(tracker.check_iterations_only().is_err());
    }
}
