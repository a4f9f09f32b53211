//! Fixed-step runs of the forward Euler method from `x0` to `x_end`.

use crate::error::{IntegrationError, ParameterError};
use crate::solvers::ForwardEuler;
use crate::traits::{Derivative, Steppable};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Equation shown to a user before they type their own.
pub const DEFAULT_EQUATION: &str = "y - x**2";

/// Inputs of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationParams {
    pub x0: f64,
    pub y0: f64,
    pub x_end: f64,
    /// Fixed step size; must be positive.
    pub h: f64,
}

impl Default for IntegrationParams {
    fn default() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x_end: 2.0,
            h: 0.1,
        }
    }
}

impl IntegrationParams {
    pub fn new(x0: f64, y0: f64, x_end: f64, h: f64) -> Self {
        Self { x0, y0, x_end, h }
    }

    /// Number of steps a run takes, barring accumulated rounding in `x`.
    pub fn expected_steps(&self) -> f64 {
        if self.x0 >= self.x_end {
            0.0
        } else {
            ((self.x_end - self.x0) / self.h).ceil()
        }
    }

    /// Checks the preconditions of [`integrate`].
    pub fn validate(&self, limits: &RunLimits) -> Result<(), ParameterError> {
        for (name, value) in [
            ("x0", self.x0),
            ("y0", self.y0),
            ("x_end", self.x_end),
            ("h", self.h),
        ] {
            if !value.is_finite() {
                return Err(ParameterError::NotFinite { name, value });
            }
        }
        if self.h <= 0.0 {
            return Err(ParameterError::NonPositiveStep(self.h));
        }
        if self.x0 >= self.x_end {
            return Ok(());
        }

        // Spacing between floats is widest at the endpoint of largest magnitude;
        // if h survives there, x advances everywhere in between.
        let widest = self.x0.abs().max(self.x_end.abs());
        if widest + self.h <= widest {
            return Err(ParameterError::StepTooSmall {
                h: self.h,
                x: widest,
            });
        }

        let required = self.expected_steps();
        if required > limits.max_steps as f64 {
            return Err(ParameterError::TooManySteps {
                required,
                limit: limits.max_steps,
            });
        }
        Ok(())
    }
}

/// Bounds on the work a single run may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLimits {
    pub max_steps: usize,
}

impl RunLimits {
    pub const DEFAULT_MAX_STEPS: usize = 1_000_000;
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps: Self::DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The samples of one run, in generation order, starting at `(x0, y0)`.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    points: Vec<Point>,
}

impl Trajectory {
    fn new(initial: Point) -> Self {
        Self {
            points: vec![initial],
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn initial_point(&self) -> Point {
        self.points[0]
    }

    pub fn final_point(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// The final point formatted for display, e.g. `x = 2.0000, y = -1.4386`.
    pub fn summary(&self) -> String {
        let last = self.final_point();
        format!("x = {:.4}, y = {:.4}", last.x, last.y)
    }
}

/// Integrates `dy/dx = f(x, y)` with forward Euler from `x0` until the first
/// sample at or beyond `x_end`.
///
/// Each sample advances `x` by exactly `h` from the previous one. When
/// `x0 >= x_end` the trajectory is the single initial point. If `f` fails
/// part-way, the points computed so far are returned in
/// [`IntegrationError::Interrupted`].
pub fn integrate(
    derivative: &impl Derivative<f64>,
    params: &IntegrationParams,
    limits: &RunLimits,
) -> Result<Trajectory, IntegrationError> {
    params.validate(limits)?;

    let IntegrationParams { x0, y0, x_end, h } = *params;
    debug!(
        "Integrating from x = {x0} to x = {x_end} with h = {h} ({} steps)",
        params.expected_steps()
    );

    let mut trajectory = Trajectory::new(Point::new(x0, y0));
    let mut stepper = ForwardEuler;
    let (mut x, mut y) = (x0, y0);

    while x < x_end {
        if let Err(error) = stepper.step(derivative, &mut x, &mut y, h) {
            warn!("Integration stopped at x = {x}, y = {y}: {error}");
            return Err(IntegrationError::Interrupted { trajectory, error });
        }
        trajectory.points.push(Point::new(x, y));
    }

    debug!(
        "Integration finished after {} steps at {}",
        trajectory.len() - 1,
        trajectory.summary()
    );
    Ok(trajectory)
}
