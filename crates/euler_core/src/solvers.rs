use crate::error::EvaluationError;
use crate::traits::{Derivative, Scalar, Steppable};

/// Explicit (forward) Euler stepper.
///
/// ```text
///   y_{n+1} = y_n + h * f(x_n, y_n)
///   x_{n+1} = x_n + h
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardEuler;

impl<T: Scalar> Steppable<T> for ForwardEuler {
    fn step(
        &mut self,
        derivative: &impl Derivative<T>,
        x: &mut T,
        y: &mut T,
        h: T,
    ) -> Result<(), EvaluationError> {
        let slope = derivative.slope(*x, *y)?;
        let next_y = *y + h * slope;
        let next_x = *x + h;
        if !next_y.is_finite() || !next_x.is_finite() {
            return Err(EvaluationError::NonFinite {
                operation: "euler step",
            });
        }

        *y = next_y;
        *x = next_x;
        Ok(())
    }
}
