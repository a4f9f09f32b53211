use crate::error::EvaluationError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the equation engine.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// The right-hand side of `dy/dx = f(x, y)`.
pub trait Derivative<T: Scalar> {
    /// Evaluates the slope at `(x, y)`.
    fn slope(&self, x: T, y: T) -> Result<T, EvaluationError>;
}

/// Adapts a plain closure into a [`Derivative`].
///
/// Non-finite results are reported as [`EvaluationError::NonFinite`], the same
/// way compiled equations report them.
pub struct FnDerivative<F>(pub F);

impl<T, F> Derivative<T> for FnDerivative<F>
where
    T: Scalar,
    F: Fn(T, T) -> T,
{
    fn slope(&self, x: T, y: T) -> Result<T, EvaluationError> {
        let value = (self.0)(x, y);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvaluationError::NonFinite {
                operation: "f(x, y)",
            })
        }
    }
}

/// A trait for solvers that can step a scalar ODE forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size h.
    /// x: independent variable (updated after step)
    /// y: dependent variable (updated after step)
    /// On failure neither `x` nor `y` is modified.
    fn step(
        &mut self,
        derivative: &impl Derivative<T>,
        x: &mut T,
        y: &mut T,
        h: T,
    ) -> Result<(), EvaluationError>;
}
