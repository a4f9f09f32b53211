pub mod equation_engine;
pub mod error;
pub mod integrator;
pub mod solvers;
/// The `euler_core` crate approximates solutions of `dy/dx = f(x, y)` with the
/// explicit (forward) Euler method.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `Derivative` (the right-hand side), `Steppable` (Solvers).
/// - **Equation Engine**: Parses user equations over `x` and `y` and evaluates them on a small bytecode VM.
/// - **Solvers**: The single-step `ForwardEuler` stepper.
/// - **Integrator**: Fixed-step runs from `x0` to `x_end` producing a `Trajectory`.
pub mod traits;

pub use equation_engine::{compile, CompiledEquation, ALLOWED_FUNCTIONS};
pub use error::{EvaluationError, IntegrationError, ParameterError, ParseError};
pub use integrator::{integrate, IntegrationParams, Point, RunLimits, Trajectory, DEFAULT_EQUATION};
