//! Compile-and-integrate plumbing shared by the bindings.
//!
//! Everything here works on plain Rust types and `anyhow` errors; conversion
//! to `JsValue` happens only at the `#[wasm_bindgen]` edge.

use anyhow::{Context, Result};
use euler_core::{
    compile, integrate, CompiledEquation, IntegrationError, IntegrationParams, Point, RunLimits,
    Trajectory,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Parameters as sent by the page: one flat object with any of `x0`, `y0`,
/// `x_end`, `h`, `max_steps`. Missing fields take the core defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct RunRequest {
    #[serde(flatten)]
    pub params: IntegrationParams,
    #[serde(flatten)]
    pub limits: RunLimits,
}

impl RunRequest {
    pub fn new(params: IntegrationParams) -> Self {
        Self {
            params,
            limits: RunLimits::default(),
        }
    }
}

/// What the page plots. `error` is set when evaluation failed part-way; the
/// points up to the failure are still present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPayload {
    pub points: Vec<Point>,
    pub final_point: Point,
    pub summary: String,
    pub error: Option<String>,
}

impl RunPayload {
    fn new(trajectory: Trajectory, error: Option<String>) -> Self {
        Self {
            final_point: trajectory.final_point(),
            summary: trajectory.summary(),
            points: trajectory.into_points(),
            error,
        }
    }
}

/// Runs an already compiled equation. Only invalid parameters are errors;
/// an evaluation failure yields a payload with `error` set.
pub fn run_compiled(equation: &CompiledEquation, request: &RunRequest) -> Result<RunPayload> {
    match integrate(equation, &request.params, &request.limits) {
        Ok(trajectory) => Ok(RunPayload::new(trajectory, None)),
        Err(err) => {
            let message = err.to_string();
            match err {
                IntegrationError::Interrupted { trajectory, .. } => {
                    Ok(RunPayload::new(trajectory, Some(message)))
                }
                invalid @ IntegrationError::InvalidParameters(_) => Err(invalid.into()),
            }
        }
    }
}

pub fn run(expression: &str, request: &RunRequest) -> Result<RunPayload> {
    let equation = compile(expression).context("Error in parsing equation")?;
    debug!("Running `{}` with {:?}", equation.source(), request);
    run_compiled(&equation, request)
}

/// Formats an error chain the way the page displays it.
pub fn error_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_defaults_reaches_end() {
        let payload = run(euler_core::DEFAULT_EQUATION, &RunRequest::default())
            .expect("default run should succeed");
        assert!(payload.error.is_none());
        assert_eq!(payload.points[0], Point::new(0.0, 0.0));
        assert!(payload.final_point.x >= 2.0);
        assert_eq!(payload.final_point, *payload.points.last().expect("points"));
        assert!(payload.summary.starts_with("x = 2.0"));
    }

    #[test]
    fn run_reports_parse_errors_with_context() {
        let err = run("banana(x)", &RunRequest::default()).expect_err("expected parse error");
        let message = error_message(&err);
        assert!(message.starts_with("Error in parsing equation: Unknown function 'banana'"));
    }

    #[test]
    fn run_keeps_partial_points_on_evaluation_error() {
        let request = RunRequest::new(IntegrationParams::new(-1.0, 0.0, 1.0, 1.0));
        let payload = run("1/x", &request).expect("interruption is still a payload");
        assert_eq!(
            payload.error.as_deref(),
            Some("Error during computation: division by zero")
        );
        assert_eq!(payload.points, vec![Point::new(-1.0, 0.0), Point::new(0.0, -1.0)]);
        assert_eq!(payload.final_point, Point::new(0.0, -1.0));
        assert_eq!(payload.summary, "x = 0.0000, y = -1.0000");
    }

    #[test]
    fn run_rejects_non_positive_step() {
        let request = RunRequest::new(IntegrationParams {
            h: 0.0,
            ..IntegrationParams::default()
        });
        let err = run("y", &request).expect_err("expected rejection");
        assert!(error_message(&err).contains("Step size h must be positive"));
    }

    #[test]
    fn run_honours_step_limit() {
        let request = RunRequest {
            params: IntegrationParams {
                h: 0.001,
                ..IntegrationParams::default()
            },
            limits: RunLimits { max_steps: 100 },
        };
        let err = run("y", &request).expect_err("expected step limit");
        assert!(error_message(&err).contains("limit of 100"));
    }

    #[test]
    fn request_defaults_follow_core_defaults() {
        let request = RunRequest::default();
        assert_eq!(request.params, IntegrationParams::default());
        assert_eq!(request.limits, RunLimits::default());
    }

    #[test]
    fn partial_request_fills_in_defaults() {
        use serde::de::value::{Error, MapDeserializer};

        let fields = [("h", 0.05), ("x_end", 1.0)];
        let request = RunRequest::deserialize(MapDeserializer::<_, Error>::new(
            fields.into_iter(),
        ))
        .expect("partial request should deserialize");
        assert_eq!(request.params, IntegrationParams::new(0.0, 0.0, 1.0, 0.05));
        assert_eq!(request.limits, RunLimits::default());
    }

    #[test]
    fn run_compiled_reuses_equation() {
        let equation = compile("x").expect("compile");
        let first = run_compiled(&equation, &RunRequest::default()).expect("first");
        let second = run_compiled(&equation, &RunRequest::default()).expect("second");
        assert_eq!(first, second);
    }
}
