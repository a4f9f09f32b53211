//! Compiled equation handle exposed to the page.

use crate::run::{error_message, run_compiled, RunRequest};
use euler_core::{compile, CompiledEquation, IntegrationParams};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmEquation {
    equation: CompiledEquation,
}

#[wasm_bindgen]
impl WasmEquation {
    #[wasm_bindgen(constructor)]
    pub fn new(expression: &str) -> Result<WasmEquation, JsValue> {
        console_error_panic_hook::set_once();

        let equation = compile(expression)
            .map_err(|e| JsValue::from_str(&format!("Error in parsing equation: {e}")))?;
        Ok(WasmEquation { equation })
    }

    pub fn source(&self) -> String {
        self.equation.source().to_string()
    }

    /// Evaluates `f(x, y)` once.
    pub fn evaluate(&self, x: f64, y: f64) -> Result<f64, JsValue> {
        self.equation
            .evaluate(x, y)
            .map_err(|e| JsValue::from_str(&format!("Error during computation: {e}")))
    }

    /// Runs forward Euler and returns `{ points, final_point, summary, error }`.
    pub fn integrate(&self, x0: f64, y0: f64, x_end: f64, h: f64) -> Result<JsValue, JsValue> {
        let request = RunRequest::new(IntegrationParams::new(x0, y0, x_end, h));
        let payload = run_compiled(&self.equation, &request)
            .map_err(|err| JsValue::from_str(&error_message(&err)))?;
        to_value(&payload).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use euler_core::Point;
    use serde::Deserialize;
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[derive(Deserialize)]
    struct Payload {
        points: Vec<Point>,
        final_point: Point,
        summary: String,
        error: Option<String>,
    }

    fn error_text(result: Result<impl Sized, JsValue>) -> String {
        result.err().and_then(|err| err.as_string()).unwrap_or_default()
    }

    #[wasm_bindgen_test]
    fn wasm_equation_rejects_unknown_function() {
        let message = error_text(WasmEquation::new("banana(x)"));
        assert!(
            message.starts_with("Error in parsing equation: Unknown function 'banana'"),
            "unexpected message: {message}"
        );
    }

    #[wasm_bindgen_test]
    fn wasm_equation_evaluate_reports_domain_error() {
        let equation = WasmEquation::new("log(x)").expect("equation should build");
        let message = error_text(equation.evaluate(-1.0, 0.0));
        assert!(message.starts_with("Error during computation:"));
    }

    #[wasm_bindgen_test]
    fn wasm_equation_integrate_rejects_non_positive_step() {
        let equation = WasmEquation::new("y").expect("equation should build");
        let message = error_text(equation.integrate(0.0, 1.0, 1.0, 0.0));
        assert!(message.contains("Step size h must be positive"));
    }

    #[wasm_bindgen_test]
    fn wasm_equation_integrate_returns_payload() {
        let equation = WasmEquation::new("y - x**2").expect("equation should build");
        let value = equation.integrate(0.0, 0.0, 2.0, 0.1).expect("integration");
        let payload: Payload = from_value(value).expect("payload should deserialize");
        assert!(payload.error.is_none());
        assert_eq!(payload.points[0], Point::new(0.0, 0.0));
        assert!(payload.final_point.x >= 2.0);
        assert!(payload.summary.starts_with("x = 2.0"));
    }

    #[wasm_bindgen_test]
    fn wasm_equation_integrate_keeps_points_before_failure() {
        let equation = WasmEquation::new("1/x").expect("equation should build");
        let value = equation.integrate(-1.0, 0.0, 1.0, 1.0).expect("interruption is a payload");
        let payload: Payload = from_value(value).expect("payload should deserialize");
        assert_eq!(
            payload.error.as_deref(),
            Some("Error during computation: division by zero")
        );
        assert_eq!(payload.points, vec![Point::new(-1.0, 0.0), Point::new(0.0, -1.0)]);
        assert_eq!(payload.final_point, Point::new(0.0, -1.0));
    }
}
