//! WASM bridge for the Euler trajectory solver.
//!
//! The page collects the equation text and `x0`, `y0`, `x_end`, `h`, calls
//! into this crate, and plots the returned points. Error strings are meant to
//! be shown to the user verbatim.

mod equation;
mod run;

pub use equation::WasmEquation;
pub use run::{RunPayload, RunRequest};

use euler_core::{ALLOWED_FUNCTIONS, DEFAULT_EQUATION};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// One-shot compile and integrate.
///
/// `request` is an object with any of `x0`, `y0`, `x_end`, `h`, `max_steps`;
/// `undefined` or `null` runs with the defaults.
#[wasm_bindgen]
pub fn solve(expression: &str, request: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let request: RunRequest = if request.is_undefined() || request.is_null() {
        RunRequest::default()
    } else {
        from_value(request).map_err(|e| JsValue::from_str(&format!("Invalid request: {}", e)))?
    };
    let payload = run::run(expression, &request)
        .map_err(|err| JsValue::from_str(&run::error_message(&err)))?;
    to_value(&payload).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// The function whitelist as `[{ name, description }]`, for the help panel.
#[wasm_bindgen]
pub fn allowed_functions() -> Result<JsValue, JsValue> {
    to_value(&ALLOWED_FUNCTIONS)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
pub fn default_equation() -> String {
    DEFAULT_EQUATION.to_string()
}
