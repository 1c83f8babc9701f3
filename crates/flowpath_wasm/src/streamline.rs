//! Streamline tracing entry point.

use crate::field::WasmFlowField;
use flowpath_core::streamline::{trace_streamline, Streamline, StreamlineSettings};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamlinePayload {
    /// Flattened `xyz xyz ...`.
    points: Vec<f64>,
    times: Vec<f64>,
    velocities: Vec<f64>,
    termination: flowpath_core::streamline::TerminationReason,
    arc_length: f64,
    cache_hits: u64,
    cache_misses: u64,
}

impl WasmFlowField {
    pub(crate) fn trace(
        &mut self,
        seed: &[f64],
        settings: &StreamlineSettings,
    ) -> anyhow::Result<Streamline> {
        if seed.len() != 3 {
            anyhow::bail!("Seed must have exactly 3 coordinates.");
        }
        let seed = [seed[0], seed[1], seed[2]];
        self.with_field(|field| trace_streamline(field, seed, settings))?
    }
}

#[wasm_bindgen]
impl WasmFlowField {
    /// Traces a streamline from `seed`. `settings` may be `undefined`.
    pub fn trace_streamline(&mut self, seed: Vec<f64>, settings: JsValue) -> Result<JsValue, JsValue> {
        let settings: StreamlineSettings = if settings.is_undefined() || settings.is_null() {
            StreamlineSettings::default()
        } else {
            serde_wasm_bindgen::from_value(settings)
                .map_err(|e| JsValue::from_str(&format!("Invalid settings: {}", e)))?
        };

        let line = self
            .trace(&seed, &settings)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let stats = self
            .stats()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let payload = StreamlinePayload {
            arc_length: line.arc_length(),
            points: line.points.iter().flatten().copied().collect(),
            times: line.times,
            velocities: line.velocities.iter().flatten().copied().collect(),
            termination: line.termination,
            cache_hits: stats.hits,
            cache_misses: stats.misses,
        };

        to_value(&payload).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use crate::field::tests::shear_field;
    use flowpath_core::streamline::{StreamlineSettings, TerminationReason};

    #[test]
    fn trace_leaves_the_cube() {
        let mut field = shear_field();
        let settings = StreamlineSettings {
            step_size: 0.05,
            ..StreamlineSettings::default()
        };
        let line = field.trace(&[0.1, 0.1, 0.6], &settings).expect("trace");
        assert_eq!(line.termination, TerminationReason::OutOfDomain);
        assert!(line.len() > 5);
        assert!(line.points.iter().all(|p| p[0] <= 1.0 + 1e-9));
        assert!(field.stats().expect("stats").hits > 0);
    }

    #[test]
    fn trace_rejects_bad_seed() {
        let mut field = shear_field();
        let err = field
            .trace(&[0.1, 0.1], &StreamlineSettings::default())
            .expect_err("short seed");
        assert!(err.to_string().contains("3 coordinates"));
    }
}
