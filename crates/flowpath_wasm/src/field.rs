//! Field wrapper and point queries.

use flowpath_core::cache::CacheStats;
use flowpath_core::dataset::CellId;
use flowpath_core::error::FieldResult;
use flowpath_core::field::{FieldCaches, FieldSettings, InterpolatedVelocityField};
use flowpath_core::tet_mesh::TetMesh;
use js_sys::Float64Array;
use wasm_bindgen::prelude::*;

pub(crate) const VELOCITY: &str = "velocity";

#[wasm_bindgen]
pub struct WasmFlowField {
    mesh: TetMesh,
    settings: FieldSettings,
    caches: Option<FieldCaches>,
}

impl WasmFlowField {
    pub(crate) fn from_parts(
        points: &[f64],
        tets: &[u32],
        vectors: &[f64],
        settings: FieldSettings,
    ) -> anyhow::Result<Self> {
        let mut mesh = TetMesh::from_flat(points, tets)?;
        if vectors.len() % 3 != 0 {
            anyhow::bail!(
                "Vector array length ({}) is not a multiple of 3.",
                vectors.len()
            );
        }
        let vectors = vectors.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        mesh.add_vectors(VELOCITY, vectors)?;

        let mut field = Self {
            mesh,
            settings,
            caches: None,
        };
        // Surface registration problems (e.g. a missing named array) up front.
        field.with_field(|_| ())?;
        Ok(field)
    }

    /// Rebuilds the evaluator around the owned mesh, runs `f`, then detaches
    /// the caches again.
    pub(crate) fn with_field<F, R>(&mut self, f: F) -> FieldResult<R>
    where
        F: FnOnce(&mut InterpolatedVelocityField<'_, TetMesh>) -> R,
    {
        let mut field = match self.caches.take() {
            Some(caches) => {
                InterpolatedVelocityField::with_caches(&[&self.mesh], self.settings.clone(), caches)?
            }
            None => {
                let mut field = InterpolatedVelocityField::new(self.settings.clone());
                field.add_data_set(&self.mesh)?;
                field
            }
        };
        let result = f(&mut field);
        self.caches = Some(field.into_caches());
        Ok(result)
    }

    pub(crate) fn evaluate_point(&mut self, point: [f64; 4]) -> FieldResult<[f64; 3]> {
        self.with_field(|field| field.evaluate(&point))?
    }

    /// Evaluates `xyz xyz ...`; points outside the mesh produce NaN triples.
    pub(crate) fn evaluate_batch(&mut self, points: &[f64], t: f64) -> FieldResult<Vec<f64>> {
        self.with_field(|field| {
            let mut out = Vec::with_capacity(points.len());
            for p in points.chunks_exact(3) {
                match field.evaluate(&[p[0], p[1], p[2], t]) {
                    Ok(v) => out.extend_from_slice(&v),
                    Err(err) if err.is_out_of_domain() => out.extend_from_slice(&[f64::NAN; 3]),
                    Err(err) => return Err(err),
                }
            }
            Ok(out)
        })?
    }

    pub(crate) fn stats(&mut self) -> FieldResult<CacheStats> {
        self.with_field(|field| field.cache_stats())
    }

    pub(crate) fn seed(&mut self, cell: Option<CellId>) -> FieldResult<()> {
        self.with_field(|field| field.set_last_cell_id(cell))?
    }
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl WasmFlowField {
    /// `points` is `xyz xyz ...`, `tets` is `abcd abcd ...` and `vectors`
    /// holds one velocity per point. `settings` may be `undefined`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        points: Vec<f64>,
        tets: Vec<u32>,
        vectors: Vec<f64>,
        settings: JsValue,
    ) -> Result<WasmFlowField, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let settings: FieldSettings = if settings.is_undefined() || settings.is_null() {
            FieldSettings::default()
        } else {
            serde_wasm_bindgen::from_value(settings)
                .map_err(|e| JsValue::from_str(&format!("Invalid settings: {}", e)))?
        };
        Self::from_parts(&points, &tets, &vectors, settings).map_err(to_js)
    }

    pub fn number_of_points(&self) -> usize {
        self.mesh.points().len()
    }

    pub fn number_of_cells(&self) -> usize {
        self.mesh.tets().len()
    }

    pub fn evaluate(&mut self, x: f64, y: f64, z: f64, t: f64) -> Result<Vec<f64>, JsValue> {
        self.evaluate_point([x, y, z, t])
            .map(|v| v.to_vec())
            .map_err(to_js)
    }

    pub fn evaluate_many(&mut self, points: &[f64], t: f64) -> Result<Float64Array, JsValue> {
        if points.len() % 3 != 0 {
            return Err(JsValue::from_str("Point array length must be a multiple of 3."));
        }
        let out = self.evaluate_batch(points, t).map_err(to_js)?;
        Ok(Float64Array::from(out.as_slice()))
    }

    pub fn set_last_cell_id(&mut self, cell: Option<u32>) -> Result<(), JsValue> {
        self.seed(cell.map(|c| c as CellId)).map_err(to_js)
    }

    pub fn last_cell_id(&mut self) -> Option<u32> {
        self.with_field(|field| field.last_cell_id())
            .ok()
            .flatten()
            .map(|c| c as u32)
    }

    /// Drops all cached location state.
    pub fn reset_cache(&mut self) {
        self.caches = None;
    }

    pub fn cache_hits(&mut self) -> Result<f64, JsValue> {
        self.stats().map(|s| s.hits as f64).map_err(to_js)
    }

    pub fn cache_misses(&mut self) -> Result<f64, JsValue> {
        self.stats().map(|s| s.misses as f64).map_err(to_js)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Unit cube split into six tetrahedra around the main diagonal.
    pub(crate) fn cube() -> (Vec<f64>, Vec<u32>) {
        let mut points = Vec::new();
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    points.extend_from_slice(&[i as f64, j as f64, k as f64]);
                }
            }
        }
        let tets = vec![
            0, 1, 3, 7, //
            0, 1, 5, 7, //
            0, 2, 3, 7, //
            0, 2, 6, 7, //
            0, 4, 5, 7, //
            0, 4, 6, 7,
        ];
        (points, tets)
    }

    pub(crate) fn shear_field() -> WasmFlowField {
        let (points, tets) = cube();
        let vectors: Vec<f64> = points
            .chunks_exact(3)
            .flat_map(|p| [1.0, p[0], 0.0])
            .collect();
        WasmFlowField::from_parts(&points, &tets, &vectors, FieldSettings::default())
            .expect("field")
    }

    #[test]
    fn evaluates_and_keeps_cache_between_calls() {
        let mut field = shear_field();
        let v = field.evaluate_point([0.4, 0.2, 0.1, 0.0]).expect("inside");
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert!((v[1] - 0.4).abs() < 1e-12);

        field.evaluate_point([0.41, 0.2, 0.1, 0.0]).expect("inside");
        let stats = field.stats().expect("stats");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);

        field.reset_cache();
        assert_eq!(field.stats().expect("stats").hits, 0);
    }

    #[test]
    fn batch_marks_outside_points_with_nan() {
        let mut field = shear_field();
        let out = field
            .evaluate_batch(&[0.5, 0.5, 0.5, 2.0, 0.0, 0.0], 0.0)
            .expect("batch");
        assert_eq!(out.len(), 6);
        assert!((out[1] - 0.5).abs() < 1e-12);
        assert!(out[3..].iter().all(|c| c.is_nan()));
    }

    #[test]
    fn out_of_domain_is_reported() {
        let mut field = shear_field();
        let err = field
            .evaluate_point([-1.0, 0.5, 0.5, 0.0])
            .expect_err("outside");
        assert!(err.is_out_of_domain());
    }

    #[test]
    fn rejects_malformed_arrays() {
        let (points, tets) = cube();
        let err = WasmFlowField::from_parts(&points, &tets, &[1.0; 5], FieldSettings::default())
            .err()
            .expect("bad vectors");
        assert!(err.to_string().contains("multiple of 3"));

        let err = WasmFlowField::from_parts(&points, &tets, &[1.0; 12], FieldSettings::default())
            .err()
            .expect("short vectors");
        assert!(err.to_string().contains("8 points"));

        let named = FieldSettings {
            vectors: Some("vorticity".to_string()),
            ..FieldSettings::default()
        };
        assert!(WasmFlowField::from_parts(&points, &tets, &[0.0; 24], named).is_err());
    }

    #[test]
    fn seeding_validates_cell_ids() {
        let mut field = shear_field();
        field.seed(Some(5)).expect("valid cell");
        assert!(field.seed(Some(6)).is_err());
        field.seed(None).expect("clear");
    }
}
