use std::collections::BTreeMap;

/// Named per-point arrays attached to a mesh.
///
/// Length checks against the owning mesh happen when arrays are attached
/// through the mesh; this container only stores and looks them up.
#[derive(Debug, Clone, Default)]
pub struct PointData {
    vectors: BTreeMap<String, Vec<[f64; 3]>>,
    scalars: BTreeMap<String, Vec<f64>>,
    active_vectors: Option<String>,
}

impl PointData {
    /// Inserts (or replaces) a vector array. The first one becomes active.
    pub fn insert_vectors(&mut self, name: impl Into<String>, data: Vec<[f64; 3]>) {
        let name = name.into();
        if self.active_vectors.is_none() {
            self.active_vectors = Some(name.clone());
        }
        self.vectors.insert(name, data);
    }

    pub fn insert_scalars(&mut self, name: impl Into<String>, data: Vec<f64>) {
        self.scalars.insert(name.into(), data);
    }

    /// Makes `name` the array used when no explicit selection is given.
    /// Returns false if no such array exists.
    pub fn set_active_vectors(&mut self, name: &str) -> bool {
        if self.vectors.contains_key(name) {
            self.active_vectors = Some(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_vectors_name(&self) -> Option<&str> {
        self.active_vectors.as_deref()
    }

    /// Looks up a vector array by name, or the active one for `None`.
    pub fn vectors(&self, name: Option<&str>) -> Option<&[[f64; 3]]> {
        let name = name.or(self.active_vectors.as_deref())?;
        self.vectors.get(name).map(Vec::as_slice)
    }

    pub fn scalars(&self, name: &str) -> Option<&[f64]> {
        self.scalars.get(name).map(Vec::as_slice)
    }

    pub fn vector_names(&self) -> impl Iterator<Item = &str> {
        self.vectors.keys().map(String::as_str)
    }
}
