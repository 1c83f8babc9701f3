pub mod cache;
pub mod cells;
pub mod dataset;
pub mod error;
pub mod field;
pub mod image_grid;
pub mod locator;
pub mod point_data;
pub mod solvers;
pub mod streamline;
pub mod tet_mesh;
/// The `flowpath_core` crate interpolates per-vertex velocity samples over
/// unstructured meshes and traces streamlines through the resulting field.
///
/// Key components:
/// - **Traits**: `Cell` and `DataSet` (mesh contract), `VelocityField` (fields), `Steppable` (Solvers).
/// - **Meshes**: `TetMesh` (tetrahedra with face adjacency and a point locator) and `ImageGrid` (voxels).
/// - **Field**: `InterpolatedVelocityField` with per-mesh cell caches and three-tier point location.
/// - **Solvers**: Fixed-step integrators (RK2, RK4) and the streamline tracer.
pub mod traits;

#[cfg(test)]
mod test_support;
