//! WASM bindings for `flowpath_core`.
//!
//! `WasmFlowField` owns a tetrahedral mesh and keeps the evaluator's cell
//! caches alive between calls, so successive JS queries along a path reuse
//! the cached cell exactly as native callers do.

mod field;
mod streamline;

pub use field::WasmFlowField;
