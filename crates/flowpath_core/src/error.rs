//! Error taxonomy for velocity field evaluation.
//!
//! `OutOfDomain` is the only variant an integrator should expect during a
//! healthy run: it means the query point left every registered data set and
//! the trajectory should stop. Every other variant is a setup or geometry
//! problem and points at a misconfigured evaluator or a broken mesh.

use crate::dataset::CellId;
use thiserror::Error;

pub type FieldResult<T> = std::result::Result<T, FieldError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("point {0:?} lies outside every registered data set")]
    OutOfDomain([f64; 3]),

    #[error("no data sets have been registered")]
    NoDataSets,

    #[error("data set {index} has no points or cells")]
    EmptyDataSet { index: usize },

    #[error("data set {index} has no vector array named {name:?}")]
    MissingVectors { index: usize, name: Option<String> },

    #[error("cell {cell} is degenerate")]
    DegenerateCell { cell: CellId },

    #[error("cell id {cell} out of range (data set has {count} cells)")]
    InvalidCellId { cell: CellId, count: usize },

    #[error("data set index {index} out of range ({count} registered)")]
    InvalidDataSetIndex { index: usize, count: usize },

    #[error("no cell is cached for the active data set")]
    NoCachedCell,

    #[error("query point has a non-finite coordinate")]
    NonFinitePoint,
}

impl FieldError {
    /// True for the recoverable "left the domain" outcome.
    pub fn is_out_of_domain(&self) -> bool {
        matches!(self, FieldError::OutOfDomain(_))
    }
}

#[cfg(test)]
mod tests {
    use super::FieldError;

    #[test]
    fn out_of_domain_is_distinguished_from_setup_errors() {
        assert!(FieldError::OutOfDomain([1.0, 2.0, 3.0]).is_out_of_domain());
        assert!(!FieldError::NoDataSets.is_out_of_domain());
        assert!(!FieldError::DegenerateCell { cell: 4 }.is_out_of_domain());
    }

    #[test]
    fn messages_name_the_offending_value() {
        let message = FieldError::InvalidCellId { cell: 9, count: 3 }.to_string();
        assert!(message.contains("9"));
        assert!(message.contains("3 cells"));

        let message = FieldError::OutOfDomain([0.5, -1.0, 2.0]).to_string();
        assert!(message.contains("[0.5, -1.0, 2.0]"), "got {message}");
    }
}
