//! Data structures for per-feature association testing.

mod dataset;
mod feature_table;
pub mod formula;
mod metadata;
pub mod random_effects;
mod result;

pub use dataset::Dataset;
pub use feature_table::FeatureTable;
pub use formula::{ModelFormula, Term};
pub use metadata::{MetadataTable, SampleSheet, Variable};
pub use random_effects::GroupIndex;
pub use result::{
    format_value, Association, AssociationTable, CoefficientRow, DatasetResult,
    LabeledAssociation,
};
