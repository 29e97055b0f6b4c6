//! Fund selection stages: screening, correlation pre-selection and
//! return-ranked post-selection.

pub mod postselection;
pub mod preselection;
pub mod screening;
