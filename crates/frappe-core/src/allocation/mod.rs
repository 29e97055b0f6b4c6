//! Allocation stages: macro-driven asset-class weights, fund-level
//! portfolio selection and integer weight correction.

pub mod correction;
pub mod portfolio;
pub mod weighting;
