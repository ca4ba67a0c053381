//! egui presentation of the pipeline output.

pub mod panels;
pub mod plot;
