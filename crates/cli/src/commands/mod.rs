pub mod analyze;
pub mod probe;
