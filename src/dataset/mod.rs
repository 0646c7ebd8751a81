pub mod dataset;
pub mod field;
pub mod manifest;

pub use dataset::*;
pub use field::*;
pub use manifest::*;
