pub mod base;
pub mod custom;
pub mod retrieval;

pub use base::*;
pub use custom::*;
pub use retrieval::*;
