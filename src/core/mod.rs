pub mod errors;
pub mod options;
pub mod types;

pub use errors::*;
pub use options::*;
pub use types::*;
