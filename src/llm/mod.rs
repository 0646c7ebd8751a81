pub mod provider;
pub mod registry;
pub mod static_provider;

pub use provider::*;
pub use registry::*;
pub use static_provider::*;
