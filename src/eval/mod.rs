pub mod binding;
pub mod logger;
pub mod modules;
pub mod pipeline;
pub mod results;
pub mod runner;
pub mod tests;

pub use binding::*;
pub use logger::*;
pub use modules::*;
pub use pipeline::*;
pub use results::*;
pub use runner::*;
pub use tests::*;
