pub mod arg;
pub mod llm;
pub mod metric;
pub mod probabilistic;
pub mod prompt;
pub mod response;

pub use arg::*;
pub use llm::*;
pub use metric::*;
pub use probabilistic::*;
pub use prompt::*;
pub use response::*;
