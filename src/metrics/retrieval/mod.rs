pub mod matching;
pub mod precision_recall;
pub mod ranked;

pub use matching::*;
pub use precision_recall::PrecisionRecallF1;
pub use ranked::*;
