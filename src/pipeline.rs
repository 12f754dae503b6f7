pub mod assigner;
pub mod extract;
#[cfg(test)]
pub(crate) mod fake;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod outcome;
pub mod pii;

pub use assigner::TagAssigner;
pub use normalize::TextNormalizer;
pub use orchestrator::{FeedSource, TaggingOrchestrator};
pub use outcome::{ItemOutcome, NothingToDo, RunOutcome, RunReport};
pub use pii::PiiMasker;
