pub mod feed_app;
pub mod llm;

pub use feed_app::{FeedAppClient, FeedAppConfig};
pub use llm::{ClassificationProvider, build_provider};
