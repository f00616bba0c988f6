pub mod acquisition;
pub mod admission;
pub mod circuit_breaker;
pub mod code_generator;
pub mod consistency;
pub mod ensemble;
pub mod industry_detector;
pub mod keyword_extractor;
pub mod ml_client;
pub mod openai_client;
pub mod pipeline;
pub mod taxonomy_store;

pub use acquisition::{CascadingScraper, CrawlSettings};
pub use admission::*;
pub use circuit_breaker::*;
pub use ensemble::*;
pub use keyword_extractor::*;
pub use ml_client::*;
pub use openai_client::*;
pub use pipeline::*;
pub use taxonomy_store::*;
