//! Mail intake: batched fetch, parsing, forwarding and the pipeline tying
//! them together.

pub mod fetcher;
pub mod forward;
pub mod parser;
pub mod pipeline;

pub use fetcher::{BatchFetcher, FetchError};
pub use forward::ForwardTemplate;
pub use parser::{parse, FetchedMessage};
pub use pipeline::{IntakePipeline, Outcome, PipelineError, RunSummary};
