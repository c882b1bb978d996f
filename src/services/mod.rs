pub mod aggregator;
pub mod pipeline;
pub mod poller;

pub use aggregator::Aggregator;
pub use pipeline::{shutdown_signal, Pipeline, PipelineReport, ScheduledReader, SinkReport};
pub use poller::{PollOutcome, Poller};
