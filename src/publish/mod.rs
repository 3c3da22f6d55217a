//! Publishing finished exports to external destinations.

mod directory;
mod handler;
mod provider;
mod publisher;

pub use directory::DirectoryPublisher;
pub use handler::PublishJobHandler;
pub use provider::ProviderPublisher;
pub use publisher::{
    PublishDestination, PublishError, PublishOutcome, PublishResult, Publisher, PublisherRegistry,
};
