//! Cross-node HTTP clients: a long-poll reconnecting relay reader and a
//! buffered continuous publisher.

pub mod backoff;
pub mod continuous_publisher;
pub mod relay_client;

pub use backoff::Backoff;
pub use continuous_publisher::{ContinuousPublisher, ContinuousPublisherConfig};
pub use relay_client::{RelayClient, RelayClientConfig, RelayClientError};
