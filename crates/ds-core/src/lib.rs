//! In-process engine shared by every stream-node binary: the recency
//! buffer, the spatial score index, the append-only recent-events ring,
//! and the stream node itself.

pub mod http;
pub mod journal;
pub mod recency;
pub mod relay;
pub mod ring;
pub mod score_index;
pub mod stream_node;
pub mod subscriber;

pub use http::{publish_router, subscribe_router, subscribe_router_with_idle_timeout, PublishHook};
pub use journal::{EventJournal, JournalError};
pub use recency::RecencyBuffer;
pub use relay::{EventTypeRelay, RelayFilter};
pub use ring::{RecentEventsRing, SeekResult, DEFAULT_RING_CAPACITY};
pub use score_index::ScoreIndex;
pub use stream_node::{
    ParsePolicy, StreamNode, StreamNodeConfig, StreamNodeError, SubscribeOptions,
};
pub use subscriber::SubscriberChunk;
