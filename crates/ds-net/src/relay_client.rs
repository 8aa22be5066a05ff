//! Remote relay client: a long-poll reconnecting reader that mirrors one
//! or more upstream streams into a local [`StreamNode`] (spec.md §4.G).

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use ds_core::StreamNode;
use ds_protocol::wire;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;

const GAP_HEADER: &str = "X-Gap";

#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Full URL of the upstream `GET /<path>/stream` endpoint.
    pub upstream_url: String,
    pub client_label: Option<String>,
    pub deflate: bool,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            upstream_url: String::new(),
            client_label: None,
            deflate: false,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("wire decode error: {0}")]
    Wire(#[from] wire::WireError),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("inflate error: {0}")]
    Inflate(#[from] std::io::Error),
    #[error("target stream rejected republish: {0}")]
    Target(#[from] ds_core::StreamNodeError),
}

enum PollOutcome {
    NoEvents,
    Advanced(String),
    Gap,
}

/// Drives the long-poll loop against `config.upstream_url`, decoding the
/// incremental event frame stream and republishing into `target`.
pub struct RelayClient {
    http: reqwest::Client,
    config: RelayClientConfig,
    target: Arc<StreamNode>,
}

impl RelayClient {
    pub fn new(config: RelayClientConfig, target: Arc<StreamNode>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            target,
        }
    }

    /// Run the reconnect loop until `shutdown` resolves.
    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut last_seen_id: Option<String> = None;
        let mut backoff = Backoff::new(self.config.base_backoff, self.config.max_backoff);

        loop {
            if shutdown.try_recv().is_ok() {
                break;
            }
            match self.poll_once(last_seen_id.as_deref()).await {
                Ok(PollOutcome::Advanced(id)) => {
                    last_seen_id = Some(id);
                    backoff.reset();
                }
                Ok(PollOutcome::NoEvents) => {
                    backoff.reset();
                }
                Ok(PollOutcome::Gap) => {
                    warn!(upstream = %self.config.upstream_url, "upstream reported a gap, re-subscribing from scratch");
                    last_seen_id = None;
                    backoff.reset();
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(upstream = %self.config.upstream_url, error = %e, delay_ms = delay.as_millis() as u64, "relay client poll failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown => break,
                    }
                }
            }
        }
        debug!(upstream = %self.config.upstream_url, "relay client stopped");
    }

    async fn poll_once(&self, last_seen_id: Option<&str>) -> Result<PollOutcome, RelayClientError> {
        let mut url = url::Url::parse(&self.config.upstream_url)?;
        {
            let mut qp = url.query_pairs_mut();
            if let Some(id) = last_seen_id {
                qp.append_pair("last_seen_id", id);
            }
            if let Some(label) = &self.config.client_label {
                qp.append_pair("label", label);
            }
            if self.config.deflate {
                qp.append_pair("deflate", "1");
            }
        }

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RelayClientError::Status(response.status().as_u16()));
        }
        let is_gap = response.headers().contains_key(GAP_HEADER);
        let body = response.bytes().await?;
        if is_gap {
            return Ok(PollOutcome::Gap);
        }

        let decoded = if self.config.deflate {
            inflate(&body)?
        } else {
            body.to_vec()
        };
        if decoded.is_empty() {
            return Ok(PollOutcome::NoEvents);
        }

        let (events, _consumed) = wire::decode_all(&decoded)?;
        if events.is_empty() {
            return Ok(PollOutcome::NoEvents);
        }
        let new_last_seen_id = events.last().expect("checked non-empty").event_id.clone();
        info!(upstream = %self.config.upstream_url, count = events.len(), "relay client republishing batch");
        self.target.publish(events).await?;
        Ok(PollOutcome::Advanced(new_last_seen_id))
    }
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = flate2::read::DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
