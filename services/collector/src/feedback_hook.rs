//! Wires the synchronous feedback path (spec.md §4.I) and the outbound
//! continuous publisher onto `collector`'s publish handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ds_core::PublishHook;
use ds_feedback::FeedbackHandler;
use ds_net::ContinuousPublisher;
use ds_protocol::Event;
use ds_telemetry::stats::EventCounter;
use ds_telemetry::tracker::ArrivalTracker;
use tracing::warn;

pub struct FeedbackPublishHook {
    pub feedback: Arc<FeedbackHandler>,
    pub continuous: Arc<ContinuousPublisher>,
    pub tracker: Option<ArrivalTracker>,
    pub counter: Arc<EventCounter>,
}

impl PublishHook for FeedbackPublishHook {
    fn after_publish<'a>(
        &'a self,
        events: &'a [Event],
    ) -> Pin<Box<dyn Future<Output = Option<Response>> + Send + 'a>> {
        Box::pin(async move {
            self.counter.increment(events.len() as u64);
            if let Some(tracker) = &self.tracker {
                for event in events {
                    tracker.record(event.event_id.clone());
                }
            }
            self.continuous.publish_events(events.to_vec()).await;

            let first = events.first()?;
            if !self.feedback.is_candidate(first) {
                return None;
            }
            let feedback = self.feedback.handle(first).await?;
            let body = match ds_feedback::compress_response(&feedback) {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "failed to gzip-compress feedback response");
                    return Some(StatusCode::INTERNAL_SERVER_ERROR.into_response());
                }
            };
            let mut resp = body.into_response();
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            resp.headers_mut()
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            Some(resp)
        })
    }
}
