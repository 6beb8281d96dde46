use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver};

use storyboard_common::GenerationRequest;

/// One delivered unit of a streamed generation response. The transport
/// decodes its loose wire shapes into this closed union exactly once;
/// nothing downstream re-inspects raw chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text { content: String },
    Image { bytes: Vec<u8>, media_type: String },
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Fragment(Fragment),
    Completed,
    Error(String),
}

/// Produces the lazy fragment sequence for one generation request.
#[async_trait]
pub trait FragmentSource {
    async fn stream(&self, request: GenerationRequest) -> Result<Receiver<StreamEvent>>;
}

/// Scripted source for tests: replays a fixed event sequence, optionally
/// pausing between deliveries.
pub struct StubSource {
    events: Vec<StreamEvent>,
    delay: Option<std::time::Duration>,
}

impl StubSource {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            delay: None,
        }
    }

    pub fn with_delay(events: Vec<StreamEvent>, delay: std::time::Duration) -> Self {
        Self {
            events,
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl FragmentSource for StubSource {
    async fn stream(&self, _request: GenerationRequest) -> Result<Receiver<StreamEvent>> {
        let (tx, rx) = mpsc::channel(32);
        let events = self.events.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
