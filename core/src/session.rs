//! The stream session controller: owns one generation at a time, feeds the
//! fragment stream through the accumulator, and reports everything to the
//! caller as events. All mutable session state lives inside the spawned
//! task; callers interact only through the op/event channels.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::accumulator::SlideAccumulator;
use crate::config::Config;
use crate::error::{Result, SessionError, StoryboardError, StreamError};
use crate::fragment::{FragmentSource, StreamEvent};
use crate::render::{InlineRenderer, PlainRenderer};
use storyboard_protocol::{Event, Op, SessionState, Slide};

/// Handle to a running session task. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    tx_op: mpsc::Sender<Op>,
    rx_event: Mutex<mpsc::Receiver<Event>>,
}

enum Outcome {
    Completed,
    Errored(String),
    Cancelled,
    Shutdown,
}

impl Session {
    pub fn spawn(source: Arc<dyn FragmentSource + Send + Sync>, config: Config) -> Self {
        let (tx_op, rx_op) = mpsc::channel::<Op>(64);
        let (tx_event, rx_event) = mpsc::channel::<Event>(256);
        let session_id = uuid::Uuid::new_v4().to_string();

        tokio::spawn(session_task(source, config, session_id, rx_op, tx_event));

        Self {
            inner: Arc::new(Inner {
                tx_op,
                rx_event: Mutex::new(rx_event),
            }),
        }
    }

    pub async fn submit(&self, op: Op) -> Result<()> {
        self.inner
            .tx_op
            .send(op)
            .await
            .map_err(|_| StoryboardError::Session(SessionError::ChannelClosed))
    }

    pub async fn next_event(&self) -> Option<Event> {
        let mut rx = self.inner.rx_event.lock().await;
        rx.recv().await
    }
}

async fn session_task(
    source: Arc<dyn FragmentSource + Send + Sync>,
    config: Config,
    session_id: String,
    mut rx_op: mpsc::Receiver<Op>,
    tx_event: mpsc::Sender<Event>,
) {
    let renderer: Arc<dyn InlineRenderer> = Arc::new(PlainRenderer);
    let _ = tx_event.send(Event::SessionConfigured { session_id }).await;

    while let Some(op) = rx_op.recv().await {
        match op {
            Op::Generate { request } => {
                let mut slides: Vec<Slide> = Vec::new();
                set_state(SessionState::Running, &tx_event).await;

                let outcome = run_generation(
                    source.as_ref(),
                    &config,
                    renderer.clone(),
                    request,
                    &mut rx_op,
                    &tx_event,
                    &mut slides,
                )
                .await;

                match outcome {
                    Outcome::Completed => {
                        let _ = tx_event
                            .send(Event::GenerationComplete { slides })
                            .await;
                        set_state(SessionState::Completed, &tx_event).await;
                    }
                    Outcome::Errored(message) => {
                        let _ = tx_event.send(Event::Error { message }).await;
                        set_state(SessionState::Errored, &tx_event).await;
                    }
                    Outcome::Cancelled => {
                        set_state(SessionState::Cancelled, &tx_event).await;
                    }
                    Outcome::Shutdown => {
                        let _ = tx_event.send(Event::ShutdownComplete).await;
                        return;
                    }
                }
            }
            Op::Cancel => {
                tracing::debug!("cancel received with no generation running");
            }
            Op::Shutdown => {
                let _ = tx_event.send(Event::ShutdownComplete).await;
                return;
            }
        }
    }
}

async fn set_state(state: SessionState, tx_event: &mpsc::Sender<Event>) {
    let _ = tx_event.send(Event::StateChanged { state }).await;
}

/// Consume one fragment stream to a terminal outcome. Ops keep arriving
/// while the stream runs: a second Generate is rejected, Cancel stops
/// consumption at the next fragment boundary.
async fn run_generation(
    source: &(dyn FragmentSource + Send + Sync),
    config: &Config,
    renderer: Arc<dyn InlineRenderer>,
    request: storyboard_common::GenerationRequest,
    rx_op: &mut mpsc::Receiver<Op>,
    tx_event: &mpsc::Sender<Event>,
    slides: &mut Vec<Slide>,
) -> Outcome {
    let mut rx = match source.stream(request).await {
        Ok(rx) => rx,
        Err(err) => {
            return Outcome::Errored(StreamError::Transport(err.to_string()).to_string());
        }
    };

    let mut accumulator = SlideAccumulator::new(config.uncaptioned_policy, renderer);
    let quiet_after = Duration::from_secs(config.still_working_secs.max(1));
    let mut saw_fragment = false;
    let mut announced_quiet = false;
    let mut waiting_secs = 0u64;

    let cancelled = loop {
        tokio::select! {
            biased;
            maybe_op = rx_op.recv() => match maybe_op {
                Some(Op::Cancel) => break true,
                Some(Op::Generate { .. }) => {
                    let _ = tx_event
                        .send(Event::GenerationRejected {
                            reason: SessionError::AlreadyRunning.to_string(),
                        })
                        .await;
                }
                Some(Op::Shutdown) | None => return Outcome::Shutdown,
            },
            next = timeout(quiet_after, rx.recv()) => match next {
                Err(_elapsed) => {
                    waiting_secs += quiet_after.as_secs();
                    if !announced_quiet {
                        announced_quiet = true;
                        let _ = tx_event.send(Event::StillWorking { waiting_secs }).await;
                    }
                }
                Ok(None) | Ok(Some(StreamEvent::Completed)) => break false,
                Ok(Some(StreamEvent::Fragment(fragment))) => {
                    saw_fragment = true;
                    announced_quiet = false;
                    waiting_secs = 0;
                    if let Some(slide) = accumulator.feed(fragment) {
                        let index = slides.len();
                        slides.push(slide.clone());
                        let _ = tx_event.send(Event::SlideAdded { index, slide }).await;
                    }
                }
                Ok(Some(StreamEvent::Error(message))) => {
                    // A cancel that raced the failure wins.
                    if matches!(rx_op.try_recv(), Ok(Op::Cancel)) {
                        break true;
                    }
                    return Outcome::Errored(StreamError::Transport(message).to_string());
                }
            },
        }
    };

    if cancelled {
        // Committed slides survive; the leftover buffer is drained but no
        // further slide is emitted after a cancel request.
        let _ = accumulator.finalize();
        return Outcome::Cancelled;
    }

    if !saw_fragment {
        return Outcome::Errored(StreamError::EmptyResponse.to_string());
    }

    if accumulator.discarded() > 0 {
        tracing::warn!(
            "{} uncaptioned image(s) discarded this generation",
            accumulator.discarded()
        );
    }

    if let Some(slide) = accumulator.finalize() {
        let index = slides.len();
        slides.push(slide.clone());
        let _ = tx_event.send(Event::SlideAdded { index, slide }).await;
    }

    Outcome::Completed
}
