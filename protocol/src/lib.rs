use base64::Engine;
use serde::{Deserialize, Serialize};
use storyboard_common::GenerationRequest;

/// Lifecycle state of one generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Errored,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Errored | SessionState::Cancelled
        )
    }

    /// Human-readable message for the state line. Cancelled and Errored are
    /// deliberately distinct.
    pub fn user_message(self) -> &'static str {
        match self {
            SessionState::Idle => "Ready.",
            SessionState::Running => "Generating your storyboard...",
            SessionState::Completed => "Storyboard complete.",
            SessionState::Errored => "Generation failed.",
            SessionState::Cancelled => "Generation cancelled by user.",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Errored => "errored",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The image half of a slide. `Placeholder` marks a trailing caption-only
/// slide; rendering layers substitute a generated "text only" graphic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlideImage {
    Inline { media_type: String, data: String },
    Placeholder,
}

impl SlideImage {
    pub fn from_bytes(bytes: &[u8], media_type: impl Into<String>) -> Self {
        Self::Inline {
            media_type: media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, SlideImage::Placeholder)
    }

    pub fn data_uri(&self) -> Option<String> {
        match self {
            SlideImage::Inline { media_type, data } => {
                Some(format!("data:{media_type};base64,{data}"))
            }
            SlideImage::Placeholder => None,
        }
    }
}

/// One finalized (caption, image) pair. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub caption: String,
    pub markup: String,
    pub image: SlideImage,
}

/// On-disk export format for a finished generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideManifest {
    pub generated_at: String,
    pub slides: Vec<Slide>,
}

/// Operations a caller submits to the session task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    Generate { request: GenerationRequest },
    Cancel,
    Shutdown,
}

/// Events emitted by the session task, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    SessionConfigured { session_id: String },
    StateChanged { state: SessionState },
    SlideAdded { index: usize, slide: Slide },
    StillWorking { waiting_secs: u64 },
    GenerationRejected { reason: String },
    GenerationComplete { slides: Vec<Slide> },
    Error { message: String },
    ShutdownComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub op: Op,
}

impl Submission {
    pub fn new(op: Op) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            op,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_image_round_trips_bytes_as_data_uri() {
        let image = SlideImage::from_bytes(&[0x89, 0x50], "image/png");
        let uri = image.data_uri().unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(SlideImage::Placeholder.data_uri().is_none());
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Errored.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn cancelled_and_errored_messages_differ() {
        assert_ne!(
            SessionState::Cancelled.user_message(),
            SessionState::Errored.user_message()
        );
    }

    #[test]
    fn event_serializes_with_slide_payload() {
        let event = Event::SlideAdded {
            index: 0,
            slide: Slide {
                caption: "A fox sets out.".to_string(),
                markup: "A fox sets out.".to_string(),
                image: SlideImage::Placeholder,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("SlideAdded"));
        assert!(json.contains("placeholder"));
    }
}
