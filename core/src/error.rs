use thiserror::Error;

/// Fragment-stream failures surfaced by a session.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream transport failed: {0}")]
    Transport(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Failures of the composite-grid operation. Per-cell decode problems are
/// not represented here; they degrade to placeholder cells.
#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("no slides to compose")]
    NoSlides,

    #[error("grid needs at least one column")]
    InvalidColumns,

    #[error("could not create composite canvas: {0}")]
    Canvas(String),

    #[error("could not encode composite image: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a generation is already running")]
    AlreadyRunning,

    #[error("session channel closed")]
    ChannelClosed,
}

/// Umbrella error for the storyboard core.
#[derive(Error, Debug)]
pub enum StoryboardError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("composite error: {0}")]
    Composite(#[from] CompositeError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoryboardError>;
