//! Core library: fragment aggregation, session control, and grid
//! composition for streamed multi-modal story generation.

pub mod accumulator;
pub mod compositor;
pub mod config;
pub mod error;
pub mod fragment;
pub mod placeholder;
pub mod render;
pub mod session;

pub use accumulator::{SlideAccumulator, UncaptionedPolicy, UNCAPTIONED};
pub use compositor::compose;
pub use config::Config;
pub use error::{CompositeError, Result, SessionError, StoryboardError, StreamError};
pub use fragment::{Fragment, FragmentSource, StreamEvent, StubSource};
pub use render::{InlineRenderer, PlainRenderer};
pub use session::Session;
pub use storyboard_protocol::{Event, Op, SessionState, Slide, SlideImage};
