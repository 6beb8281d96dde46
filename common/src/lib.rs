pub mod types;

pub use types::{AttachedImage, GenerationRequest, GridOptions};
