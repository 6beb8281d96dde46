use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fragment::Fragment;
use crate::render::{render_or_raw, InlineRenderer};
use storyboard_protocol::{Slide, SlideImage};

/// Caption used when `UncaptionedPolicy::PlaceholderCaption` keeps an image
/// that arrived with no preceding text.
pub const UNCAPTIONED: &str = "(no caption)";

/// What to do with an image fragment that arrives while the text buffer is
/// empty. The upstream behavior varied, so this is explicit configuration
/// rather than a hidden default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncaptionedPolicy {
    /// Drop the image and log a warning.
    #[default]
    Discard,
    /// Keep the image under a sentinel caption.
    PlaceholderCaption,
}

/// Pairs streamed text with the next image into finished slides.
///
/// Text fragments append to a pending buffer; an image fragment flushes the
/// buffer into one `Slide`. The buffer is cleared on every flush, so no text
/// leaks between slides.
pub struct SlideAccumulator {
    pending_text: String,
    policy: UncaptionedPolicy,
    renderer: Arc<dyn InlineRenderer>,
    discarded: u32,
}

impl SlideAccumulator {
    pub fn new(policy: UncaptionedPolicy, renderer: Arc<dyn InlineRenderer>) -> Self {
        Self {
            pending_text: String::new(),
            policy,
            renderer,
            discarded: 0,
        }
    }

    /// Consume one fragment, emitting at most one completed slide.
    pub fn feed(&mut self, fragment: Fragment) -> Option<Slide> {
        match fragment {
            Fragment::Text { content } => {
                self.pending_text.push_str(&content);
                None
            }
            Fragment::Image { bytes, media_type } => {
                let caption = self.pending_text.trim().to_string();
                self.pending_text.clear();
                if caption.is_empty() {
                    match self.policy {
                        UncaptionedPolicy::Discard => {
                            self.discarded += 1;
                            tracing::warn!(
                                "dropping {media_type} image with no preceding text"
                            );
                            None
                        }
                        UncaptionedPolicy::PlaceholderCaption => Some(self.build_slide(
                            UNCAPTIONED.to_string(),
                            SlideImage::from_bytes(&bytes, media_type),
                        )),
                    }
                } else {
                    Some(self.build_slide(caption, SlideImage::from_bytes(&bytes, media_type)))
                }
            }
        }
    }

    /// Drain leftover text as a trailing caption-only slide. Safe to call
    /// repeatedly; an empty buffer yields nothing.
    pub fn finalize(&mut self) -> Option<Slide> {
        let caption = self.pending_text.trim().to_string();
        self.pending_text.clear();
        if caption.is_empty() {
            None
        } else {
            Some(self.build_slide(caption, SlideImage::Placeholder))
        }
    }

    /// Number of images dropped under `UncaptionedPolicy::Discard`.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    fn build_slide(&self, caption: String, image: SlideImage) -> Slide {
        let markup = render_or_raw(self.renderer.as_ref(), &caption);
        Slide {
            caption,
            markup,
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlainRenderer;

    fn accumulator(policy: UncaptionedPolicy) -> SlideAccumulator {
        SlideAccumulator::new(policy, Arc::new(PlainRenderer))
    }

    fn text(content: &str) -> Fragment {
        Fragment::Text {
            content: content.to_string(),
        }
    }

    fn image(bytes: &[u8]) -> Fragment {
        Fragment::Image {
            bytes: bytes.to_vec(),
            media_type: "image/png".to_string(),
        }
    }

    #[test]
    fn pairs_text_with_following_image() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        assert!(acc.feed(text("A cat jumps.")).is_none());
        let slide = acc.feed(image(b"img-1")).unwrap();
        assert_eq!(slide.caption, "A cat jumps.");
        assert!(!slide.image.is_placeholder());

        assert!(acc.feed(text("It lands.")).is_none());
        let slide = acc.feed(image(b"img-2")).unwrap();
        assert_eq!(slide.caption, "It lands.");
        assert!(acc.finalize().is_none());
    }

    #[test]
    fn caption_may_span_many_text_fragments() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        acc.feed(text("A very "));
        acc.feed(text("long "));
        acc.feed(text("sentence."));
        let slide = acc.feed(image(b"img")).unwrap();
        assert_eq!(slide.caption, "A very long sentence.");
    }

    #[test]
    fn trailing_text_becomes_placeholder_slide() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        acc.feed(text("Setup."));
        let first = acc.feed(image(b"img")).unwrap();
        assert_eq!(first.caption, "Setup.");

        acc.feed(text("The punchline."));
        let trailing = acc.finalize().unwrap();
        assert_eq!(trailing.caption, "The punchline.");
        assert!(trailing.image.is_placeholder());
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        assert!(acc.finalize().is_none());
        acc.feed(text("Leftover."));
        assert!(acc.finalize().is_some());
        assert!(acc.finalize().is_none());
        assert!(acc.finalize().is_none());
    }

    #[test]
    fn uncaptioned_image_is_discarded_by_default() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        assert!(acc.feed(image(b"img")).is_none());
        assert_eq!(acc.discarded(), 1);

        // Whitespace-only text does not rescue the next image either.
        acc.feed(text("   \n"));
        assert!(acc.feed(image(b"img")).is_none());
        assert_eq!(acc.discarded(), 2);
    }

    #[test]
    fn uncaptioned_image_kept_under_placeholder_policy() {
        let mut acc = accumulator(UncaptionedPolicy::PlaceholderCaption);
        let slide = acc.feed(image(b"img")).unwrap();
        assert_eq!(slide.caption, UNCAPTIONED);
        assert!(!slide.image.is_placeholder());
        assert_eq!(acc.discarded(), 0);
    }

    #[test]
    fn no_text_is_lost_across_flushes() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        let inputs = ["First. ", "Second.", " Third.", " Tail."];
        let mut captions = Vec::new();

        acc.feed(text(inputs[0]));
        captions.push(acc.feed(image(b"a")).unwrap().caption);
        acc.feed(text(inputs[1]));
        acc.feed(text(inputs[2]));
        captions.push(acc.feed(image(b"b")).unwrap().caption);
        acc.feed(text(inputs[3]));
        captions.push(acc.finalize().unwrap().caption);

        let fed: String = inputs.concat().split_whitespace().collect::<Vec<_>>().join(" ");
        let kept = captions.join(" ");
        assert_eq!(kept, fed);
    }

    #[test]
    fn slides_carry_rendered_markup() {
        let mut acc = accumulator(UncaptionedPolicy::Discard);
        acc.feed(text("A **bold** move."));
        let slide = acc.feed(image(b"img")).unwrap();
        assert_eq!(slide.caption, "A **bold** move.");
        assert_eq!(slide.markup, "A bold move.");
    }
}
