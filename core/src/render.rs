use anyhow::Result;

/// Seam for turning a raw caption into display markup. Implementations may
/// fail; callers must degrade to the raw text rather than abort.
pub trait InlineRenderer: Send + Sync {
    fn render(&self, text: &str) -> Result<String>;
}

/// Default renderer: captions are near-plain model text, so this passes
/// them through with light markdown-marker stripping.
pub struct PlainRenderer;

impl InlineRenderer for PlainRenderer {
    fn render(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let line = line.trim_start_matches('#').trim_start();
            out.push_str(&line.replace("**", "").replace("__", "").replace('`', ""));
        }
        Ok(out)
    }
}

/// Render through the seam, falling back to the raw caption on failure.
pub fn render_or_raw(renderer: &dyn InlineRenderer, text: &str) -> String {
    match renderer.render(text) {
        Ok(markup) => markup,
        Err(err) => {
            tracing::warn!("caption render failed, showing raw text: {err}");
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRenderer;

    impl InlineRenderer for FailingRenderer {
        fn render(&self, _text: &str) -> Result<String> {
            anyhow::bail!("renderer exploded")
        }
    }

    #[test]
    fn plain_renderer_strips_emphasis_markers() {
        let markup = PlainRenderer.render("A **bold** `cat`.").unwrap();
        assert_eq!(markup, "A bold cat.");
    }

    #[test]
    fn plain_renderer_strips_heading_markers() {
        let markup = PlainRenderer.render("## The plan").unwrap();
        assert_eq!(markup, "The plan");
    }

    #[test]
    fn render_failure_degrades_to_raw_text() {
        let raw = "left *as-is*";
        assert_eq!(render_or_raw(&FailingRenderer, raw), raw);
    }
}
