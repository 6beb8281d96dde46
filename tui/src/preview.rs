use std::path::Path;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::io;

use storyboard_protocol::{Slide, SlideManifest};

/// Page through the slides of a saved manifest.
pub async fn run_preview(path: &Path) -> Result<()> {
    let manifest_path = if path.is_dir() {
        path.join("captions.json")
    } else {
        path.to_path_buf()
    };
    let contents = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("could not read {}", manifest_path.display()))?;
    let manifest: SlideManifest = serde_json::from_str(&contents)
        .with_context(|| format!("could not parse {}", manifest_path.display()))?;

    let mut preview = SlidePreview::new(manifest.slides);
    preview.run().await
}

pub struct SlidePreview {
    slides: Vec<Slide>,
    current_slide: usize,
    running: bool,
}

impl SlidePreview {
    pub fn new(slides: Vec<Slide>) -> Self {
        Self {
            slides,
            current_slide: 0,
            running: true,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        while self.running {
            terminal.draw(|f| self.draw(f))?;

            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        self.running = false;
                    }
                    KeyCode::Left | KeyCode::Char('h') => {
                        self.previous_slide();
                    }
                    KeyCode::Right | KeyCode::Char('l') => {
                        self.next_slide();
                    }
                    _ => {}
                }
            }
        }

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        Ok(())
    }

    fn draw(&self, f: &mut Frame) {
        let size = f.area();

        let content = match self.slides.get(self.current_slide) {
            Some(slide) => {
                let art = if slide.image.is_placeholder() {
                    "(text-only slide)"
                } else {
                    "(illustrated)"
                };
                format!("{}\n\n{art}", slide.markup)
            }
            None => "No slide content".to_string(),
        };

        let title = format!(
            "Slide Preview ({}/{})",
            self.current_slide + 1,
            self.slides.len()
        );

        let block = Block::default().title(title).borders(Borders::ALL);

        let paragraph = Paragraph::new(content)
            .block(block)
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, size);
    }

    fn next_slide(&mut self) {
        if self.current_slide < self.slides.len().saturating_sub(1) {
            self.current_slide += 1;
        }
    }

    fn previous_slide(&mut self) {
        if self.current_slide > 0 {
            self.current_slide -= 1;
        }
    }
}
