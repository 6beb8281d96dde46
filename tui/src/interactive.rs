use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use storyboard_common::GenerationRequest;
use storyboard_core::{
    compose, Config, Event, FragmentSource, Fragment, Op, Session, SessionState, Slide,
    StreamEvent, StubSource,
};
use storyboard_gemini::GeminiClient;

pub async fn run_interactive(config: Config) -> Result<()> {
    let mut app = InteractiveApp::new(config);
    app.run().await
}

pub struct InteractiveApp {
    running: bool,
    config: Config,
    input: String,
    state: SessionState,
    captions: Vec<String>,
    slides: Vec<Slide>,
    status: String,
    session: Option<Session>,
}

impl InteractiveApp {
    pub fn new(config: Config) -> Self {
        Self {
            running: true,
            config,
            input: String::new(),
            state: SessionState::Idle,
            captions: Vec::new(),
            slides: Vec::new(),
            status: SessionState::Idle.user_message().to_string(),
            session: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let api_key = std::env::var(&self.config.api_key_env).unwrap_or_default();
        let source: Arc<dyn FragmentSource + Send + Sync> = if api_key.is_empty() {
            self.status = format!(
                "{} not set; running against the built-in demo stream",
                self.config.api_key_env
            );
            Arc::new(demo_source())
        } else {
            Arc::new(GeminiClient::new(api_key, &self.config))
        };
        self.session = Some(Session::spawn(source, self.config.clone()));

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        while self.running {
            terminal.draw(|f| self.draw(f))?;

            let session = self.session.clone();
            tokio::select! {
                maybe_event = next_session_event(session.clone()), if session.is_some() => {
                    if let Some(event) = maybe_event {
                        self.handle_session_event(event);
                    }
                }
                key_ready = tokio::task::spawn_blocking(|| {
                    event::poll(std::time::Duration::from_millis(50))
                }) => {
                    if let Ok(Ok(true)) = key_ready {
                        if let Ok(TermEvent::Key(key)) = event::read() {
                            self.handle_key(key.code, key.modifiers).await;
                        }
                    }
                }
            }
        }

        if let Some(session) = &self.session {
            let _ = session.submit(Op::Shutdown).await;
        }

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        Ok(())
    }

    async fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        match code {
            KeyCode::Char('q') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.running = false;
            }
            KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.save_grid().await;
            }
            KeyCode::Esc => {
                if self.state == SessionState::Running {
                    if let Some(session) = &self.session {
                        let _ = session.submit(Op::Cancel).await;
                    }
                }
            }
            KeyCode::Enter => {
                self.submit_prompt().await;
            }
            KeyCode::Char(c) => {
                self.input.push(c);
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            _ => {}
        }
    }

    async fn submit_prompt(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return;
        }
        if let Some(session) = &self.session {
            self.input.clear();
            let _ = session
                .submit(Op::Generate {
                    request: GenerationRequest::new(prompt),
                })
                .await;
        }
    }

    async fn save_grid(&mut self) {
        if self.slides.is_empty() || self.state == SessionState::Running {
            self.status = "Nothing to save yet.".to_string();
            return;
        }
        let columns = self.config.grid.columns;
        match compose(&self.slides, columns).await {
            Ok(png) => {
                let path = format!("storyboard-{columns}x{columns}.png");
                match std::fs::write(&path, png) {
                    Ok(()) => self.status = format!("Saved composite grid to {path}"),
                    Err(err) => self.status = format!("Could not write grid: {err}"),
                }
            }
            Err(err) => {
                self.status = format!("Could not compose grid: {err}");
            }
        }
    }

    fn handle_session_event(&mut self, event: Event) {
        match event {
            Event::SessionConfigured { .. } => {}
            Event::StateChanged { state } => {
                self.state = state;
                self.status = state.user_message().to_string();
                if state == SessionState::Running {
                    self.captions.clear();
                    self.slides.clear();
                }
            }
            Event::SlideAdded { index, slide } => {
                self.captions
                    .push(format!("{:>2}. {}", index + 1, slide.markup));
            }
            Event::StillWorking { waiting_secs } => {
                self.status = format!("Still working... ({waiting_secs}s of silence)");
            }
            Event::GenerationRejected { reason } => {
                self.status = format!("Rejected: {reason}");
            }
            Event::GenerationComplete { slides } => {
                self.slides = slides;
            }
            Event::Error { message } => {
                self.status = format!("Error: {message}");
            }
            Event::ShutdownComplete => {
                self.running = false;
            }
        }
    }

    fn draw(&self, f: &mut Frame) {
        let size = f.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(3)])
            .split(size);

        let items: Vec<ListItem> = self
            .captions
            .iter()
            .map(|caption| ListItem::new(caption.as_str()))
            .collect();
        let title = format!("Storyboard [{}] {}", self.state, self.status);
        let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(list, chunks[0]);

        let input_area = chunks[1];
        let visible = visible_tail(&self.input, input_area.width.saturating_sub(2) as usize);
        let input = Paragraph::new(visible).block(
            Block::default()
                .title("Prompt (Enter=generate, Esc=cancel, Ctrl+D=save grid, Ctrl+Q=quit)")
                .borders(Borders::ALL),
        );
        f.render_widget(input, input_area);
    }
}

async fn next_session_event(session: Option<Session>) -> Option<Event> {
    match session {
        Some(session) => session.next_event().await,
        None => None,
    }
}

/// Keep the tail of the input that fits the given number of columns.
fn visible_tail(input: &str, max_cols: usize) -> &str {
    let mut start = 0;
    while input[start..].width() > max_cols {
        let mut indices = input[start..].char_indices();
        let _ = indices.next();
        match indices.next() {
            Some((offset, _)) => start += offset,
            None => break,
        }
    }
    &input[start..]
}

/// Scripted stand-in used when no API key is configured, so the UI can be
/// exercised offline. Its images are intentionally empty and render as
/// load-error cells in the composite.
fn demo_source() -> StubSource {
    let story = [
        "A lighthouse keeper finds a map in a bottle.",
        "The map points straight at her own lighthouse.",
        "Under the floorboards: a second, smaller lighthouse.",
    ];
    let mut events = Vec::new();
    for sentence in story {
        events.push(StreamEvent::Fragment(Fragment::Text {
            content: format!("{sentence} "),
        }));
        events.push(StreamEvent::Fragment(Fragment::Image {
            bytes: Vec::new(),
            media_type: "image/png".to_string(),
        }));
    }
    events.push(StreamEvent::Completed);
    StubSource::with_delay(events, std::time::Duration::from_millis(400))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_tail_keeps_short_input_whole() {
        assert_eq!(visible_tail("hello", 10), "hello");
    }

    #[test]
    fn visible_tail_trims_from_the_front() {
        assert_eq!(visible_tail("abcdef", 3), "def");
    }
}
