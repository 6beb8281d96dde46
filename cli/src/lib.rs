use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use base64::Engine;
use clap::{Parser, Subcommand};

use storyboard_common::{AttachedImage, GenerationRequest};
use storyboard_core::{
    compose, Config, Event, FragmentSource, Op, Session, SessionState, Slide, SlideImage,
};
use storyboard_gemini::GeminiClient;
use storyboard_protocol::SlideManifest;

#[derive(Parser)]
#[command(name = "storyboard")]
#[command(about = "Streamed illustrated-story generation with a downloadable grid")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Override the generation model
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive storyboard session
    Interactive,
    /// Preview a previously saved storyboard
    Preview {
        /// Manifest file or the directory containing captions.json
        path: PathBuf,
    },
    /// Generate a storyboard from a prompt and save the composite grid
    Generate {
        /// Story prompt
        prompt: String,
        /// Grid columns for the composite (defaults to config)
        #[arg(short, long)]
        columns: Option<u32>,
        /// Attach a local reference image to the prompt
        #[arg(long)]
        image: Option<PathBuf>,
        /// Output path for the composite PNG
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also save per-slide images and the caption manifest here
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = Config::load_with_fallback();
    if let Some(model) = cli.model {
        config.model = model;
    }

    match cli.command {
        Some(Commands::Interactive) | None => storyboard_tui::run_interactive(config).await,
        Some(Commands::Preview { path }) => storyboard_tui::run_preview(&path).await,
        Some(Commands::Generate {
            prompt,
            columns,
            image,
            out,
            save_dir,
        }) => run_generate(config, prompt, columns, image, out, save_dir).await,
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_generate(
    config: Config,
    prompt: String,
    columns: Option<u32>,
    image: Option<PathBuf>,
    out: Option<PathBuf>,
    save_dir: Option<PathBuf>,
) -> Result<()> {
    let columns = columns.unwrap_or(config.grid.columns);
    let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
    anyhow::ensure!(
        !api_key.is_empty(),
        "no API key found; set {}",
        config.api_key_env
    );

    let mut request = GenerationRequest::new(prompt);
    if let Some(path) = image {
        request = request.with_attachment(AttachedImage::from_path(&path)?);
    }

    let source: Arc<dyn FragmentSource + Send + Sync> =
        Arc::new(GeminiClient::new(api_key, &config));
    let session = Session::spawn(source, config.clone());
    session.submit(Op::Generate { request }).await?;

    let mut slides: Vec<Slide> = Vec::new();
    let mut failure: Option<String> = None;
    while let Some(event) = session.next_event().await {
        match event {
            Event::SlideAdded { index, slide } => {
                println!("[{:>2}] {}", index + 1, slide.caption);
            }
            Event::StillWorking { waiting_secs } => {
                eprintln!("still working... ({waiting_secs}s of silence)");
            }
            Event::Error { message } => {
                failure = Some(message);
            }
            Event::GenerationComplete { slides: finished } => {
                slides = finished;
            }
            Event::StateChanged { state } if state.is_terminal() => {
                match state {
                    SessionState::Completed => break,
                    SessionState::Cancelled => {
                        anyhow::bail!("{}", state.user_message());
                    }
                    _ => {
                        let message =
                            failure.unwrap_or_else(|| state.user_message().to_string());
                        anyhow::bail!("{message}");
                    }
                }
            }
            _ => {}
        }
    }
    anyhow::ensure!(!slides.is_empty(), "generation finished without slides");
    let _ = session.submit(Op::Shutdown).await;

    if let Some(dir) = save_dir.or_else(|| config.save_dir.clone()) {
        save_slides(&dir, &slides)?;
        println!("Saved {} slide(s) to {}", slides.len(), dir.display());
    }

    let png = compose(&slides, columns).await?;
    let out = out.unwrap_or_else(|| PathBuf::from(format!("storyboard-{columns}x{columns}.png")));
    std::fs::write(&out, png)?;
    println!("Saved composite grid to {}", out.display());
    Ok(())
}

/// Write each slide image plus a caption manifest into `dir`.
fn save_slides(dir: &Path, slides: &[Slide]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (i, slide) in slides.iter().enumerate() {
        if let SlideImage::Inline { media_type, data } = &slide.image {
            match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(bytes) => {
                    let name = format!("slide-{:02}.{}", i + 1, extension_for(media_type));
                    std::fs::write(dir.join(name), bytes)?;
                }
                Err(err) => {
                    tracing::warn!("skipping slide {} image: {err}", i + 1);
                }
            }
        }
    }
    let manifest = SlideManifest {
        generated_at: chrono::Utc::now().to_rfc3339(),
        slides: slides.to_vec(),
    };
    std::fs::write(
        dir.join("captions.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(())
}

fn extension_for(media_type: &str) -> &str {
    mime_guess::get_mime_extensions_str(media_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_media_types_map_to_extensions() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("not/a-real-type"), "bin");
    }

    #[test]
    fn save_slides_writes_manifest_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let slides = vec![
            Slide {
                caption: "One.".to_string(),
                markup: "One.".to_string(),
                image: SlideImage::from_bytes(b"fake-png", "image/png"),
            },
            Slide {
                caption: "Two.".to_string(),
                markup: "Two.".to_string(),
                image: SlideImage::Placeholder,
            },
        ];
        save_slides(dir.path(), &slides).unwrap();

        assert!(dir.path().join("slide-01.png").exists());
        assert!(!dir.path().join("slide-02.png").exists());

        let manifest: SlideManifest =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("captions.json")).unwrap())
                .unwrap();
        assert_eq!(manifest.slides.len(), 2);
        assert!(manifest.slides[1].image.is_placeholder());
    }
}
