use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    storyboard_cli::run_cli().await
}
