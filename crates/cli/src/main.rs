use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    launch_settings_cli::main_entry().await
}
