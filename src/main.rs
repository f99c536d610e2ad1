use vestibule::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::vest::run_vest().await
}
