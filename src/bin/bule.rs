use vestibule::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::bule::run_bule().await
}
