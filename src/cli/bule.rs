//! `bule`: gather secrets and write them to a file.

use std::path::PathBuf;

use clap::Parser;

use super::{gather, write_output, CommonArgs};

#[derive(Parser, Debug)]
#[command(name = "bule")]
#[command(about = "Write secrets to a file")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct BuleCli {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Path of the output file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Parse arguments and run `bule`.
///
/// Only gathered secrets are written; the ambient environment is not included.
pub async fn run_bule() -> anyhow::Result<()> {
    let cli = BuleCli::parse();
    let config = cli.common.runtime_config()?;

    let (environ, _report) = gather(&config, cli.common.debug).await;
    write_output(&environ, &cli.file).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        BuleCli::command().debug_assert();
    }

    #[test]
    fn test_parse() {
        let cli = BuleCli::try_parse_from(["bule", "-p", "dotenv", "--format", "toml", "/tmp/out.toml"])
            .unwrap();
        assert_eq!(cli.common.providers, vec!["dotenv"]);
        assert_eq!(cli.file, PathBuf::from("/tmp/out.toml"));
        assert!(BuleCli::try_parse_from(["bule"]).is_err());
    }
}
