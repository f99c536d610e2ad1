//! `vest`: gather secrets, then exec the target command with them.

use std::path::PathBuf;
use std::process::Command;

use clap::Parser;
use tracing::debug;

use super::{filter_ambient, gather, write_output_logged, CommonArgs};
use crate::environ::ambient_vars;
use crate::errors::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "vest")]
#[command(about = "Gather secrets into the environment, then exec a command")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct VestCli {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Also write the gathered secrets to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Parse arguments and run `vest`. Only returns on failure (unix) or when the
/// child exits (elsewhere).
pub async fn run_vest() -> anyhow::Result<()> {
    let cli = VestCli::parse();
    let mut config = cli.common.runtime_config()?;
    if cli.output.is_some() {
        config.output_file = cli.output.clone();
    }

    let (environ, _report) = gather(&config, cli.common.debug).await;

    if let Some(path) = &config.output_file {
        write_output_logged(&environ, path).await;
    }

    // Gathered secrets win over the ambient environment
    environ.safe_append(filter_ambient(ambient_vars()));

    let env = environ.slice();
    debug!(command = %cli.command[0], vars = env.len(), "Handing off to command");
    Err(exec(&cli.command, &env).into())
}

fn command(argv: &[String], env: &[String]) -> Result<Command> {
    let (program, args) =
        argv.split_first().ok_or_else(|| Error::config("no command given"))?;

    let mut cmd = Command::new(program);
    cmd.args(args).env_clear();
    for pair in env {
        if let Some((k, v)) = pair.split_once('=') {
            cmd.env(k, v);
        }
    }
    Ok(cmd)
}

/// Replace the current process with `argv`, using exactly `env` as its environment.
#[cfg(unix)]
pub fn exec(argv: &[String], env: &[String]) -> Error {
    use std::os::unix::process::CommandExt;

    match command(argv, env) {
        Ok(mut cmd) => Error::exec(format!("{}: {}", argv[0], cmd.exec())),
        Err(e) => e,
    }
}

/// Run `argv` as a child with exactly `env` and exit with its status.
#[cfg(not(unix))]
pub fn exec(argv: &[String], env: &[String]) -> Error {
    let mut cmd = match command(argv, env) {
        Ok(cmd) => cmd,
        Err(e) => return e,
    };
    match cmd.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => Error::exec(format!("{}: {}", argv[0], e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        VestCli::command().debug_assert();
    }

    #[test]
    fn test_parse_trailing_command() {
        let cli = VestCli::try_parse_from([
            "vest", "-p", "vault", "--provider", "dotenv", "-F", "env", "--", "bundle", "exec", "puma",
            "-C", "config/puma.rb",
        ])
        .unwrap();
        assert_eq!(cli.common.providers, vec!["vault", "dotenv"]);
        assert_eq!(cli.common.format.as_deref(), Some("env"));
        assert_eq!(cli.command, vec!["bundle", "exec", "puma", "-C", "config/puma.rb"]);
    }

    #[test]
    fn test_command_is_required() {
        assert!(VestCli::try_parse_from(["vest"]).is_err());
        assert!(VestCli::try_parse_from(["vest", "-F", "xml", "true"]).is_err());
    }

    #[test]
    fn test_command_environment_is_exact() {
        let cmd = command(
            &["env".to_string()],
            &["A=1".to_string(), "B=x=y".to_string()],
        )
        .unwrap();
        let envs: Vec<_> = cmd
            .get_envs()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.map(|v| v.to_string_lossy().into_owned())))
            .collect();
        assert_eq!(
            envs,
            vec![("A".to_string(), Some("1".to_string())), ("B".to_string(), Some("x=y".to_string()))]
        );
    }

    #[test]
    fn test_empty_command() {
        assert!(command(&[], &[]).is_err());
    }
}
