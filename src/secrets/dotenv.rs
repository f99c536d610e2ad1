//! Dotenv file provider.
//!
//! Parses `KEY=VALUE` files with dotenvy. Files listed later override earlier
//! ones; the combined result is then safe-merged, so nothing already in the
//! store is replaced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::environ::{Environ, Provider};
use crate::secrets::{Result, SecretsError};

/// Colon-separated list of files to read.
pub const DOTENV_FILES_ENV: &str = "DOTENV_FILES";

/// The `dotenv` provider.
#[derive(Debug, Clone)]
pub struct DotenvProvider {
    files: Vec<PathBuf>,
}

impl DotenvProvider {
    /// Registry name.
    pub const NAME: &'static str = "dotenv";

    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// Files from `DOTENV_FILES`, else every `*.env` file in the working directory.
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::from_lookup(|key| std::env::var(key).ok(), &cwd)
    }

    pub fn from_lookup<F>(lookup: F, dir: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listed: Vec<PathBuf> = lookup(DOTENV_FILES_ENV)
            .map(|v| v.split(':').map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();

        if !listed.is_empty() {
            return Ok(Self::new(listed));
        }
        Ok(Self::new(find_dotenv_files(dir)?))
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn read_files(&self) -> Result<BTreeMap<String, String>> {
        let mut pairs = BTreeMap::new();
        for file in &self.files {
            let iter = dotenvy::from_path_iter(file).map_err(|e| dotenv_error(file, e))?;
            for item in iter {
                let (key, value) = item.map_err(|e| dotenv_error(file, e))?;
                pairs.insert(key, value);
            }
            debug!(file = %file.display(), "Parsed dotenv file");
        }
        Ok(pairs)
    }
}

fn dotenv_error(file: &Path, err: dotenvy::Error) -> SecretsError {
    match err {
        dotenvy::Error::Io(e) => SecretsError::IoError(e),
        other => SecretsError::decode(format!("dotenv file {}", file.display()), other.to_string()),
    }
}

/// `*.env` files directly inside `dir`, sorted by path.
fn find_dotenv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "env") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Provider for DotenvProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn add_to_environ(&self, environ: &Environ) -> Result<()> {
        environ.delete(DOTENV_FILES_ENV);
        let pairs = self.read_files()?;
        environ.safe_merge(pairs);
        Ok(())
    }
}
