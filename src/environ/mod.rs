//! Concurrency-safe environment store and the provider machinery around it.
//!
//! [`Environ`] is the single piece of state shared between provider tasks.
//! Providers never talk to each other; they only commit finished
//! contributions through [`Environ::safe_merge`], so the first writer of a key
//! wins and a value seeded by a higher-priority source is never clobbered.
//!
//! # Key normalisation
//!
//! Keys are stored exactly as written. Read views ([`Environ::slice`],
//! [`Environ::map`], [`Environ::write_to`]) collapse every run of characters
//! outside `[0-9A-Za-z_]` to a single `_` and, when `upcase_keys` is on,
//! uppercase the result. Two raw keys that collide after normalisation resolve
//! to the one written most recently.

pub mod format;
pub mod populate;
pub mod provider;
pub mod registry;

pub use format::OutputFormat;
pub use populate::{populate, PopulateReport};
pub use provider::Provider;
pub use registry::{ProviderFactory, ProviderRegistry, RegistryError};

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::errors::Result;

lazy_static! {
    /// One or more characters that may not appear in an environment variable name.
    /// NOTE: expect() acceptable - pattern is validated by tests
    static ref INVALID_KEY_CHARS: Regex = Regex::new(r"[^0-9A-Za-z_]+")
        .expect("BUG: INVALID_KEY_CHARS pattern is invalid - validated by tests");
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, key: String, value: String) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, Entry { value, seq });
    }

    fn insert_if_absent(&mut self, key: String, value: String) {
        if !self.entries.contains_key(&key) {
            self.insert(key, value);
        }
    }
}

/// A concurrency-safe map of environment variable names to secret values.
///
/// Readers (`load`, `slice`, `map`, `write_to`) take a shared lock, writers
/// take an exclusive one. No lock is held across an await point.
pub struct Environ {
    inner: RwLock<Inner>,
    upcase_keys: bool,
    format: OutputFormat,
}

impl Default for Environ {
    fn default() -> Self {
        Self::new()
    }
}

impl Environ {
    /// Create an empty store with uppercase output keys and JSON output.
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()), upcase_keys: true, format: OutputFormat::Json }
    }

    /// Toggle uppercasing of keys in read views.
    pub fn with_upcase_keys(mut self, upcase: bool) -> Self {
        self.upcase_keys = upcase;
        self
    }

    /// Select the encoding used by [`Environ::write_to`].
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// The encoding used by [`Environ::write_to`].
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    // A poisoned lock only means a writer panicked between two complete
    // inserts; the map itself is always consistent.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unconditionally set `key` to `value`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.write().insert(key.into(), value.into());
    }

    /// Look up the raw (un-normalised) key.
    pub fn load(&self, key: &str) -> Option<String> {
        self.read().entries.get(key).map(|e| e.value.clone())
    }

    /// Remove `key`, returning its previous value.
    pub fn delete(&self, key: &str) -> Option<String> {
        self.write().entries.remove(key).map(|e| e.value)
    }

    /// Bulk write, overwriting existing keys.
    pub fn merge<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut inner = self.write();
        for (k, v) in pairs {
            inner.insert(k.into(), v.into());
        }
    }

    /// Bulk write that never overwrites a key already present.
    pub fn safe_merge<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut inner = self.write();
        for (k, v) in pairs {
            inner.insert_if_absent(k.into(), v.into());
        }
    }

    /// Like [`Environ::safe_merge`] but takes `KEY=VALUE` encoded pairs.
    ///
    /// Items without an `=` are ignored. Only the first `=` separates key and value.
    pub fn safe_append<I, S>(&self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.write();
        for item in items {
            if let Some((k, v)) = item.as_ref().split_once('=') {
                inner.insert_if_absent(k.to_string(), v.to_string());
            }
        }
    }

    /// Number of raw keys stored.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Apply output normalisation to a single key.
    pub fn normalize_key(&self, key: &str) -> String {
        let key = INVALID_KEY_CHARS.replace_all(key, "_");
        if self.upcase_keys {
            key.to_uppercase()
        } else {
            key.into_owned()
        }
    }

    fn normalized(&self) -> BTreeMap<String, String> {
        let inner = self.read();
        let mut ordered: Vec<(&String, &Entry)> = inner.entries.iter().collect();
        ordered.sort_by_key(|(_, e)| e.seq);

        let mut out = BTreeMap::new();
        for (k, e) in ordered {
            out.insert(self.normalize_key(k), e.value.clone());
        }
        out
    }

    /// Copy of the store with normalised keys.
    pub fn map(&self) -> BTreeMap<String, String> {
        self.normalized()
    }

    /// Sorted `KEY=VALUE` pairs with normalised keys, suitable as an exec environment.
    pub fn slice(&self) -> Vec<String> {
        let mut pairs: Vec<String> =
            self.normalized().into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        pairs.sort();
        pairs
    }

    /// Serialize the normalised view with the selected [`OutputFormat`].
    ///
    /// Partial writes are not rolled back.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<()> {
        let encoded = self.format.encode(&self.normalized())?;
        sink.write_all(&encoded)?;
        sink.flush()?;
        Ok(())
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environ")
            .field("keys", &self.map().keys().collect::<Vec<_>>())
            .field("upcase_keys", &self.upcase_keys)
            .field("format", &self.format)
            .finish()
    }
}

impl fmt::Display for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.slice())
    }
}

/// The current process environment, skipping variables that are not valid UTF-8.
pub fn ambient_vars() -> Vec<(String, String)> {
    unicode_pairs(std::env::vars_os())
}

/// Keep the pairs whose key and value are both valid UTF-8.
pub fn unicode_pairs<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => Some((k, v)),
            (k, _) => {
                debug!(key = %k.unwrap_or_else(|k| k.to_string_lossy().into_owned()), "Skipping non UTF-8 variable");
                None
            }
        })
        .collect()
}
