//! Process-wide key/value configuration.
//!
//! The file format is newline-delimited `key=value`. Lines starting with
//! `#` and blank lines are skipped. A key may be qualified with a superkey
//! (`food:fruit=apple`); a scoped lookup of `fruit` under `food` prefers
//! the qualified entry over the bare one.

use crate::{CoreError, CoreResult};
use indexmap::IndexMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Separator between superkey and key
pub const SUPERKEY_SEPARATOR: char = ':';

/// Shortest period any timer runs at
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Loaded configuration entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    entries: IndexMap<String, String>,
}

impl Configuration {
    /// Create an empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text. Malformed lines are skipped and returned
    /// alongside the entries that did parse.
    #[must_use]
    pub fn parse(text: &str) -> (Self, Vec<CoreError>) {
        let mut config = Self::new();
        let mut problems = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_entry(line) {
                Some((key, value)) => config.set(key, value),
                None => problems.push(CoreError::malformed(
                    "configuration",
                    format!("line {}: expected key=value, got '{}'", index + 1, line),
                )),
            }
        }

        (config, problems)
    }

    /// Load and parse a configuration file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read
    pub fn load(path: impl AsRef<Path>) -> CoreResult<(Self, Vec<CoreError>)> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::io(format!("reading {}", path.display()), e))?;
        Ok(Self::parse(&text))
    }

    /// Insert or replace an entry
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Apply a command-line override of the form `key=value`
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the override has no `=`
    pub fn apply_override(&mut self, text: &str) -> CoreResult<()> {
        let (key, value) = parse_entry(text.trim()).ok_or_else(|| {
            CoreError::malformed("override", format!("expected key=value, got '{}'", text))
        })?;
        self.set(key, value);
        Ok(())
    }

    /// Bare lookup
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Lookup preferring `superkey:key` over `key`
    #[must_use]
    pub fn get_in(&self, superkey: &str, key: &str) -> Option<&str> {
        self.entries
            .get(&format!("{}{}{}", superkey, SUPERKEY_SEPARATOR, key))
            .or_else(|| self.entries.get(key))
            .map(String::as_str)
    }

    /// Typed view without a superkey
    #[must_use]
    pub fn view(&self) -> ConfigView<'_> {
        ConfigView {
            config: self,
            superkey: None,
        }
    }

    /// Typed view scoped to a superkey
    #[must_use]
    pub fn scoped<'a>(&'a self, superkey: &'a str) -> ConfigView<'a> {
        ConfigView {
            config: self,
            superkey: Some(superkey),
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn parse_entry(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Read-only typed accessors over a configuration
#[derive(Debug, Clone, Copy)]
pub struct ConfigView<'a> {
    config: &'a Configuration,
    superkey: Option<&'a str>,
}

impl<'a> ConfigView<'a> {
    /// Raw lookup honouring the superkey
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a str> {
        match self.superkey {
            Some(superkey) => self.config.get_in(superkey, key),
            None => self.config.get(key),
        }
        .filter(|v| !v.is_empty())
    }

    /// Value that has no sensible default
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the key is absent
    pub fn require(&self, key: &str) -> CoreResult<&'a str> {
        self.get(key).ok_or_else(|| CoreError::ConfigMissing {
            key: key.to_string(),
        })
    }

    /// Parsed value, `None` if absent
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if present but unparsable
    pub fn parsed<T: FromStr>(&self, key: &str) -> CoreResult<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    CoreError::malformed("configuration", format!("{}='{}': {}", key, raw, e))
                })
            })
            .transpose()
    }

    /// Parsed value that must be present
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if absent or `Malformed` if unparsable
    pub fn require_parsed<T: FromStr>(&self, key: &str) -> CoreResult<T>
    where
        T::Err: std::fmt::Display,
    {
        self.parsed(key)?.ok_or_else(|| CoreError::ConfigMissing {
            key: key.to_string(),
        })
    }

    /// Parsed value with a fallback
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if present but unparsable
    pub fn parsed_or<T: FromStr>(&self, key: &str, default: T) -> CoreResult<T>
    where
        T::Err: std::fmt::Display,
    {
        Ok(self.parsed(key)?.unwrap_or(default))
    }

    /// String value with a fallback
    #[must_use]
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Comma-separated list; empty when absent
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Boolean flag (`1/true/yes/on`, `0/false/no/off`)
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for any other spelling
    pub fn flag_or(&self, key: &str, default: bool) -> CoreResult<bool> {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(CoreError::malformed(
                "configuration",
                format!("{}='{}' is not a boolean", key, other),
            )),
        }
    }

    /// Millisecond period with a fallback
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if present but not a positive integer
    pub fn millis_or(&self, key: &str, default: Duration) -> CoreResult<Duration> {
        match self.parsed::<u64>(key)? {
            None => Ok(default),
            Some(0) => Err(CoreError::malformed(
                "configuration",
                format!("{}=0, a period must be at least 1 ms", key),
            )),
            Some(ms) => Ok(Duration::from_millis(ms)),
        }
    }
}
