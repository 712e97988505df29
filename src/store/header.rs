//! Package header
//!
//! One line of `key=value` tokens:
//! `version=<maj>.<min>.<rel> [author=<name> ]locked=<t|f> [geometry=<unit>x<page>]`

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VarpackError};

/// Package format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub release: u32,
}

impl Version {
    /// Version written by this crate
    pub const CURRENT: Version = Version::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, release: u32) -> Self {
        Self {
            major,
            minor,
            release,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.release)
    }
}

impl FromStr for Version {
    type Err = VarpackError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| VarpackError::Format(format!("invalid version '{}'", s)))?;

        match parts.as_slice() {
            [major, minor, release] => Ok(Version::new(*major, *minor, *release)),
            _ => Err(VarpackError::Format(format!(
                "version '{}' must be <major>.<minor>.<release>",
                s
            ))),
        }
    }
}

/// Pager geometry recorded in the header: `(unit_size, page_size)`
pub type Geometry = (usize, usize);

/// Package-level metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    version: Version,
    author: Option<String>,
    locked: bool,
    geometry: Option<Geometry>,
}

impl PackageHeader {
    /// Header for a new package at the current version
    pub fn new(author: Option<String>, geometry: Geometry) -> Result<Self> {
        Ok(Self {
            version: Version::CURRENT,
            author: validate_author(author)?,
            locked: false,
            geometry: Some(geometry),
        })
    }

    /// Parse header text. Tokens may be split across lines.
    ///
    /// `readonly=` is accepted as an older spelling of `locked=`. Unknown keys
    /// are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut version = None;
        let mut author = None;
        let mut locked = false;
        let mut geometry = None;

        for token in text.split_whitespace() {
            let (key, value) = token.split_once('=').ok_or_else(|| {
                VarpackError::Format(format!("header token '{}' is not key=value", token))
            })?;

            match key {
                "version" => version = Some(value.parse::<Version>()?),
                "author" => author = Some(value.to_string()),
                "locked" | "readonly" => locked = parse_bool(value)?,
                "geometry" => geometry = Some(parse_geometry(value)?),
                other => tracing::debug!("Skipping unknown header key '{}'", other),
            }
        }

        let version =
            version.ok_or_else(|| VarpackError::Format("header has no version".to_string()))?;

        Ok(Self {
            version,
            author,
            locked,
            geometry,
        })
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("version={}", self.version);
        if let Some(author) = &self.author {
            text.push_str(&format!(" author={}", author));
        }
        text.push_str(&format!(" locked={}", if self.locked { 't' } else { 'f' }));
        if let Some((unit, page)) = self.geometry {
            text.push_str(&format!(" geometry={}x{}", unit, page));
        }
        text
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Replace the author. Authors are single tokens.
    pub fn set_author(&mut self, author: Option<String>) -> Result<()> {
        self.author = validate_author(author)?;
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub(crate) fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = Some(geometry);
    }
}

impl fmt::Display for PackageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn validate_author(author: Option<String>) -> Result<Option<String>> {
    match author {
        Some(name) if name.is_empty() || name.chars().any(char::is_whitespace) => Err(
            VarpackError::Format(format!("author '{}' must be a single word", name)),
        ),
        other => Ok(other),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "t" => Ok(true),
        "f" => Ok(false),
        other => Err(VarpackError::Format(format!(
            "header flag must be t or f, got '{}'",
            other
        ))),
    }
}

fn parse_geometry(value: &str) -> Result<Geometry> {
    let invalid = || VarpackError::Format(format!("invalid geometry '{}'", value));
    let (unit, page) = value.split_once('x').ok_or_else(invalid)?;
    Ok((
        unit.parse().map_err(|_| invalid())?,
        page.parse().map_err(|_| invalid())?,
    ))
}
