//! Configuration for varpack
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, VarpackError};

/// Main configuration for a varpack store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------
    /// Landing directory that holds package directories.
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {package_name}/
    ///           ├── header
    ///           ├── index
    ///           └── var/
    ///                 └── pages
    pub data_dir: PathBuf,

    /// Name of the package directory under `data_dir`
    pub package_name: String,

    /// Package id stamped into every entry key of this package
    pub package_id: u64,

    // -------------------------------------------------------------------------
    // Pager Geometry
    // -------------------------------------------------------------------------
    /// Width of one unit in bytes
    pub unit_size: usize,

    /// Number of units per page
    pub page_size: usize,

    // -------------------------------------------------------------------------
    // Header Defaults
    // -------------------------------------------------------------------------
    /// Author written into newly created package headers
    pub author: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./varpack_data"),
            package_name: "usr".to_string(),
            package_id: 0,
            unit_size: 8,
            page_size: 64, // 512 byte pages
            author: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory of the configured package
    pub fn package_dir(&self) -> PathBuf {
        self.data_dir.join(&self.package_name)
    }

    /// Size of one page in bytes
    pub fn page_bytes(&self) -> usize {
        self.unit_size * self.page_size
    }

    /// Check the pager geometry
    pub fn validate(&self) -> Result<()> {
        if self.unit_size == 0 {
            return Err(VarpackError::Config("unit_size must be non-zero".to_string()));
        }
        if self.page_size == 0 {
            return Err(VarpackError::Config("page_size must be non-zero".to_string()));
        }
        if self
            .unit_size
            .checked_mul(self.page_size)
            .map_or(true, |bytes| bytes > u32::MAX as usize)
        {
            return Err(VarpackError::Config(format!(
                "page of {} units x {} bytes is too large",
                self.page_size, self.unit_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the landing directory for packages
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the package directory name
    pub fn package_name(mut self, name: impl Into<String>) -> Self {
        self.config.package_name = name.into();
        self
    }

    /// Set the package id
    pub fn package_id(mut self, id: u64) -> Self {
        self.config.package_id = id;
        self
    }

    /// Set the unit width (in bytes)
    pub fn unit_size(mut self, bytes: usize) -> Self {
        self.config.unit_size = bytes;
        self
    }

    /// Set the page size (in units)
    pub fn page_size(mut self, units: usize) -> Self {
        self.config.page_size = units;
        self
    }

    /// Set the author recorded in new package headers
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = Some(author.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
