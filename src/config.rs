//! Configuration loader.
//!
//! `defaults/srcmin.default.toml` is embedded into the library so that documentation and
//! runtime behavior stay in sync. Callers layer their own files on top of those defaults
//! via [`Loader`] before deserializing into [`SrcminConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

use crate::block::MinifyOptions;
use crate::bracket::ProcsetOptions;
use crate::bundle::BundleConfig;

const DEFAULT_TOML: &str = include_str!("../defaults/srcmin.default.toml");

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SrcminConfig {
    pub block: MinifyOptions,
    pub procsets: ProcsetOptions,
    pub bundle: BundleConfig,
}

/// Builds a [`SrcminConfig`] in layers: embedded defaults first, then each file or TOML
/// fragment in the order it was added, then CLI overrides such as `--no-verify`.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Loader holding only `defaults/srcmin.default.toml`.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a file named on the command line (`--config`); it must exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer a file that may be absent, such as a per-project `srcmin.toml`.
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer TOML text; sections not mentioned keep their earlier values.
    pub fn with_toml(mut self, toml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(toml, FileFormat::Toml));
        self
    }

    /// Set one dotted key, e.g. `block.check_input`. Overrides win over every layer.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge the layers and deserialize the `block`, `procsets` and `bundle` sections.
    pub fn build(self) -> Result<SrcminConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// The configuration used when no file or flag changes anything.
pub fn load_defaults() -> Result<SrcminConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.block, MinifyOptions::default());
        assert_eq!(config.procsets, ProcsetOptions::default());
        assert_eq!(config.bundle, BundleConfig::default());
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("procsets.delimiter", "@@")
            .expect("override to apply")
            .set_override("block.check_equivalence", false)
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.procsets.delimiter, "@@");
        assert_eq!(config.procsets.private_prefix, "__");
        assert!(!config.block.check_equivalence);
        assert!(config.block.validate_output);
    }

    #[test]
    fn layers_partial_files() {
        let config = Loader::new()
            .with_toml("[bundle]\nrecompressor = [\"gzip\", \"-9\"]\nheader = \"#!/bin/sh\\n\"\n")
            .build()
            .expect("config to build");
        assert_eq!(config.bundle.recompressor, vec!["gzip", "-9"]);
        assert_eq!(config.bundle.header, "#!/bin/sh\n");
        assert_eq!(config.bundle.mode, 0o755);
    }

    #[test]
    fn missing_optional_file_is_ignored() {
        let config = Loader::new()
            .with_optional_file("/nonexistent/srcmin.toml")
            .build()
            .expect("config to build");
        assert_eq!(config, load_defaults().unwrap());
    }

    #[test]
    fn overrides_win_over_later_layers() {
        let config = Loader::new()
            .set_override("block.check_input", false)
            .expect("override to apply")
            .with_toml("[block]\ncheck_input = true\nvalidate_input = false\n")
            .build()
            .expect("config to build");
        assert!(!config.block.check_input);
        assert!(!config.block.validate_input);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        assert!(Loader::new()
            .with_file("/nonexistent/srcmin.toml")
            .build()
            .is_err());
    }
}
