//! Bundle assembly
//!
//!     A bundle is an archive of minified sources that runs as a single executable file: the
//!     archive bytes are appended to a header (typically a launcher script), so the file is
//!     both a script and an archive.
//!
//!     The archive format and the recompression tool are behind traits. [`write_bundle`]
//!     minifies each planned entry according to its kind and hands the result to an
//!     [`ArchiveWriter`]; the caller then closes the archive, optionally runs a
//!     [`Recompressor`] on it, and calls [`assemble_single`]. [`build_single`] runs that
//!     whole sequence with a zip archive on disk.

use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

use log::{debug, info};
use serde::Deserialize;
use time::OffsetDateTime;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::block::minify_file;
use crate::bracket::minify_procsets;
use crate::config::SrcminConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Program and leading arguments; the archive path is appended.
    pub recompressor: Vec<String>,
    pub header: String,
    /// Unix permission bits of the single file.
    pub mode: u32,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            recompressor: vec!["advzip".to_string(), "-qz4".to_string(), "--".to_string()],
            header: String::new(),
            mode: 0o755,
        }
    }
}

/// Destination of minified entries.
pub trait ArchiveWriter {
    fn write_entry(&mut self, name: &str, data: &[u8], mtime: SystemTime) -> Result<()>;
}

/// Improves the compression of a finished archive in place.
pub trait Recompressor {
    fn recompress(&self, path: &Path) -> Result<()>;
}

/// Runs an external program on the archive, e.g. `advzip -qz4 -- <path>`.
#[derive(Debug, Clone)]
pub struct ExternalRecompressor {
    program: String,
    args: Vec<String>,
}

impl ExternalRecompressor {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            Error::Config(config::ConfigError::Message(
                "bundle.recompressor must name a program".to_string(),
            ))
        })?;
        Ok(ExternalRecompressor {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn from_config(config: &BundleConfig) -> Result<Self> {
        Self::new(&config.recompressor)
    }
}

impl Recompressor for ExternalRecompressor {
    fn recompress(&self, path: &Path) -> Result<()> {
        debug!("running {} {:?} {}", self.program, self.args, path.display());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()?;
        if !status.success() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("{} failed on {}: {}", self.program, path.display(), status),
            )));
        }
        Ok(())
    }
}

/// In-memory archive, in entry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryArchive {
    pub entries: Vec<(String, Vec<u8>, SystemTime)>,
}

impl ArchiveWriter for MemoryArchive {
    fn write_entry(&mut self, name: &str, data: &[u8], mtime: SystemTime) -> Result<()> {
        self.entries.push((name.to_string(), data.to_vec(), mtime));
        Ok(())
    }
}

/// Zip container over any seekable writer. Entries are deflated.
pub struct ZipArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> ZipArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        ZipArchiveWriter {
            zip: ZipWriter::new(inner),
        }
    }

    /// Write the central directory and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}

impl<W: Write + Seek> ArchiveWriter for ZipArchiveWriter<W> {
    fn write_entry(&mut self, name: &str, data: &[u8], mtime: SystemTime) -> Result<()> {
        // Zip timestamps start in 1980; earlier times fall back to that epoch.
        let modified = DateTime::try_from(OffsetDateTime::from(mtime)).unwrap_or_default();
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(modified);
        self.zip.start_file(name, options)?;
        self.zip.write_all(data)?;
        Ok(())
    }
}

/// How an entry's source is turned into archive content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Block language module, minified and validated.
    Block,
    /// Stored as is.
    Literal,
    /// Definitions table of procsets, serialized into one assignment.
    Procsets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleEntry {
    pub name: String,
    pub kind: EntryKind,
    pub source: String,
    pub mtime: SystemTime,
}

impl BundleEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind, source: impl Into<String>) -> Self {
        BundleEntry {
            name: name.into(),
            kind,
            source: source.into(),
            mtime: SystemTime::now(),
        }
    }

    /// Read an entry from disk, keeping the file's modification time.
    pub fn from_path(path: impl AsRef<Path>, kind: EntryKind) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        let read = || -> Result<Self> {
            let source = fs::read_to_string(path)?;
            let mtime = fs::metadata(path)?.modified()?;
            Ok(BundleEntry {
                name: name.clone(),
                kind,
                source,
                mtime,
            })
        };
        read().map_err(|error| error.in_file(name.clone()))
    }

    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = mtime;
        self
    }

    /// Archive content of this entry.
    pub fn render(&self, config: &SrcminConfig) -> Result<String> {
        match self.kind {
            EntryKind::Block => minify_file(&self.name, &self.source, &config.block),
            EntryKind::Literal => Ok(self.source.clone()),
            EntryKind::Procsets => minify_procsets(&self.source, &config.procsets)
                .map_err(|error| error.in_file(self.name.clone())),
        }
    }
}

/// Byte counts over a whole bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleStats {
    pub entries: usize,
    pub original: usize,
    pub minified: usize,
}

/// Minify every entry and write it to `archive`, in order.
pub fn write_bundle<W: ArchiveWriter>(
    entries: &[BundleEntry],
    config: &SrcminConfig,
    archive: &mut W,
) -> Result<BundleStats> {
    let mut stats = BundleStats::default();
    for entry in entries {
        let content = entry.render(config)?;
        archive.write_entry(&entry.name, content.as_bytes(), entry.mtime)?;
        info!(
            "{}: {} -> {} bytes",
            entry.name,
            entry.source.len(),
            content.len()
        );
        stats.entries += 1;
        stats.original += entry.source.len();
        stats.minified += content.len();
    }
    Ok(stats)
}

/// Header followed by the archive bytes.
pub fn assemble_single(header: &str, archive: &[u8]) -> Vec<u8> {
    let mut single = Vec::with_capacity(header.len() + archive.len());
    single.extend_from_slice(header.as_bytes());
    single.extend_from_slice(archive);
    single
}

/// Write the single file and set its permission bits.
pub fn write_single(path: impl AsRef<Path>, config: &BundleConfig, archive: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let single = assemble_single(&config.header, archive);
    fs::write(path, &single)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(config.mode))?;
    }
    info!("created {} ({} bytes)", path.display(), single.len());
    Ok(())
}

/// Minify `entries` into a zip at `archive_path`, recompress it, and write the single file
/// to `output`.
pub fn build_single(
    entries: &[BundleEntry],
    config: &SrcminConfig,
    archive_path: &Path,
    output: &Path,
    recompressor: Option<&dyn Recompressor>,
) -> Result<BundleStats> {
    let mut archive = ZipArchiveWriter::new(File::create(archive_path)?);
    let stats = write_bundle(entries, config, &mut archive)?;
    archive.finish()?.sync_all()?;

    if let Some(recompressor) = recompressor {
        recompressor.recompress(archive_path)?;
    }
    let bytes = fs::read(archive_path)?;
    write_single(output, &config.bundle, &bytes)?;
    info!(
        "{} entries: {} -> {} bytes of source, {} bytes archived",
        stats.entries,
        stats.original,
        stats.minified,
        bytes.len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_defaults;
    use std::io::{Cursor, Read};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn entries() -> Vec<BundleEntry> {
        let mtime = UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        vec![
            BundleEntry::new("pkg/mod.py", EntryKind::Block, "def f(x):\n    return x + 1\n")
                .with_mtime(mtime),
            BundleEntry::new("__main__.py", EntryKind::Literal, "import m").with_mtime(mtime),
            BundleEntry::new("pkg/psproc.py", EntryKind::Procsets, "a = '/A { 1 } def'\n")
                .with_mtime(mtime),
        ]
    }

    #[test]
    fn test_write_bundle_renders_each_kind() {
        let config = load_defaults().unwrap();
        let mut archive = MemoryArchive::default();
        let stats = write_bundle(&entries(), &config, &mut archive).unwrap();

        let names: Vec<_> = archive.entries.iter().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, vec!["pkg/mod.py", "__main__.py", "pkg/psproc.py"]);
        assert_eq!(archive.entries[0].1, b"def f(x):\n return x+1\n");
        assert_eq!(archive.entries[1].1, b"import m");
        assert_eq!(
            String::from_utf8(archive.entries[2].1.clone()).unwrap(),
            "a,=r'''/A{1}def\n'''.split(\"\\n%%\")\n"
        );
        assert_eq!(archive.entries[0].2, UNIX_EPOCH + Duration::from_secs(1_500_000_000));
        assert_eq!(stats.entries, 3);
        assert!(stats.minified < stats.original);
    }

    #[test]
    fn test_write_bundle_stops_at_first_error() {
        let config = load_defaults().unwrap();
        let bad = vec![
            BundleEntry::new("ok.py", EntryKind::Block, "x = 1\n"),
            BundleEntry::new("bad.py", EntryKind::Block, "def f(:\n"),
            BundleEntry::new("never.py", EntryKind::Block, "y = 2\n"),
        ];
        let mut archive = MemoryArchive::default();
        let err = write_bundle(&bad, &config, &mut archive).unwrap_err();
        assert!(err.to_string().starts_with("bad.py: "), "{err}");
        assert_eq!(archive.entries.len(), 1);
    }

    #[test]
    fn test_assemble_single() {
        assert_eq!(assemble_single("#!/bin/sh\n", b"PK\x03\x04"), b"#!/bin/sh\nPK\x03\x04");
        assert_eq!(assemble_single("", b"PK"), b"PK");
    }

    #[test]
    fn test_empty_recompressor_command_is_rejected() {
        assert!(matches!(ExternalRecompressor::new(&[]), Err(Error::Config(_))));
        let config = BundleConfig {
            recompressor: Vec::new(),
            ..BundleConfig::default()
        };
        assert!(matches!(ExternalRecompressor::from_config(&config), Err(Error::Config(_))));
    }

    fn read_zip(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = String::new();
                file.read_to_string(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_zip_writer_keeps_order_and_content() {
        let config = load_defaults().unwrap();
        let mut archive = ZipArchiveWriter::new(Cursor::new(Vec::new()));
        write_bundle(&entries(), &config, &mut archive).unwrap();
        let bytes = archive.finish().unwrap().into_inner();

        let files = read_zip(&bytes);
        assert_eq!(files[0], ("pkg/mod.py".to_string(), "def f(x):\n return x+1\n".to_string()));
        assert_eq!(files[1], ("__main__.py".to_string(), "import m".to_string()));
        assert_eq!(files[2].0, "pkg/psproc.py");

        let mut archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let modified = archive.by_index(0).unwrap().last_modified();
        assert_eq!((modified.year(), modified.month(), modified.day()), (2017, 7, 14));
    }

    #[test]
    fn test_write_single_prepends_header_and_sets_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single");
        let config = BundleConfig {
            header: "#!/bin/sh\nexec python3 \"$0\"\n".to_string(),
            mode: 0o750,
            ..BundleConfig::default()
        };
        write_single(&path, &config, b"PK\x05\x06").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"#!/bin/sh\nexec python3 \"$0\"\nPK\x05\x06");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o750);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_external_recompressor_checks_exit_status() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        fs::write(&path, b"PK").unwrap();

        let succeeding = ExternalRecompressor::new(&["true".to_string()]).unwrap();
        succeeding.recompress(&path).unwrap();

        let config = BundleConfig {
            recompressor: vec!["false".to_string(), "--".to_string()],
            ..BundleConfig::default()
        };
        let failing = ExternalRecompressor::from_config(&config).unwrap();
        let err = failing.recompress(&path).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert!(err.to_string().starts_with("false failed on "), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_recompressor_program_is_an_io_error() {
        let recompressor =
            ExternalRecompressor::new(&["srcmin-no-such-recompressor".to_string()]).unwrap();
        let err = recompressor.recompress(Path::new("archive.zip")).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_build_single_runs_the_whole_sequence() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("bundle.zip");
        let output = dir.path().join("bundle");
        let mut config = load_defaults().unwrap();
        config.bundle.header = "#!/usr/bin/env python3\n".to_string();
        let recompressor = ExternalRecompressor::new(&["true".to_string()]).unwrap();

        let stats = build_single(
            &entries(),
            &config,
            &archive_path,
            &output,
            Some(&recompressor as &dyn Recompressor),
        )
        .unwrap();
        assert_eq!(stats.entries, 3);

        let single = fs::read(&output).unwrap();
        let header = config.bundle.header.as_bytes();
        assert!(single.starts_with(header));
        assert_eq!(&single[header.len()..], &fs::read(&archive_path).unwrap()[..]);
        let names: Vec<_> = read_zip(&single[header.len()..])
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["pkg/mod.py", "__main__.py", "pkg/psproc.py"]);

        use std::os::unix::fs::PermissionsExt;
        assert_eq!(fs::metadata(&output).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn test_missing_entry_file_names_the_file() {
        let err = BundleEntry::from_path("/nonexistent/mod.py", EntryKind::Block).unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent/mod.py: "), "{err}");
        assert!(matches!(err.root(), Error::Io(_)));
    }
}
