//! Command-line interface for srcmin
//!
//! Usage:
//!   srcmin python `<path>`... [--output `<file>`]       - Minify block language files
//!   srcmin postscript `<path>`                        - Minify a PostScript file
//!   srcmin procsets `<path>`                          - Minify a procset definitions table
//!   srcmin tokens `<path>` [--format json|yaml|simple] - Dump block language tokens
//!   srcmin bundle `<path>`... --output `<file>`         - Build a single executable archive
//!
//! `--config <file>` layers a TOML file over the built-in defaults. Set `RUST_LOG=debug`
//! for per-file sizes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use srcmin::block::{minify_file, tokenize};
use srcmin::bracket::{minify_postscript, minify_procsets};
use srcmin::bundle::{build_single, BundleEntry, EntryKind, ExternalRecompressor, Recompressor};
use srcmin::config::{Loader, SrcminConfig};
use srcmin::source::check_input;

fn cli() -> Command {
    Command::new("srcmin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Minify Python sources and PostScript procsets")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("TOML file layered over the built-in defaults"),
        )
        .subcommand(
            Command::new("python")
                .about("Minify block language files")
                .arg(
                    Arg::new("paths")
                        .help("Files to minify")
                        .required(true)
                        .num_args(1..),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Write the result to this file instead of stdout"),
                )
                .arg(
                    Arg::new("no-check-input")
                        .long("no-check-input")
                        .help("Accept non-ASCII input and coding declarations")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-verify")
                        .long("no-verify")
                        .help("Skip output validation and the equivalence check")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("postscript")
                .about("Minify a PostScript file")
                .arg(Arg::new("path").required(true).index(1)),
        )
        .subcommand(
            Command::new("procsets")
                .about("Minify a table of PostScript procset definitions")
                .arg(Arg::new("path").required(true).index(1)),
        )
        .subcommand(
            Command::new("tokens")
                .about("Dump the block language token stream")
                .arg(Arg::new("path").required(true).index(1))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .value_parser(["json", "yaml", "simple"])
                        .default_value("json"),
                ),
        )
        .subcommand(
            Command::new("bundle")
                .about("Minify files into a zip archive behind the configured header")
                .arg(
                    Arg::new("paths")
                        .help("Block language files, minified")
                        .num_args(0..),
                )
                .arg(
                    Arg::new("procsets")
                        .long("procsets")
                        .help("Procset definitions table, serialized")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("literal")
                        .long("literal")
                        .help("File stored without changes")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .required(true)
                        .help("Single file to create"),
                )
                .arg(
                    Arg::new("archive")
                        .long("archive")
                        .help("Intermediate archive path (default: the output path with a .zip extension)"),
                )
                .arg(
                    Arg::new("no-recompress")
                        .long("no-recompress")
                        .help("Skip the external recompressor")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn load_config(sub: &ArgMatches) -> Result<SrcminConfig> {
    let mut loader = Loader::new();
    if let Some(path) = sub.get_one::<String>("config") {
        loader = loader.with_file(path);
    }
    if sub.try_get_one::<bool>("no-check-input").ok().flatten() == Some(&true) {
        loader = loader.set_override("block.check_input", false)?;
    }
    if sub.try_get_one::<bool>("no-verify").ok().flatten() == Some(&true) {
        loader = loader
            .set_override("block.validate_output", false)?
            .set_override("block.check_equivalence", false)?;
    }
    loader.build().context("loading configuration")
}

fn read(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path))
}

fn handle_python(sub: &ArgMatches, config: &SrcminConfig) -> Result<()> {
    let paths: Vec<&String> = sub
        .get_many::<String>("paths")
        .map(|paths| paths.collect())
        .unwrap_or_default();
    let output = sub.get_one::<String>("output");
    if output.is_some() && paths.len() > 1 {
        bail!("--output takes a single input file");
    }

    let mut minified = String::new();
    for path in paths {
        minified.push_str(&minify_file(path, &read(path)?, &config.block)?);
    }
    match output {
        Some(output) => {
            fs::write(output, &minified).with_context(|| format!("writing {}", output))?
        }
        None => io::stdout().write_all(minified.as_bytes())?,
    }
    Ok(())
}

fn handle_postscript(path: &str) -> Result<()> {
    let source = read(path)?;
    let minified = minify_postscript(&source).with_context(|| path.to_string())?;
    println!("{}", minified);
    Ok(())
}

fn handle_procsets(path: &str, config: &SrcminConfig) -> Result<()> {
    let source = read(path)?;
    let minified = minify_procsets(&source, &config.procsets).with_context(|| path.to_string())?;
    print!("{}", minified);
    Ok(())
}

fn handle_tokens(path: &str, format: &str, config: &SrcminConfig) -> Result<()> {
    let source = read(path)?;
    if config.block.check_input {
        check_input(&source).with_context(|| path.to_string())?;
    }
    let tokens = tokenize(&source).with_context(|| path.to_string())?;
    let formatted = match format {
        "yaml" => serde_yaml::to_string(&tokens)?,
        "simple" => tokens
            .iter()
            .map(|token| format!("{:?} {:?}\n", token.kind, token.text))
            .collect(),
        _ => serde_json::to_string_pretty(&tokens)? + "\n",
    };
    print!("{}", formatted);
    Ok(())
}

fn handle_bundle(sub: &ArgMatches, config: &SrcminConfig) -> Result<()> {
    let mut entries = Vec::new();
    for (id, kind) in [
        ("paths", EntryKind::Block),
        ("procsets", EntryKind::Procsets),
        ("literal", EntryKind::Literal),
    ] {
        for path in sub.get_many::<String>(id).into_iter().flatten() {
            entries.push(BundleEntry::from_path(path, kind)?);
        }
    }
    if entries.is_empty() {
        bail!("nothing to bundle");
    }

    let output = sub
        .get_one::<String>("output")
        .map(Path::new)
        .context("missing --output")?;
    let archive = match sub.get_one::<String>("archive") {
        Some(archive) => PathBuf::from(archive),
        None => output.with_extension("zip"),
    };
    let recompressor = if sub.get_flag("no-recompress") {
        None
    } else {
        Some(ExternalRecompressor::from_config(&config.bundle)?)
    };

    let stats = build_single(
        &entries,
        config,
        &archive,
        output,
        recompressor.as_ref().map(|r| r as &dyn Recompressor),
    )
    .with_context(|| format!("building {}", output.display()))?;
    eprintln!(
        "{}: {} entries, {} -> {} bytes",
        output.display(),
        stats.entries,
        stats.original,
        stats.minified
    );
    Ok(())
}

fn run() -> Result<()> {
    let matches = cli().get_matches();
    let Some((name, sub)) = matches.subcommand() else {
        bail!("no subcommand given");
    };
    let config = load_config(sub)?;
    let path = || {
        sub.get_one::<String>("path")
            .map(String::as_str)
            .context("missing path")
    };

    match name {
        "python" => handle_python(sub, &config),
        "postscript" => handle_postscript(path()?),
        "procsets" => handle_procsets(path()?, &config),
        "tokens" => {
            let format = sub
                .get_one::<String>("format")
                .map(String::as_str)
                .unwrap_or("json");
            handle_tokens(path()?, format, &config)
        }
        "bundle" => handle_bundle(sub, &config),
        other => bail!("unknown subcommand {}", other),
    }
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("srcmin: {:#}", error);
        std::process::exit(1);
    }
}
