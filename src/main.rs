// probecache command-line entry point.
// Caches the stdout of a probe command under a key and prints the cached payload.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result, bail};
use clap::Parser;

use probecache::{Cache, FetchError, Format, Settings, logging};

/// Serve a probe's output from a local TTL cache, running the probe only when needed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file
    #[arg(long, env = "PROBECACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache root directory (overrides the settings file)
    #[arg(long, env = "PROBECACHE_ROOT")]
    root: Option<PathBuf>,

    /// Cache TTL in seconds, 0 for the default (overrides the settings file)
    #[arg(long, env = "PROBECACHE_TTL")]
    ttl: Option<f64>,

    /// Cache document format: yaml or json (overrides the settings file)
    #[arg(long)]
    format: Option<Format>,

    /// Run the probe even if the cached record is fresh
    #[arg(long)]
    force: bool,

    /// Remove the cached record for KEY instead of reading it
    #[arg(long, conflicts_with = "force")]
    invalidate: bool,

    /// Log every refill step to stderr
    #[arg(long, env = "PROBECACHE_DEBUG")]
    debug: bool,

    /// Cache key
    key: String,

    /// Probe command and its arguments
    #[arg(last = true)]
    command: Vec<String>,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_path(path)?,
            None => Settings::default(),
        };
        if let Some(root) = &self.root {
            settings.cache_root = root.clone();
        }
        if let Some(ttl) = self.ttl {
            settings.cache_ttl = ttl;
        }
        if let Some(format) = self.format {
            settings.format = format;
        }
        settings.debug |= self.debug;
        Ok(settings)
    }
}

/// Run `command` and return its stdout; any spawn failure or non-zero exit is a fetch error.
fn run_probe(command: &[String]) -> std::result::Result<Vec<u8>, FetchError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| FetchError::new("empty probe command"))?;

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(FetchError::new)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FetchError::new(format!(
            "`{program}` exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let settings = args.settings()?;
    logging::init(settings.debug);

    tracing::debug!(root = %settings.cache_root.display(), ttl = settings.effective_ttl(), "starting");

    let cache: Cache<[String]> = Cache::new(settings).with_fetcher(run_probe);

    if args.invalidate {
        let removed = cache
            .invalidate(&args.key)
            .with_context(|| format!("can't invalidate `{}`", args.key))?;
        tracing::debug!(key = %args.key, removed, "invalidate done");
        return Ok(ExitCode::SUCCESS);
    }

    if args.command.is_empty() {
        bail!("no probe command given; pass it after `--`");
    }

    let record = cache.get(&args.key, &args.command, args.force);
    match record.data() {
        Some(payload) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(payload)?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}
