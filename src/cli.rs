//! CLI parsing and orchestration. Reads the source, resolves its URLs, prints the
//! rewritten text, and maps errors to exit codes.

use crate::archive::{
    AggregateFailure, Resolver, RetryPolicy, SkipRules, WaybackClient, DEFAULT_RETRY_COUNT,
    DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT_SECS,
};
use crate::cancel::{self, CancelToken};
use crate::config::{self, Config};
use crate::source::{Source, SourceError};
use crate::urls::{extract_urls, substitute_urls};
use clap::Parser;
use log::LevelFilter;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("Cannot write output: {0}")]
    Output(#[from] std::io::Error),

    /// The aggregate's lines already carry each URL's cause, so it is not a `source`.
    #[error("{} URL(s) could not be archived:\n{0}", .0.failures.len())]
    Lookup(AggregateFailure),

    #[error("{0}")]
    Interrupted(AggregateFailure),
}

impl From<AggregateFailure> for CliRunError {
    fn from(e: AggregateFailure) -> Self {
        if e.cancelled {
            CliRunError::Interrupted(e)
        } else {
            CliRunError::Lookup(e)
        }
    }
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Source(_) | CliRunError::Output(_) => 1,
            CliRunError::Lookup(_) => 2,
            CliRunError::Interrupted(_) => 130,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "webarchive")]
#[command(about = "Look up WayBack Machine addresses for URLs", version)]
#[command(
    after_help = "Without URL arguments, every http(s) URL in the source text is replaced by its most recent snapshot and the text is printed. Config file keys (timeout_secs, retry_count, retry_delay_secs, from, skip_hosts, user_agent, silent) are read from ./webarchive.toml or the user config dir. Flags and WEBARCHIVE_* environment variables override config."
)]
pub struct Args {
    /// URLs to look up directly. Each archived URL is printed on its own line.
    pub urls: Vec<String>,

    /// Source file or URL for things to replace (`-` for stdin, the default).
    #[arg(long, env = "WEBARCHIVE_SRC", value_name = "FILE_OR_URL")]
    pub src: Option<String>,

    /// Connection timeout in seconds (default 10).
    #[arg(long, env = "WEBARCHIVE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Number of times to try each lookup (default 3).
    #[arg(long, env = "WEBARCHIVE_RETRIES")]
    pub retries: Option<u32>,

    /// Seconds to wait before retrying (default 5).
    #[arg(long, env = "WEBARCHIVE_RETRY_TIME")]
    pub retry_time: Option<u64>,

    /// Date to search from in YYYYMMDD format.
    #[arg(long, env = "WEBARCHIVE_FROM", value_parser = parse_from_date)]
    pub from: Option<String>,

    /// Hostname never looked up (repeatable; web.archive.org is always skipped).
    #[arg(long = "skip-host", env = "WEBARCHIVE_SKIP_HOSTS", value_delimiter = ',')]
    pub skip_hosts: Vec<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, env = "WEBARCHIVE_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Don't log lookups.
    #[arg(short, long, env = "WEBARCHIVE_SILENT")]
    pub silent: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,
}

/// CDX accepts a date prefix of 4 to 14 digits (YYYY up to YYYYMMDDhhmmss).
fn parse_from_date(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.len() < 4 || s.len() > 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "Invalid --from value: '{}'. Use a date like 20190131 (YYYYMMDD).",
            s
        ));
    }
    Ok(s.to_string())
}

/// Effective settings after merging flags/env over config over defaults.
#[derive(Debug)]
struct Settings {
    source: Source,
    timeout: Duration,
    retry: RetryPolicy,
    from: Option<String>,
    skip_hosts: Vec<String>,
    user_agent: Option<String>,
    silent: bool,
}

impl Settings {
    fn new(args: &Args, config: Option<&Config>) -> Result<Self, CliRunError> {
        let timeout_secs = args
            .timeout
            .or_else(|| config.and_then(|c| c.timeout_secs))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let retry_count = args
            .retries
            .or_else(|| config.and_then(|c| c.retry_count))
            .unwrap_or(DEFAULT_RETRY_COUNT);
        let retry_delay = args
            .retry_time
            .or_else(|| config.and_then(|c| c.retry_delay_secs))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_DELAY);
        let from = match args.from.clone() {
            Some(from) => Some(from),
            None => config
                .and_then(|c| c.from.as_deref())
                .map(parse_from_date)
                .transpose()
                .map_err(CliRunError::InvalidInput)?,
        };
        let skip_hosts = if args.skip_hosts.is_empty() {
            config
                .and_then(|c| c.skip_hosts.clone())
                .unwrap_or_default()
        } else {
            args.skip_hosts.clone()
        };
        let user_agent = args
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone()));
        let silent = args.silent || config.and_then(|c| c.silent).unwrap_or(false);
        Ok(Settings {
            source: args.src.as_deref().map(Source::parse).unwrap_or_default(),
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy::new(retry_count, retry_delay),
            from,
            skip_hosts,
            user_agent,
            silent,
        })
    }

    fn client(&self) -> Result<WaybackClient, CliRunError> {
        let mut builder = WaybackClient::builder()
            .timeout(self.timeout)
            .from_date(self.from.clone());
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder
            .build()
            .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Log lookups to stderr as `webarchive: <time> <event>`. `RUST_LOG` may refine the
/// level; `silent` installs no logger at all.
fn init_logging(silent: bool) {
    if silent {
        return;
    }
    let _ = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "webarchive: {} {}",
                buf.timestamp_seconds(),
                record.args()
            )
        })
        .try_init();
}

/// Write the rewritten text; add a newline only for an interactive terminal.
fn write_output<W: Write>(out: &mut W, text: &str, terminal: bool) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    if terminal {
        writeln!(out)?;
    }
    out.flush()
}

/// One line per argument: the archived URL, or the argument itself if unresolved.
fn write_lookups<W: Write>(
    out: &mut W,
    urls: &[String],
    replacements: &HashMap<String, String>,
) -> std::io::Result<()> {
    for url in urls {
        writeln!(out, "{}", replacements.get(url).unwrap_or(url))?;
    }
    out.flush()
}

/// Entry point for the CLI. Output is printed before any lookup failure is returned.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = Settings::new(args, config.as_ref())?;
    init_logging(settings.silent);

    let client = settings.client()?;
    let cancel = CancelToken::new();
    if let Err(e) = cancel::watch_interrupt(cancel.clone()) {
        log::warn!("cannot watch for interrupts: {}", e);
    }
    let resolver = Resolver::new(
        client.clone(),
        SkipRules::new(settings.skip_hosts.iter().cloned()),
        settings.retry,
    );

    let stdout = std::io::stdout();
    if !args.urls.is_empty() {
        let (replacements, result) = resolver.resolve(&args.urls, &cancel).into_parts();
        write_lookups(&mut stdout.lock(), &args.urls, &replacements)?;
        return result.map_err(CliRunError::from);
    }

    let body = settings.source.read(&client)?;
    let candidates = extract_urls(&body);
    let (replacements, result) = resolver.resolve(&candidates, &cancel).into_parts();
    let output = substitute_urls(&body, &replacements);
    let terminal = stdout.is_terminal();
    write_output(&mut stdout.lock(), &output, terminal)?;
    result.map_err(CliRunError::from)
}
