//! Logging initialisation via tracing-subscriber.
//!
//! The report itself is carried by `INFO` events, so the console format is
//! the bare message. Other levels are prefixed with the level name.

use anyhow::{anyhow, Result};
use std::env;
use std::fmt;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Message-only event format for report output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportFormat;

impl<S, N> FormatEvent<S, N> for ReportFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        if level != Level::INFO {
            write!(writer, "{level} ")?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

const DEFAULT_DIRECTIVES: &str = "info";

/// Picks the filter directives: `level` when given, else `RUST_LOG`, else
/// `info`. Each comma-separated directive must be `level` or
/// `target=level`; a bare word that is not a level is rejected instead of
/// being read as a target that silences everything.
pub fn directives(level: Option<&str>, rust_log: Option<&str>) -> Result<String> {
    let (origin, value) = match (level, rust_log) {
        (Some(level), _) => ("log level", level),
        (None, Some(env)) if !env.trim().is_empty() => (EnvFilter::DEFAULT_ENV, env),
        _ => return Ok(DEFAULT_DIRECTIVES.to_string()),
    };
    if let Some(bad) = value.split(',').map(str::trim).find(|d| !is_directive(d)) {
        return Err(anyhow!(
            "invalid {origin} '{value}': unrecognised directive '{bad}'"
        ));
    }
    Ok(value.to_string())
}

fn is_directive(directive: &str) -> bool {
    let level = match directive.rsplit_once('=') {
        Some((target, level)) => {
            if target.is_empty() || target.contains(char::is_whitespace) {
                return false;
            }
            level
        }
        None => directive,
    };
    !level.is_empty() && level.parse::<LevelFilter>().is_ok()
}

/// Builds the level filter from `--log-level`, falling back to `RUST_LOG`.
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = directives(level, rust_log.as_deref())?;
    EnvFilter::try_new(&directives).map_err(|e| anyhow!("invalid log filter '{directives}': {e}"))
}

/// Installs the global subscriber writing to stdout. Call once at startup.
pub fn init(level: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_writer(std::io::stdout)
        .event_format(ReportFormat)
        .try_init()
        .map_err(|e| anyhow!("failed to set subscriber: {e}"))
}
