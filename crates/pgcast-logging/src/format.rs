//! Line format shared by the console and file layers.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Formats events as `[timestamp] [level] [label] message key=value ...`.
#[derive(Clone, Debug)]
pub struct LineFormat {
    label: String,
}

impl LineFormat {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The bracketed prefix written before the event fields.
    pub fn prefix(&self, timestamp: &str, level: tracing::Level) -> String {
        format!(
            "[{timestamp}] [{}] [{}] ",
            level.as_str().to_ascii_lowercase(),
            self.label
        )
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
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
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writer.write_str(&self.prefix(&timestamp, *event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
