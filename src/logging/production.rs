//! Plain text log lines without colors.
//!
//! Format: `LEVEL target: message [span{fields}]...`

use crate::logging::short_target;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

pub struct ProductionLogFormat;

impl<S, N> FormatEvent<S, N> for ProductionLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{:<5} {}: ",
            metadata.level(),
            short_target(metadata.target())
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        // Outermost span first.
        if let Some(scope) = ctx.event_scope() {
            let mut separator = " ";
            for span in scope.from_root() {
                write!(writer, "{}[{}", separator, span.name())?;
                separator = "";

                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>()
                    && !fields.is_empty()
                {
                    write!(writer, "{{{}}}", fields)?;
                }

                write!(writer, "]")?;
            }
        }

        writeln!(writer)
    }
}
