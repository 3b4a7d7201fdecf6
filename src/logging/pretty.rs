use crate::logging::short_target;
use nu_ansi_term::{Color, Style};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Colorized, timestamped console output for local use.
pub struct PrettyConsoleLogFormat;

fn styled(
    writer: &mut Writer<'_>,
    style: Style,
    text: impl std::fmt::Display,
) -> std::fmt::Result {
    write!(writer, "{}{}{}", style.prefix(), text, style.suffix())
}

fn level_style(level: &Level) -> Style {
    match *level {
        Level::TRACE => Style::new().fg(Color::Purple),
        Level::DEBUG => Style::new().fg(Color::Blue),
        Level::INFO => Style::new().fg(Color::Green),
        Level::WARN => Style::new().fg(Color::Yellow),
        Level::ERROR => Style::new().fg(Color::Red),
    }
}

impl<S, N> FormatEvent<S, N> for PrettyConsoleLogFormat
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

        styled(
            &mut writer,
            Style::new().dimmed(),
            chrono::offset::Local::now().format("%T%.3f "),
        )?;
        styled(
            &mut writer,
            level_style(metadata.level()),
            format_args!("{:<5}", metadata.level()),
        )?;

        let nesting = ctx.event_scope().map(|scope| scope.count()).unwrap_or(0);
        styled(
            &mut writer,
            Style::new().fg(Color::Magenta),
            format_args!(" {}", "|".repeat(nesting)),
        )?;
        write!(writer, " ")?;

        let mut message = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut message), event)?;

        // Span creation events (see `FmtSpan::NEW`) carry the single field "new".
        if metadata.is_span() && message == "new" {
            if let Some(span) = ctx.event_scope().and_then(|mut scope| scope.next()) {
                styled(&mut writer, Style::new().fg(Color::Magenta), "=> ")?;
                styled(
                    &mut writer,
                    Style::new().dimmed(),
                    format_args!("{}: ", short_target(metadata.target())),
                )?;
                write!(writer, "{}", span.name())?;

                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>()
                    && !fields.is_empty()
                {
                    write!(writer, "{{{}}}", fields)?;
                }
            }
        } else {
            styled(
                &mut writer,
                Style::new().dimmed(),
                format_args!("{}: ", short_target(metadata.target())),
            )?;
            write!(writer, "{}", message)?;
        }

        writeln!(writer)
    }
}
