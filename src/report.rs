//! Message and stack trace rendering
//!
//! Reports are written to any [`std::fmt::Write`] sink. Byte sinks ([`std::io::Write`]) receive the
//! UTF-8 encoding of the exact same text.

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    error::Error as StdError,
    fmt::{self, Write},
    io,
};

use crate::aggregate::AggregateError;
use crate::recorded::RecordedError;

/// Line separator used by reports
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";

/// Line separator used by reports
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

// `<type name>: <message>`, or just the type name if the message is empty
pub(crate) fn headline(error: &RecordedError) -> String {
    let message = error.message();
    if message.is_empty() {
        error.type_name().to_string()
    } else {
        format!("{}: {message}", error.type_name())
    }
}

fn write_line<W: Write + ?Sized>(out: &mut W, text: &str) -> fmt::Result {
    out.write_str(text)?;
    if !text.ends_with('\n') {
        out.write_str(LINE_SEPARATOR)?;
    }
    Ok(())
}

fn fmt_backtrace<W: Write + ?Sized>(out: &mut W, backtrace: &Backtrace) -> fmt::Result {
    if backtrace.status() == BacktraceStatus::Captured {
        write_line(out, &backtrace.to_string())?;
    }
    Ok(())
}

fn fmt_sources<W: Write + ?Sized>(
    out: &mut W,
    mut source: Option<&(dyn StdError + 'static)>,
) -> fmt::Result {
    while let Some(err) = source {
        write_line(out, &format!("Caused by: {err}"))?;
        source = err.source();
    }
    Ok(())
}

/// Write the report header followed by one numbered line per error
pub(crate) fn fmt_message<W: Write + ?Sized>(out: &mut W, errors: &[RecordedError]) -> fmt::Result {
    write!(
        out,
        "AggregateError has {} errors. They are:{LINE_SEPARATOR}",
        errors.len()
    )?;
    for (index, error) in errors.iter().enumerate() {
        write!(out, "{}. {}{LINE_SEPARATOR}", index + 1, headline(error))?;
    }
    Ok(())
}

/// Default rendering of a single error: its headline, its backtrace if one was captured and
/// its chain of causes
pub(crate) fn fmt_single<W: Write + ?Sized>(
    out: &mut W,
    title: &str,
    backtrace: &Backtrace,
    cause: Option<&RecordedError>,
) -> fmt::Result {
    write_line(out, title)?;
    fmt_backtrace(out, backtrace)?;
    if let Some(cause) = cause {
        write_line(out, &format!("Caused by: {}", headline(cause)))?;
        fmt_backtrace(out, cause.backtrace())?;
        fmt_sources(out, cause.source())?;
    }
    Ok(())
}

fn fmt_recorded<W: Write + ?Sized>(out: &mut W, error: &RecordedError) -> fmt::Result {
    if let Some(nested) = error.downcast_ref::<AggregateError>() {
        return fmt_stack_trace(out, nested);
    }

    write_line(out, &headline(error))?;
    fmt_backtrace(out, error.backtrace())?;
    fmt_sources(out, error.source())
}

pub(crate) fn fmt_stack_trace<W: Write + ?Sized>(
    out: &mut W,
    aggregate: &AggregateError,
) -> fmt::Result {
    let errors = aggregate.errors();
    if errors.is_empty() {
        let mut title = String::new();
        fmt_message(&mut title, &errors)?;
        return fmt_single(out, &title, aggregate.backtrace(), aggregate.cause());
    }

    let total = errors.len();
    for (index, error) in errors.iter().enumerate() {
        write!(
            out,
            "MultiException stack {} of {total}{LINE_SEPARATOR}",
            index + 1
        )?;
        fmt_recorded(out, error)?;
    }
    Ok(())
}

pub(crate) fn write_stack_trace<W: io::Write + ?Sized>(
    out: &mut W,
    aggregate: &AggregateError,
) -> io::Result<()> {
    let mut trace = String::new();
    fmt_stack_trace(&mut trace, aggregate).map_err(io::Error::other)?;
    out.write_all(trace.as_bytes())
}
