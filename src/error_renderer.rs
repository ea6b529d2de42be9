//! Error rendering using ariadne
//!
//! Tessel diagnostics carry byte spans into whatever source the front end
//! resolved the modules from. These helpers take that source (and a name to
//! show for it) and render the diagnostics with snippets and annotations.

use crate::{Diagnostic, Error, Severity};
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use std::io::Write;

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use tessel::{Engine, EngineOptions, ModuleIndex, ProgramMetadata, SchemaTable, render_error};
///
/// let engine = Engine::new(EngineOptions::default(), tessel::stdlib::register);
/// let source = std::fs::read_to_string("main.tsl").unwrap();
/// let index = ModuleIndex::new(); // filled by the front end from `source`
/// let metadata = ProgramMetadata::new("demo");
/// if let Err(e) = engine.compile(&index, &["main"], &SchemaTable::new(), metadata) {
///     render_error(&e, "main.tsl", &source);
/// }
/// ```
pub fn render_error(error: &Error, source_name: &str, source: &str) {
    render_error_to_writer(error, source_name, source, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(
    error: &Error,
    source_name: &str,
    source: &str,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    render_error_to_writer(error, source_name, source, writer, true)
}

/// Render an error to a String (useful for logs, web UIs, etc.)
pub fn render_error_to_string(error: &Error, source_name: &str, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source_name, source, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error, source_name: &str, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source_name, source, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_error_to_writer(
    error: &Error,
    source_name: &str,
    source: &str,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    match error {
        Error::Compilation { diagnostics } => {
            render_diagnostics(source_name, source, diagnostics, writer, use_color)
        }
        Error::Link(diagnostic) | Error::Runtime(diagnostic) => render_diagnostics(
            source_name,
            source,
            core::slice::from_ref(diagnostic),
            writer,
            use_color,
        ),
        Error::ResourceExceeded(msg) => {
            writeln!(writer, "Resource limit exceeded: {}", msg)
        }
        Error::Api(msg) => {
            writeln!(writer, "API error: {}", msg)
        }
    }
}

fn render_diagnostics(
    source_name: &str,
    source: &str,
    diagnostics: &[Diagnostic],
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    // Spans past the end (e.g. from another file) would make ariadne panic.
    let clamp = |range: &core::ops::Range<usize>| {
        let end = range.end.min(source.len());
        range.start.min(end)..end
    };

    for diag in diagnostics {
        let mut colors = ColorGenerator::new();
        colors.next(); // Skip the first color.

        let kind = match diag.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Info => ReportKind::Advice,
        };

        let span = clamp(&diag.span.0);
        let mut report = Report::build(kind, (source_name, span.clone()))
            .with_message(&diag.message)
            .with_config(ariadne::Config::default().with_color(use_color));

        if let Some(code) = &diag.code {
            report = report.with_code(code);
        }

        let color = colors.next();
        report = report.with_label(
            Label::new((source_name, span))
                .with_message(&diag.message)
                .with_color(color),
        );

        // Call stack or declaration sites.
        for related in &diag.related {
            let color = colors.next();
            report = report.with_label(
                Label::new((source_name, clamp(&related.span.0)))
                    .with_message(&related.message)
                    .with_color(color),
            );
        }

        if let Some(help) = &diag.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .write((source_name, Source::from(source)), &mut *writer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, EngineOptions, ExprBuilder, ModuleIndex, ProgramMetadata, SchemaTable};
    use bumpalo::Bump;
    use pretty_assertions::assert_eq;

    // One character per builder node, so every span lands inside it.
    const SOURCE: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

    fn engine() -> Engine {
        Engine::new(EngineOptions::default(), tessel_core::stdlib::register)
    }

    #[test]
    fn test_render_compile_errors() {
        let arena = Bump::new();
        let b = ExprBuilder::new(&arena);
        let f = b.lambda("x", b.block(&[b.let_("unused", b.int(1))], b.local("x")));
        let main = b.module("main", &[], &[b.function("f", f)], &[], &[]);

        let err = engine()
            .compile(
                &ModuleIndex::from_modules(&[main]),
                &["main"],
                &SchemaTable::new(),
                ProgramMetadata::new("test"),
            )
            .unwrap_err();
        let output = render_error_to_string_no_color(&err, "main.tsl", SOURCE);

        assert!(output.contains("Error"));
        assert!(output.contains("unused binding `unused`"));
        assert!(output.contains("main.tsl"));
        assert!(output.contains("name it `_`"));
    }

    #[test]
    fn test_render_runtime_error_with_trace() {
        let arena = Bump::new();
        let b = ExprBuilder::new(&arena);
        let broken = b.call(b.global("main", "div"), b.tuple(&[b.int(1), b.int(0)]));
        let main = b.module(
            "main",
            &[],
            &[b.native_function("div", "int.div")],
            &[b.constant_decl("broken", broken)],
            &[],
        );
        let engine = engine();
        let program = engine
            .compile(
                &ModuleIndex::from_modules(&[main]),
                &["main"],
                &SchemaTable::new(),
                ProgramMetadata::new("test"),
            )
            .unwrap();
        let values = Bump::new();
        let Err(err) = engine.vm(&program, &values) else {
            panic!("constant evaluation should fail");
        };

        let output = render_error_to_string_no_color(&err, "main.tsl", SOURCE);
        assert!(output.contains("division by zero"));
        assert!(output.contains("in main.broken"));
        assert!(output.lines().count() > 1);
    }

    #[test]
    fn test_render_plain_errors_and_out_of_range_spans() {
        let err = Error::Api(String::from("no roots"));
        assert_eq!(
            render_error_to_string_no_color(&err, "main.tsl", ""),
            "API error: no roots\n"
        );

        let span = crate::Span::new(100, 120);
        let diagnostic = Diagnostic::error(String::from("far away"), span);
        let err = Error::Link(diagnostic);
        let output = render_error_to_string_no_color(&err, "main.tsl", "short");
        assert!(output.contains("far away"));
    }
}
