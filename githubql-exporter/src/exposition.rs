//! Prometheus text exposition format.

use std::fmt::Write;

use crate::metric::{MetricDesc, Sample};

/// Content type of the rendered output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus exposition format.
///
/// Families are written in descriptor order so that all series of a family
/// are contiguous. Within a family, samples keep their emission order.
/// Families without samples are omitted.
pub fn render(descs: &[&MetricDesc], samples: &[Sample<'_>]) -> String {
    let mut output = String::with_capacity(samples.len() * 80);

    for desc in descs {
        let mut family = samples.iter().filter(|s| s.desc == *desc).peekable();
        if family.peek().is_none() {
            continue;
        }

        writeln!(output, "# HELP {} {}", desc.name(), escape_help(desc.help())).ok();
        writeln!(output, "# TYPE {} gauge", desc.name()).ok();

        for sample in family {
            writeln!(
                output,
                "{}{} {}",
                desc.name(),
                format_labels(sample),
                format_value(sample.value)
            )
            .ok();
        }
    }

    output
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape special characters in help text.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(sample: &Sample<'_>) -> String {
    if sample.label_values.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = sample
        .labels()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
