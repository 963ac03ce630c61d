//! Metric descriptors and samples.

use chrono::{DateTime, Utc};

/// Build a fully-qualified metric name from its components.
///
/// Format: `{namespace}_{subsystem}_{name}`, skipping empty components.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Convert an instant to Unix epoch seconds.
pub fn unix_seconds(instant: &DateTime<Utc>) -> f64 {
    instant.timestamp() as f64
}

/// Immutable definition of a gauge metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    name: String,
    help: &'static str,
    labels: &'static [&'static str],
}

impl MetricDesc {
    /// Create a new descriptor.
    pub fn new(name: String, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels }
    }

    /// Fully-qualified metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text.
    pub fn help(&self) -> &str {
        self.help
    }

    /// Ordered label names.
    pub fn labels(&self) -> &[&'static str] {
        self.labels
    }
}

/// One observation of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    pub desc: &'a MetricDesc,
    pub value: f64,
    pub label_values: Vec<String>,
}

impl<'a> Sample<'a> {
    /// Create a sample. Label values must line up with the descriptor's
    /// label names.
    pub fn new(desc: &'a MetricDesc, value: f64, label_values: Vec<String>) -> Self {
        debug_assert_eq!(
            desc.labels.len(),
            label_values.len(),
            "label arity mismatch for {}",
            desc.name
        );
        Self {
            desc,
            value,
            label_values,
        }
    }

    /// Label name/value pairs in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.desc
            .labels
            .iter()
            .copied()
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Look up a label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_fq_name() {
        assert_eq!(build_fq_name("github", "repo", "forks"), "github_repo_forks");
        assert_eq!(build_fq_name("", "repo", "forks"), "repo_forks");
        assert_eq!(build_fq_name("github", "", "up"), "github_up");
    }

    #[test]
    fn test_unix_seconds() {
        let instant = Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(unix_seconds(&instant), 1_488_369_600.0);
        assert_eq!(unix_seconds(&instant), unix_seconds(&instant));

        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(unix_seconds(&epoch), 0.0);
    }

    #[test]
    fn test_unix_seconds_round_trip() {
        let instant = Utc.with_ymd_and_hms(2021, 11, 30, 23, 59, 59).unwrap();
        let seconds = unix_seconds(&instant);
        let back = Utc.timestamp_opt(seconds as i64, 0).unwrap();

        assert_eq!(back, instant);
        assert_eq!(unix_seconds(&back), seconds);
    }

    #[test]
    fn test_sample_labels() {
        let desc = MetricDesc::new(
            "github_repo_issues".to_string(),
            "Number of issues",
            &["owner", "name", "state"],
        );
        let sample = Sample::new(
            &desc,
            5.0,
            vec!["acme".to_string(), "widget".to_string(), "open".to_string()],
        );

        let labels: Vec<_> = sample.labels().collect();
        assert_eq!(
            labels,
            vec![("owner", "acme"), ("name", "widget"), ("state", "open")]
        );
        assert_eq!(sample.label("state"), Some("open"));
        assert_eq!(sample.label("missing"), None);
    }
}
