use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Timing,
    Rate,
}

/// Tags are kept as a `BTreeMap` so text-format export is deterministic.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: Tags,
    pub timestamp_ms: i64,
}

impl MetricPoint {
    /// Render as `name{k="v",...} value timestamp_ms`, per spec.md §6.
    pub fn to_text_line(&self) -> String {
        if self.tags.is_empty() {
            format!("{} {} {}", self.name, self.value, self.timestamp_ms)
        } else {
            let labels: Vec<String> = self
                .tags
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect();
            format!("{}{{{}}} {} {}", self.name, labels.join(","), self.value, self.timestamp_ms)
        }
    }
}

pub fn empty_tags() -> Tags {
    Tags::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_line_without_tags() {
        let p = MetricPoint {
            name: "batch.articles_total".into(),
            kind: MetricKind::Counter,
            value: 42.0,
            tags: empty_tags(),
            timestamp_ms: 1000,
        };
        assert_eq!(p.to_text_line(), "batch.articles_total 42 1000");
    }

    #[test]
    fn text_line_with_tags_is_sorted() {
        let mut tags = Tags::new();
        tags.insert("stage".into(), "dedup".into());
        tags.insert("batch_id".into(), "b1".into());
        let p = MetricPoint {
            name: "stage.duration".into(),
            kind: MetricKind::Timing,
            value: 1.25,
            tags,
            timestamp_ms: 2000,
        };
        assert_eq!(p.to_text_line(), "stage.duration{batch_id=\"b1\",stage=\"dedup\"} 1.25 2000");
    }
}
