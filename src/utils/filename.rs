use crate::models::{FetchRecord, RecordKind};

/// Reduce a location name to a filesystem-safe slug: lowercase, spaces to
/// underscores, everything outside [a-z0-9_-] dropped.
pub fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Bronze artifact filename for one fetch record.
pub fn bronze_filename(record: &FetchRecord) -> String {
    format!("{}.json", record.artifact_stem())
}

/// Silver table filename for one location within a kind partition.
pub fn silver_filename(slug: &str) -> String {
    format!("{}.parquet", slug)
}

/// Gold table filename for one dataset.
pub fn gold_filename(dataset: &str) -> String {
    format!("{}.parquet", dataset)
}

/// Silver partition directory name for a kind.
pub fn kind_partition(kind: RecordKind) -> &'static str {
    kind.as_str()
}
