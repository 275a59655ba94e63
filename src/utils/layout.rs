use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{FetchRecord, RecordKind};
use crate::utils::constants::{BRONZE_DIR, GOLD_DIR, SILVER_DIR};
use crate::utils::filename;

/// Paths of the medallion tree under one lake root:
///
/// ```text
/// <root>/bronze/<slug>_<kind>_<ts>.json
/// <root>/silver/<kind>/<slug>.parquet
/// <root>/gold/<dataset>.parquet
/// ```
///
/// Every layer owns its directory exclusively; all path construction goes
/// through here so writers and readers can never disagree on placement.
#[derive(Debug, Clone)]
pub struct LakeLayout {
    root: PathBuf,
}

impl LakeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bronze_dir(&self) -> PathBuf {
        self.root.join(BRONZE_DIR)
    }

    pub fn silver_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(SILVER_DIR).join(filename::kind_partition(kind))
    }

    pub fn gold_dir(&self) -> PathBuf {
        self.root.join(GOLD_DIR)
    }

    pub fn bronze_artifact(&self, record: &FetchRecord) -> PathBuf {
        self.bronze_dir().join(filename::bronze_filename(record))
    }

    pub fn silver_table(&self, kind: RecordKind, slug: &str) -> PathBuf {
        self.silver_dir(kind).join(filename::silver_filename(slug))
    }

    pub fn gold_table(&self, dataset: &str) -> PathBuf {
        self.gold_dir().join(filename::gold_filename(dataset))
    }

    /// Creates the whole tree. Safe to call on every run.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.bronze_dir())?;
        for kind in RecordKind::ALL {
            std::fs::create_dir_all(self.silver_dir(kind))?;
        }
        std::fs::create_dir_all(self.gold_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_composition() {
        let layout = LakeLayout::new("/lake");

        assert_eq!(layout.bronze_dir(), PathBuf::from("/lake/bronze"));
        assert_eq!(
            layout.silver_table(RecordKind::Hourly, "paris"),
            PathBuf::from("/lake/silver/hourly/paris.parquet")
        );
        assert_eq!(
            layout.gold_table("alerts"),
            PathBuf::from("/lake/gold/alerts.parquet")
        );
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = LakeLayout::new(temp.path());

        layout.ensure_dirs().unwrap();
        layout.ensure_dirs().unwrap();

        assert!(layout.bronze_dir().is_dir());
        for kind in RecordKind::ALL {
            assert!(layout.silver_dir(kind).is_dir());
        }
        assert!(layout.gold_dir().is_dir());
    }
}
