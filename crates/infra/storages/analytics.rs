use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use super::json_file;
use crate::domain::{
    repositories::analytics::AnalyticsRepository,
    value_objects::{analytics::AnalyticsSnapshot, enums::calculation_kinds::CalculationKind},
};

pub const ANALYTICS_FILE_NAME: &str = "analytics.json";

pub struct AnalyticsFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AnalyticsFile {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(ANALYTICS_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AnalyticsRepository for AnalyticsFile {
    async fn record_calculation(&self, kind: CalculationKind, day: NaiveDate) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot: AnalyticsSnapshot = json_file::read_or_default(&self.path).await;
        snapshot.record(kind, day);

        json_file::write_atomic(&self.path, &snapshot).await
    }

    async fn load(&self) -> Result<AnalyticsSnapshot> {
        Ok(json_file::read_or_default(&self.path).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn load_defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = AnalyticsFile::new(dir.path());

        assert_eq!(analytics.load().await.unwrap(), AnalyticsSnapshot::default());
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Arc::new(AnalyticsFile::new(dir.path()));
        let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let analytics = Arc::clone(&analytics);
            let kind = if i % 2 == 0 {
                CalculationKind::Differentiate
            } else {
                CalculationKind::Integrate
            };
            handles.push(tokio::spawn(async move {
                analytics.record_calculation(kind, day).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = analytics.load().await.unwrap();
        assert_eq!(snapshot.total_calculations, 20);
        assert_eq!(snapshot.calculations_by_type.differentiate, 10);
        assert_eq!(snapshot.calculations_by_type.integrate, 10);
        assert_eq!(snapshot.calculations_by_day.len(), 1);
        assert_eq!(snapshot.calculations_by_day[0].count, 20);
    }

    #[tokio::test]
    async fn reads_documents_without_daily_breakdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ANALYTICS_FILE_NAME),
            br#"{"totalCalculations":3,"calculationsByType":{"arithmetic":3}}"#,
        )
        .unwrap();
        let analytics = AnalyticsFile::new(dir.path());

        let snapshot = analytics.load().await.unwrap();
        assert_eq!(snapshot.total_calculations, 3);
        assert_eq!(snapshot.calculations_by_type.arithmetic, 3);
        assert!(snapshot.calculations_by_day.is_empty());
    }
}
