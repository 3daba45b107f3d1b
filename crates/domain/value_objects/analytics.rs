use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::calculation_kinds::CalculationKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalculationsByType {
    #[serde(default)]
    pub differentiate: u64,
    #[serde(default)]
    pub integrate: u64,
    #[serde(default)]
    pub arithmetic: u64,
}

impl CalculationsByType {
    pub fn increment(&mut self, kind: CalculationKind) {
        match kind {
            CalculationKind::Differentiate => self.differentiate += 1,
            CalculationKind::Integrate => self.integrate += 1,
            CalculationKind::Arithmetic => self.arithmetic += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Persisted analytics document (`analytics.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    #[serde(default)]
    pub total_calculations: u64,
    #[serde(default)]
    pub calculations_by_type: CalculationsByType,
    #[serde(default)]
    pub calculations_by_day: Vec<DailyCount>,
}

impl AnalyticsSnapshot {
    pub fn record(&mut self, kind: CalculationKind, day: NaiveDate) {
        self.total_calculations += 1;
        self.calculations_by_type.increment(kind);

        match self
            .calculations_by_day
            .iter_mut()
            .find(|entry| entry.date == day)
        {
            Some(entry) => entry.count += 1,
            None => {
                self.calculations_by_day.push(DailyCount { date: day, count: 1 });
                self.calculations_by_day.sort_by_key(|entry| entry.date);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDto {
    #[serde(flatten)]
    pub snapshot: AnalyticsSnapshot,
    pub total_users: usize,
}
