use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a screenshot job.
///
/// Transitions only move forward: `pending -> processing -> completed | failed`.
/// A job that fails before it is ever claimed (e.g. dispatch failure) may go
/// straight from `pending` to `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// App store a job targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AppStore {
    Google,
    Apple,
}

/// A screenshot download job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotJob {
    pub id: Uuid,
    pub app_id: String,
    pub app_url: String,
    pub store: AppStore,
    pub status: JobStatus,
    pub result_artifact: Option<String>,
    pub error_reason: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a job; everything else is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub app_id: String,
    pub app_url: String,
    pub store: AppStore,
    pub owner_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_forward_transitions_only() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_store_parsing_is_case_insensitive() {
        assert_eq!(AppStore::from_str("google").unwrap(), AppStore::Google);
        assert_eq!(AppStore::from_str("Apple").unwrap(), AppStore::Apple);
        assert!(AppStore::from_str("amazon").is_err());
        assert_eq!(AppStore::Google.to_string(), "google");
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(&status.to_string()).unwrap(), status);
        }
    }
}
