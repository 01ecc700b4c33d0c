//! Subject application identity and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(model_identifier, app_number)` — the key that identifies one generated
/// web application under analysis. `model_identifier` must already be
/// normalised via [`crate::normalize_model_identifier`] before it reaches
/// this type; callers crossing the HTTP boundary normalise on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentity {
    pub model_identifier: String,
    pub app_number: u32,
}

impl AppIdentity {
    pub fn new(model_identifier: impl Into<String>, app_number: u32) -> Self {
        Self {
            model_identifier: crate::normalize_model_identifier(&model_identifier.into()),
            app_number,
        }
    }

    /// The deterministic Compose project name for this application:
    /// `{model-slug-dashed}-app{N}`.
    pub fn compose_project_name(&self) -> String {
        format!(
            "{}-app{}",
            self.model_identifier.replace('_', "-"),
            self.app_number
        )
    }

    /// The content-addressed results directory for this application.
    pub fn results_dir(&self) -> String {
        format!("{}/app{}", self.model_identifier, self.app_number)
    }
}

impl std::fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/app{}", self.model_identifier, self.app_number)
    }
}

/// Default grace period before a subject application with a missing
/// directory is eligible for deletion.
pub const DEFAULT_MISSING_GRACE_PERIOD_DAYS: i64 = 7;

/// Full subject application record, including lifecycle bookkeeping that the
/// maintenance sweep mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectApplication {
    pub identity: AppIdentity,
    pub backend_port: u16,
    pub frontend_port: u16,
    pub created_at: DateTime<Utc>,
    /// Set when the maintenance sweep observes the app's directory is gone.
    /// Cleared if the directory reappears before the grace period elapses.
    pub missing_since: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SubjectApplication {
    pub fn new(identity: AppIdentity, backend_port: u16, frontend_port: u16) -> Self {
        Self {
            identity,
            backend_port,
            frontend_port,
            created_at: Utc::now(),
            missing_since: None,
            deleted_at: None,
        }
    }

    /// Whether, as of `now`, this record has outlived its grace period and
    /// should be purged by the maintenance sweep.
    pub fn eligible_for_deletion(&self, now: DateTime<Utc>, grace_period_days: i64) -> bool {
        match self.missing_since {
            Some(missing_since) => (now - missing_since).num_days() >= grace_period_days,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_project_name_is_dashed_and_deterministic() {
        let id = AppIdentity::new("my_model_v2", 7);
        assert_eq!(id.compose_project_name(), "my-model-v2-app7");
        assert_eq!(id.compose_project_name(), AppIdentity::new("My Model V2", 7).compose_project_name());
    }

    #[test]
    fn grace_period_respects_missing_since() {
        let mut app = SubjectApplication::new(AppIdentity::new("m", 1), 8000, 3000);
        let now = Utc::now();
        assert!(!app.eligible_for_deletion(now, DEFAULT_MISSING_GRACE_PERIOD_DAYS));

        app.missing_since = Some(now - chrono::Duration::days(6));
        assert!(!app.eligible_for_deletion(now, DEFAULT_MISSING_GRACE_PERIOD_DAYS));

        app.missing_since = Some(now - chrono::Duration::days(8));
        assert!(app.eligible_for_deletion(now, DEFAULT_MISSING_GRACE_PERIOD_DAYS));
    }
}
