use serde::{Deserialize, Serialize};

/// A recipient registered for job-completion notifications.
///
/// The pipeline only produces `job_notifications` rows; actually sending
/// mail is the notification service's concern.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationConfigRow {
    pub config_id: i32,
    pub job_id: i32,
    pub notification_type: String,
    pub email_recipient: String,
    pub notify_on_success: bool,
    pub notify_on_failure: bool,
}

impl NotificationConfigRow {
    /// Whether this recipient wants to hear about the given outcome.
    #[must_use]
    pub fn matches(&self, success: bool) -> bool {
        if success {
            self.notify_on_success
        } else {
            self.notify_on_failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(on_success: bool, on_failure: bool) -> NotificationConfigRow {
        NotificationConfigRow {
            config_id: 1,
            job_id: 1,
            notification_type: "EMAIL".to_string(),
            email_recipient: "ops@example.com".to_string(),
            notify_on_success: on_success,
            notify_on_failure: on_failure,
        }
    }

    #[test]
    fn test_failure_only_recipient() {
        let row = config(false, true);
        assert!(!row.matches(true));
        assert!(row.matches(false));
    }

    #[test]
    fn test_all_outcomes_recipient() {
        let row = config(true, true);
        assert!(row.matches(true));
        assert!(row.matches(false));
    }
}
