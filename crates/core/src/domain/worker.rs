use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::permit::{PermitId, WorkerEntry};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Contractor personnel who signed in against a permit through the public QR page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: WorkerId,
    pub permit_id: PermitId,
    pub name: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub trade: Option<String>,
    pub badge_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    pub fn register(
        permit_id: PermitId,
        entry: WorkerEntry,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("worker name is required".to_string()));
        }

        Ok(Self {
            id: WorkerId::new(),
            permit_id,
            name: name.to_string(),
            phone: blank_to_none(entry.phone),
            company: blank_to_none(entry.company),
            trade: blank_to_none(entry.trade),
            badge_number: blank_to_none(entry.badge_number),
            created_at: now,
        })
    }

    pub fn as_entry(&self) -> WorkerEntry {
        WorkerEntry {
            name: self.name.clone(),
            phone: self.phone.clone(),
            company: self.company.clone(),
            trade: self.trade.clone(),
            badge_number: self.badge_number.clone(),
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|raw| raw.trim().to_string()).filter(|trimmed| !trimmed.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::Worker;
    use crate::domain::permit::{PermitId, WorkerEntry};

    #[test]
    fn registration_trims_and_drops_blank_fields() {
        let worker = Worker::register(
            PermitId("P-1".to_string()),
            WorkerEntry {
                name: "  Sam Okafor ".to_string(),
                phone: Some("   ".to_string()),
                company: Some("Acme Rigging".to_string()),
                trade: None,
                badge_number: Some(" B-17 ".to_string()),
            },
            Utc::now(),
        )
        .expect("valid worker");

        assert_eq!(worker.name, "Sam Okafor");
        assert_eq!(worker.phone, None);
        assert_eq!(worker.badge_number.as_deref(), Some("B-17"));
    }

    #[test]
    fn registration_requires_a_name() {
        let result =
            Worker::register(PermitId("P-1".to_string()), WorkerEntry::default(), Utc::now());
        assert!(result.is_err());
    }
}
