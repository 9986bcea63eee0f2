use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermitId(pub String);

impl PermitId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PermitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PermitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitStatus {
    Pending,
    Approved,
    Rejected,
    Closed,
    Extended,
}

impl PermitStatus {
    pub const ALL: [PermitStatus; 5] = [
        PermitStatus::Pending,
        PermitStatus::Approved,
        PermitStatus::Rejected,
        PermitStatus::Closed,
        PermitStatus::Extended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Closed => "CLOSED",
            Self::Extended => "EXTENDED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "CLOSED" => Some(Self::Closed),
            "EXTENDED" => Some(Self::Extended),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkType {
    HotWork,
    ColdWork,
    ConfinedSpace,
    WorkingAtHeight,
    Electrical,
    Excavation,
    Lifting,
    Radiography,
    ChemicalHandling,
    PressureTesting,
    Demolition,
    Scaffolding,
    Isolation,
    RoofWork,
    General,
}

impl WorkType {
    pub const ALL: [WorkType; 15] = [
        WorkType::HotWork,
        WorkType::ColdWork,
        WorkType::ConfinedSpace,
        WorkType::WorkingAtHeight,
        WorkType::Electrical,
        WorkType::Excavation,
        WorkType::Lifting,
        WorkType::Radiography,
        WorkType::ChemicalHandling,
        WorkType::PressureTesting,
        WorkType::Demolition,
        WorkType::Scaffolding,
        WorkType::Isolation,
        WorkType::RoofWork,
        WorkType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HotWork => "HOT_WORK",
            Self::ColdWork => "COLD_WORK",
            Self::ConfinedSpace => "CONFINED_SPACE",
            Self::WorkingAtHeight => "WORKING_AT_HEIGHT",
            Self::Electrical => "ELECTRICAL",
            Self::Excavation => "EXCAVATION",
            Self::Lifting => "LIFTING",
            Self::Radiography => "RADIOGRAPHY",
            Self::ChemicalHandling => "CHEMICAL_HANDLING",
            Self::PressureTesting => "PRESSURE_TESTING",
            Self::Demolition => "DEMOLITION",
            Self::Scaffolding => "SCAFFOLDING",
            Self::Isolation => "ISOLATION",
            Self::RoofWork => "ROOF_WORK",
            Self::General => "GENERAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|work_type| work_type.as_str() == normalized)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::HotWork => "Hot Work",
            Self::ColdWork => "Cold Work",
            Self::ConfinedSpace => "Confined Space Entry",
            Self::WorkingAtHeight => "Working at Height",
            Self::Electrical => "Electrical Work",
            Self::Excavation => "Excavation",
            Self::Lifting => "Lifting Operations",
            Self::Radiography => "Radiography",
            Self::ChemicalHandling => "Chemical Handling",
            Self::PressureTesting => "Pressure Testing",
            Self::Demolition => "Demolition",
            Self::Scaffolding => "Scaffolding",
            Self::Isolation => "Energy Isolation",
            Self::RoofWork => "Roof Work",
            Self::General => "General Work",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Crew member listed on the permit itself at submission time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerEntry {
    pub name: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub trade: Option<String>,
    pub badge_number: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecklistAnswer {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl ChecklistAnswer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::NotApplicable => "N/A",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub item: String,
    pub answer: ChecklistAnswer,
}

pub const DEFAULT_SAFETY_MEASURES: [&str; 10] = [
    "Work area inspected and hazards identified",
    "Equipment isolated and locked out",
    "Gas test carried out and recorded",
    "Fire extinguisher available at work site",
    "Personal protective equipment worn",
    "Barricades and warning signs in place",
    "Emergency escape route identified",
    "Standby person assigned",
    "Tools and equipment inspected",
    "Workers briefed on the job safety analysis",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRequest {
    pub id: PermitId,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub work_type: WorkType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PermitStatus,
    pub priority: Priority,
    pub hazards: Vec<String>,
    pub precautions: Vec<String>,
    pub equipment: Vec<String>,
    pub created_by: UserId,
    pub company_name: Option<String>,
    pub contractor_name: Option<String>,
    pub contractor_phone: Option<String>,
    pub workers: Vec<WorkerEntry>,
    pub safety_checklist: Vec<ChecklistItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermitRequest {
    /// Checklist printed on the document: the custom one if supplied, else the fixed one.
    pub fn effective_checklist(&self) -> Vec<ChecklistItem> {
        if !self.safety_checklist.is_empty() {
            return self.safety_checklist.clone();
        }

        DEFAULT_SAFETY_MEASURES
            .iter()
            .map(|item| ChecklistItem {
                item: (*item).to_string(),
                answer: ChecklistAnswer::NotApplicable,
            })
            .collect()
    }

    pub fn duration_hours(&self) -> i64 {
        (self.end_date - self.start_date).num_hours()
    }
}

/// Caller-supplied fields for a new permit. Status and ownership are assigned on create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermitDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub work_type: WorkType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub priority: Priority,
    pub hazards: Vec<String>,
    pub precautions: Vec<String>,
    pub equipment: Vec<String>,
    pub company_name: Option<String>,
    pub contractor_name: Option<String>,
    pub contractor_phone: Option<String>,
    pub workers: Vec<WorkerEntry>,
    pub safety_checklist: Vec<ChecklistItem>,
}

impl PermitDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_title(&self.title)?;
        validate_window(self.start_date, self.end_date)?;
        validate_workers(&self.workers)
    }

    pub fn into_permit(self, created_by: UserId, now: DateTime<Utc>) -> PermitRequest {
        PermitRequest {
            id: PermitId::new(),
            title: self.title.trim().to_string(),
            description: self.description,
            location: self.location,
            work_type: self.work_type,
            start_date: self.start_date,
            end_date: self.end_date,
            status: PermitStatus::Pending,
            priority: self.priority,
            hazards: self.hazards,
            precautions: self.precautions,
            equipment: self.equipment,
            created_by,
            company_name: self.company_name,
            contractor_name: self.contractor_name,
            contractor_phone: self.contractor_phone,
            workers: self.workers,
            safety_checklist: self.safety_checklist,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermitPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub work_type: Option<WorkType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub hazards: Option<Vec<String>>,
    pub precautions: Option<Vec<String>>,
    pub equipment: Option<Vec<String>>,
    pub company_name: Option<String>,
    pub contractor_name: Option<String>,
    pub contractor_phone: Option<String>,
    pub workers: Option<Vec<WorkerEntry>>,
    pub safety_checklist: Option<Vec<ChecklistItem>>,
}

impl PermitPatch {
    pub fn apply(self, permit: &mut PermitRequest, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(title) = self.title {
            validate_title(&title)?;
            permit.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            permit.description = Some(description);
        }
        if let Some(location) = self.location {
            permit.location = Some(location);
        }
        if let Some(work_type) = self.work_type {
            permit.work_type = work_type;
        }
        if let Some(start_date) = self.start_date {
            permit.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            permit.end_date = end_date;
        }
        validate_window(permit.start_date, permit.end_date)?;
        if let Some(priority) = self.priority {
            permit.priority = priority;
        }
        if let Some(hazards) = self.hazards {
            permit.hazards = hazards;
        }
        if let Some(precautions) = self.precautions {
            permit.precautions = precautions;
        }
        if let Some(equipment) = self.equipment {
            permit.equipment = equipment;
        }
        if let Some(company_name) = self.company_name {
            permit.company_name = Some(company_name);
        }
        if let Some(contractor_name) = self.contractor_name {
            permit.contractor_name = Some(contractor_name);
        }
        if let Some(contractor_phone) = self.contractor_phone {
            permit.contractor_phone = Some(contractor_phone);
        }
        if let Some(workers) = self.workers {
            validate_workers(&workers)?;
            permit.workers = workers;
        }
        if let Some(safety_checklist) = self.safety_checklist {
            permit.safety_checklist = safety_checklist;
        }
        permit.updated_at = now;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermitFilter {
    pub status: Option<PermitStatus>,
    pub work_type: Option<WorkType>,
    pub priority: Option<Priority>,
    pub created_by: Option<UserId>,
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub closed: i64,
    pub extended: i64,
}

impl PermitStatusCounts {
    pub fn record(&mut self, status: PermitStatus, count: i64) {
        match status {
            PermitStatus::Pending => self.pending += count,
            PermitStatus::Approved => self.approved += count,
            PermitStatus::Rejected => self.rejected += count,
            PermitStatus::Closed => self.closed += count,
            PermitStatus::Extended => self.extended += count,
        }
        self.total += count;
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS]` (read as UTC) or full RFC 3339.
pub fn parse_permit_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn validate_title(title: &str) -> Result<(), DomainError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("title is required".to_string()));
    }
    if trimmed.chars().count() > 200 {
        return Err(DomainError::Validation("title must be at most 200 characters".to_string()));
    }
    Ok(())
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DomainError> {
    if end < start {
        return Err(DomainError::Validation("endDate must not be before startDate".to_string()));
    }
    Ok(())
}

fn validate_workers(workers: &[WorkerEntry]) -> Result<(), DomainError> {
    if workers.iter().any(|worker| worker.name.trim().is_empty()) {
        return Err(DomainError::Validation("every worker needs a name".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        parse_permit_date, ChecklistAnswer, PermitDraft, PermitPatch, PermitStatus, Priority,
        WorkType,
    };
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn draft() -> PermitDraft {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        PermitDraft {
            title: "  Weld pipe rack  ".to_string(),
            description: None,
            location: Some("Unit 4".to_string()),
            work_type: WorkType::HotWork,
            start_date: start,
            end_date: start + Duration::days(1),
            priority: Priority::High,
            hazards: vec!["Fire".to_string()],
            precautions: Vec::new(),
            equipment: Vec::new(),
            company_name: None,
            contractor_name: None,
            contractor_phone: None,
            workers: Vec::new(),
            safety_checklist: Vec::new(),
        }
    }

    #[test]
    fn new_permits_start_pending_with_trimmed_title() {
        let permit = draft().into_permit(UserId("U-1".to_string()), Utc::now());
        assert_eq!(permit.status, PermitStatus::Pending);
        assert_eq!(permit.title, "Weld pipe rack");
        assert_eq!(permit.hazards, vec!["Fire".to_string()]);
    }

    #[test]
    fn draft_rejects_inverted_window_and_blank_title() {
        let mut inverted = draft();
        inverted.end_date = inverted.start_date - Duration::hours(1);
        assert!(matches!(inverted.validate(), Err(DomainError::Validation(_))));

        let mut blank = draft();
        blank.title = "   ".to_string();
        assert!(matches!(blank.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn patch_revalidates_the_combined_window() {
        let mut permit = draft().into_permit(UserId("U-1".to_string()), Utc::now());
        let patch = PermitPatch {
            end_date: Some(permit.start_date - Duration::days(2)),
            ..PermitPatch::default()
        };
        assert!(patch.apply(&mut permit, Utc::now()).is_err());
    }

    #[test]
    fn fixed_checklist_is_used_when_none_supplied() {
        let permit = draft().into_permit(UserId("U-1".to_string()), Utc::now());
        let checklist = permit.effective_checklist();
        assert_eq!(checklist.len(), 10);
        assert!(checklist.iter().all(|item| item.answer == ChecklistAnswer::NotApplicable));
    }

    #[test]
    fn permit_dates_accept_plain_days_and_timestamps() {
        let day = parse_permit_date("2024-01-02").expect("plain date");
        assert_eq!(day, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        let stamp = parse_permit_date("2024-01-02T08:30:00Z").expect("rfc3339");
        assert_eq!(stamp, Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap());

        let local = parse_permit_date("2024-01-02T08:30").expect("datetime-local input");
        assert_eq!(local, Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap());

        assert!(parse_permit_date("next tuesday").is_none());
    }

    #[test]
    fn work_types_parse_from_labels_and_codes() {
        assert_eq!(WorkType::ALL.len(), 15);
        assert_eq!(WorkType::parse("hot work"), Some(WorkType::HotWork));
        assert_eq!(WorkType::parse("CONFINED_SPACE"), Some(WorkType::ConfinedSpace));
        assert_eq!(WorkType::parse("underwater"), None);
    }
}
