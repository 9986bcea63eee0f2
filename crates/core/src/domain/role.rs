use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    Admin,
    SafetyOfficer,
    SiteEngineer,
    Requestor,
}

impl RoleName {
    pub const ALL: [RoleName; 4] =
        [RoleName::Admin, RoleName::SafetyOfficer, RoleName::SiteEngineer, RoleName::Requestor];

    /// Role given to self-registered accounts.
    pub const DEFAULT: RoleName = RoleName::Requestor;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::SafetyOfficer => "SAFETY_OFFICER",
            Self::SiteEngineer => "SITE_ENGINEER",
            Self::Requestor => "REQUESTOR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ADMIN" => Some(Self::Admin),
            "SAFETY_OFFICER" => Some(Self::SafetyOfficer),
            "SITE_ENGINEER" => Some(Self::SiteEngineer),
            "REQUESTOR" => Some(Self::Requestor),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::SafetyOfficer => "Safety Officer",
            Self::SiteEngineer => "Site Engineer",
            Self::Requestor => "Requestor",
        }
    }

    /// Elevated roles stay pending until an administrator approves the account.
    pub fn requires_approval(&self) -> bool {
        !matches!(self, Self::Requestor)
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::RoleName;

    #[test]
    fn parse_accepts_loose_spellings() {
        assert_eq!(RoleName::parse("safety officer"), Some(RoleName::SafetyOfficer));
        assert_eq!(RoleName::parse("site-engineer"), Some(RoleName::SiteEngineer));
        assert_eq!(RoleName::parse(" admin "), Some(RoleName::Admin));
        assert_eq!(RoleName::parse("auditor"), None);
    }

    #[test]
    fn only_requestor_is_auto_approved() {
        let gated: Vec<RoleName> =
            RoleName::ALL.into_iter().filter(RoleName::requires_approval).collect();
        assert_eq!(gated, vec![RoleName::Admin, RoleName::SafetyOfficer, RoleName::SiteEngineer]);
    }
}
