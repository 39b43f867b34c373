use serde::{Deserialize, Serialize};

/// Approval-authority role assigned to a portal user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalRole {
    Employee,
    JuniorAdmin,
    Manager,
    AdminHead,
    Cro,
    Cfo,
    Finance,
    Admin,
}

impl PortalRole {
    pub const ALL: [PortalRole; 8] = [
        Self::Employee,
        Self::JuniorAdmin,
        Self::Manager,
        Self::AdminHead,
        Self::Cro,
        Self::Cfo,
        Self::Finance,
        Self::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::JuniorAdmin => "junior_admin",
            Self::Manager => "manager",
            Self::AdminHead => "admin_head",
            Self::Cro => "cro",
            Self::Cfo => "cfo",
            Self::Finance => "finance",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" | "user" => Some(Self::Employee),
            "junior_admin" => Some(Self::JuniorAdmin),
            "manager" => Some(Self::Manager),
            "admin_head" => Some(Self::AdminHead),
            "cro" => Some(Self::Cro),
            "cfo" => Some(Self::Cfo),
            "finance" => Some(Self::Finance),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::JuniorAdmin => "Junior Admin",
            Self::Manager => "Manager",
            Self::AdminHead => "Admin Head",
            Self::Cro => "CRO",
            Self::Cfo => "CFO",
            Self::Finance => "Finance",
            Self::Admin => "Admin",
        }
    }

    /// Roles that receive housekeeping fan-out and may decide room bookings.
    pub fn is_admin_desk(&self) -> bool {
        matches!(self, Self::JuniorAdmin | Self::AdminHead | Self::Admin)
    }

    pub fn is_finance_desk(&self) -> bool {
        matches!(self, Self::Finance | Self::Admin)
    }
}

impl std::fmt::Display for PortalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PortalRole;

    #[test]
    fn role_round_trips_from_storage_encoding() {
        for role in PortalRole::ALL {
            assert_eq!(PortalRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn legacy_user_role_maps_to_employee() {
        assert_eq!(PortalRole::parse(" User "), Some(PortalRole::Employee));
        assert_eq!(PortalRole::parse("auditor"), None);
    }

    #[test]
    fn admin_desk_covers_booking_approvers_only() {
        let desk: Vec<_> = PortalRole::ALL.into_iter().filter(PortalRole::is_admin_desk).collect();
        assert_eq!(desk, vec![PortalRole::JuniorAdmin, PortalRole::AdminHead, PortalRole::Admin]);
    }
}
