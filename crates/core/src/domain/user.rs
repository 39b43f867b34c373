use serde::{Deserialize, Serialize};

use crate::domain::role::PortalRole;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub designation: String,
    pub portal_role: PortalRole,
    pub is_active: bool,
}

impl User {
    pub fn has_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
    }
}
