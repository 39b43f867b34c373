use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionActivity {
    Login,
    Logout,
    PageView,
    Action,
}

impl SessionActivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::PageView => "page_view",
            Self::Action => "action",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "login" => Some(Self::Login),
            "logout" => Some(Self::Logout),
            "page_view" => Some(Self::PageView),
            "action" => Some(Self::Action),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub id: String,
    pub session_id: SessionId,
    pub user_email: String,
    pub activity: SessionActivity,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}
