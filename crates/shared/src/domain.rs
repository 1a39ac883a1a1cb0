use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ModuleId);
id_newtype!(ContentId);
id_newtype!(StepId);
id_newtype!(OptionId);
id_newtype!(ClassId);

/// Role ids as the backend numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    pub fn id(self) -> i64 {
        match self {
            Role::Student => 1,
            Role::Teacher => 2,
            Role::Admin => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Role::try_from(id).ok();
        }
        Role::ALL
            .into_iter()
            .find(|role| role.label().eq_ignore_ascii_case(raw))
    }
}

impl TryFrom<i64> for Role {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Role::Student),
            2 => Ok(Role::Teacher),
            3 => Ok(Role::Admin),
            other => Err(format!("unknown role id {other}")),
        }
    }
}

impl From<Role> for i64 {
    fn from(value: Role) -> Self {
        value.id()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Emergency type of a module (`tipoEmergencia`). The backend owns the set
/// of values, so this stays an open string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmergencyCategory(pub String);

impl EmergencyCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmergencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(EmergencyCategory),
}

impl CategoryFilter {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            CategoryFilter::All
        } else {
            CategoryFilter::Only(EmergencyCategory::new(raw))
        }
    }

    pub fn matches(&self, category: Option<&EmergencyCategory>) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => category == Some(wanted),
        }
    }

    pub fn as_query_value(&self) -> Option<&str> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Only(category) => Some(category.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Video,
    #[serde(rename = "TEXTO", alias = "TEXT")]
    Text,
    #[serde(rename = "INFOGRAFIA", alias = "INFOGRAPHIC")]
    Infographic,
    #[serde(rename = "SIMULACION", alias = "SIMULATION")]
    Simulation,
    #[serde(rename = "PEDAGOGICO", alias = "PEDAGOGICAL")]
    Pedagogical,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ModuleStatus {
    pub fn label(self) -> &'static str {
        match self {
            ModuleStatus::NotStarted => "not started",
            ModuleStatus::InProgress => "in progress",
            ModuleStatus::Completed => "completed",
        }
    }
}

/// Percentage of `completed` over `total`, rounded half away from zero.
/// An empty total counts as 0%.
pub fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((completed as f64 * 100.0) / total as f64).round() as u8
}

/// Case-insensitive substring match used by every list search.
pub fn matches_search(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
