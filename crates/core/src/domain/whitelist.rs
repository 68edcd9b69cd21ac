use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Family,
    Project,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "FAMILY",
            Self::Project => "PROJECT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FAMILY" => Some(Self::Family),
            "PROJECT" => Some(Self::Project),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub reviewer_login: String,
    pub entry_type: EntryType,
    pub name: String,
}

impl WhitelistEntry {
    pub fn project(reviewer_login: impl Into<String>, name: impl Into<String>) -> Self {
        Self { reviewer_login: reviewer_login.into(), entry_type: EntryType::Project, name: name.into() }
    }

    pub fn family(reviewer_login: impl Into<String>, name: impl Into<String>) -> Self {
        Self { reviewer_login: reviewer_login.into(), entry_type: EntryType::Family, name: name.into() }
    }
}

/// Whitelist gate: a PROJECT entry matching `project_name` or a FAMILY entry matching
/// `family_label`, scoped to `reviewer_login`. No entries means not whitelisted.
pub fn is_whitelisted(
    entries: &[WhitelistEntry],
    reviewer_login: &str,
    project_name: Option<&str>,
    family_label: Option<&str>,
) -> bool {
    entries.iter().filter(|entry| entry.reviewer_login == reviewer_login).any(|entry| {
        match entry.entry_type {
            EntryType::Project => project_name == Some(entry.name.as_str()),
            EntryType::Family => family_label == Some(entry.name.as_str()),
        }
    })
}
