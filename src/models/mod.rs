//! Entity records as the backend returns them
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A server-owned record with a unique identifier
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier as it appears in item paths
    fn key(&self) -> String;
}

/// Timestamps arrive either RFC 3339 or naive (`2024-05-01T12:00:00.123000`).
/// Naive values are UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub owner_email: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    pub fn has_member(&self, email: &str) -> bool {
        self.owner_email == email || self.members.iter().any(|m| m == email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub mod task_status {
    pub const TODO: &str = "todo";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const DONE: &str = "done";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "_id")]
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator_email: Option<String>,
    #[serde(default)]
    pub assignee_email: Option<String>,
    #[serde(default = "default_task_status")]
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_task_status() -> String {
    task_status::TODO.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub mod role {
    pub const MEMBER: &str = "member";
    pub const ASUNTO_LEAD: &str = "asunto_lead";
    pub const ADMIN: &str = "admin";
    pub const SUPERADMIN: &str = "superadmin";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id", default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_role() -> String {
    role::MEMBER.to_string()
}

impl User {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.email)
    }

    pub fn is_admin(&self) -> bool {
        self.role == role::ADMIN || self.role == role::SUPERADMIN
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub role: String,
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_scraper_type")]
    pub scraper_type: String,
    #[serde(default)]
    pub pdf_direct_url: Option<String>,
    #[serde(default)]
    pub pdf_link_contains: Option<String>,
    #[serde(default)]
    pub pdf_link_ends_with: Option<String>,
    #[serde(default = "default_source_status")]
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_scraper_type() -> String {
    "generic_html".to_string()
}

fn default_source_status() -> String {
    "pending".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraper_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_direct_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_link_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_link_ends_with: Option<String>,
}

impl SourceFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.scraper_type.is_none()
            && self.pdf_direct_url.is_none()
            && self.pdf_link_contains.is_none()
            && self.pdf_link_ends_with.is_none()
    }
}

/// Response of the `/ask` chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub answer: String,
}

impl AgentAnswer {
    /// The agent reports tool failures in-band as `error: ...`
    pub fn is_error(&self) -> bool {
        self.answer.trim_start().to_lowercase().starts_with("error:")
    }
}

impl Entity for Project {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Task {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Document {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for User {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Company {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Source {
    fn key(&self) -> String {
        self.id.clone()
    }
}
