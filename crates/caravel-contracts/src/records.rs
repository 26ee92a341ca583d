//! Plain records for the entities around an action: projects, threads,
//! messages and artifacts.
//!
//! These are thin CRUD data. The runtime only reads them to resolve
//! ownership (thread → project) and to check that referenced rows exist.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::CaravelError,
    ids::{ActionId, ArtifactId, MessageId, ProjectId, ThreadId},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Unique across projects.
    pub slug: String,
    pub name: String,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, settings: Value) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            slug: slug.into(),
            name: name.into(),
            settings,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub project_id: ProjectId,
    pub title: String,
    pub tags: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(project_id: ProjectId, title: impl Into<String>, tags: Value) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            project_id,
            title: title.into(),
            tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The surface a message or an approval arrived through.
///
/// Channels differ in trust: approvals are only accepted from the channels
/// the approval gate lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// First-party web surface.
    Web,
    /// Bot relay.
    Telegram,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CaravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Channel::Web),
            "telegram" => Ok(Channel::Telegram),
            other => Err(CaravelError::InvalidInput {
                reason: format!("unknown channel '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = CaravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(CaravelError::InvalidInput {
                reason: format!("unknown message role '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub channel: Channel,
    pub role: Role,
    pub content: String,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        thread_id: ThreadId,
        channel: Channel,
        role: Role,
        content: impl Into<String>,
        meta: Value,
    ) -> Self {
        Self {
            id: MessageId::new(),
            thread_id,
            channel,
            role,
            content: content.into(),
            meta,
            created_at: Utc::now(),
        }
    }
}

/// Metadata for a stored blob. The bytes live in the artifact store under
/// `storage_path`, relative to the store's root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub project_id: ProjectId,
    pub thread_id: Option<ThreadId>,
    pub action_id: Option<ActionId>,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub storage_path: String,
    pub filename: String,
    pub metadata: Value,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// A request to store a new artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub project_id: ProjectId,
    pub thread_id: Option<ThreadId>,
    pub action_id: Option<ActionId>,
    pub artifact_type: String,
    pub filename: String,
    pub metadata: Value,
    pub content: Vec<u8>,
}

/// Narrows an artifact listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactFilter {
    pub project_id: Option<ProjectId>,
    pub thread_id: Option<ThreadId>,
    pub action_id: Option<ActionId>,
    pub limit: Option<usize>,
}

impl ArtifactFilter {
    pub fn for_action(action_id: ActionId) -> Self {
        Self {
            action_id: Some(action_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.project_id.map_or(true, |id| artifact.project_id == id)
            && self.thread_id.map_or(true, |id| artifact.thread_id == Some(id))
            && self.action_id.map_or(true, |id| artifact.action_id == Some(id))
    }
}
