//! Transcript digests for carrying context between chat sessions.
//!
//! A digest is a lossy, best-effort summary: message counts, a few coarse
//! project attributes and the most recent messages that look like decisions.
//! Intent detection is plain substring matching in [`classify_intent`] and
//! [`detect_project_attributes`].

use crate::config::DigestConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Summary used for an empty transcript.
pub const NO_HISTORY_SUMMARY: &str = "No chat history available";

const CREATION_MARKERS: &[&str] = &["create", "build"];
const DEPLOYMENT_MARKERS: &[&str] = &["deploy", "publish"];

/// One transcript entry. Every field defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

impl TranscriptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: String::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Builds a message from arbitrary JSON, never failing.
    ///
    /// Missing or non-string fields become empty; numeric timestamps are
    /// kept in their textual form.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| match value.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Self {
            role: field("role"),
            content: field("content"),
            timestamp: field("timestamp"),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

/// Reads a transcript from a JSON array; anything else is an empty transcript.
pub fn transcript_from_value(value: &Value) -> Vec<TranscriptMessage> {
    value
        .as_array()
        .map(|items| items.iter().map(TranscriptMessage::from_value).collect())
        .unwrap_or_default()
}

/// Kind of decision a message expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Asks for something to be created or built.
    CreationRequest,
    /// Asks for a deployment or release.
    DeploymentAction,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreationRequest => "creation_request",
            Self::DeploymentAction => "deployment_action",
        }
    }
}

/// Excerpt of a message that looked like a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDecision {
    #[serde(rename = "type")]
    pub kind: DecisionKind,
    pub content: String,
    /// Timestamp of the original message, empty if it had none.
    #[serde(default)]
    pub timestamp: String,
}

/// Coarse attributes inferred from the opening user messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// Compact summary of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDigest {
    pub summary: String,
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    #[serde(default)]
    pub project_details: ProjectDetails,
    /// Most recent decisions, oldest first.
    #[serde(default)]
    pub key_decisions: Vec<KeyDecision>,
    pub created_at: DateTime<Utc>,
}

/// Classifies a message by its markers. Creation wins over deployment.
pub fn classify_intent(content: &str) -> Option<DecisionKind> {
    let lower = content.to_lowercase();
    if CREATION_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(DecisionKind::CreationRequest)
    } else if DEPLOYMENT_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(DecisionKind::DeploymentAction)
    } else {
        None
    }
}

/// Updates `details` from one user message. Later matches overwrite earlier ones.
pub fn detect_project_attributes(content: &str, details: &mut ProjectDetails) {
    let lower = content.to_lowercase();
    if lower.contains("app") {
        details.project_type = Some("mobile_app".to_string());
    }
    if lower.contains("react native") {
        details.framework = Some("react_native".to_string());
    }
    if lower.contains("flutter") {
        details.framework = Some("flutter".to_string());
    }
}

/// First `max_chars` characters, with `...` appended if anything was cut.
pub fn excerpt(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Reduces a transcript to a digest. Never fails.
pub fn summarize(transcript: &[TranscriptMessage], config: &DigestConfig) -> ChatDigest {
    let created_at = Utc::now();
    if transcript.is_empty() {
        return ChatDigest {
            summary: NO_HISTORY_SUMMARY.to_string(),
            message_count: 0,
            user_messages: 0,
            assistant_messages: 0,
            project_details: ProjectDetails::default(),
            key_decisions: Vec::new(),
            created_at,
        };
    }

    let user_messages = transcript.iter().filter(|m| m.is_user()).count();
    let assistant_messages = transcript.iter().filter(|m| m.is_assistant()).count();

    let mut key_decisions: Vec<KeyDecision> = transcript
        .iter()
        .filter_map(|message| {
            classify_intent(&message.content).map(|kind| KeyDecision {
                kind,
                content: excerpt(&message.content, config.excerpt_chars),
                timestamp: message.timestamp.clone(),
            })
        })
        .collect();
    if key_decisions.len() > config.max_key_decisions {
        key_decisions.drain(..key_decisions.len() - config.max_key_decisions);
    }

    let mut project_details = ProjectDetails::default();
    for message in transcript
        .iter()
        .filter(|m| m.is_user())
        .take(config.profile_messages)
    {
        detect_project_attributes(&message.content, &mut project_details);
    }

    ChatDigest {
        summary: format!(
            "Chat session with {} messages ({} user, {} assistant)",
            transcript.len(),
            user_messages,
            assistant_messages
        ),
        message_count: transcript.len(),
        user_messages,
        assistant_messages,
        project_details,
        key_decisions,
        created_at,
    }
}
