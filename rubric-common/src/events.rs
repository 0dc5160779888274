//! Progress stream message types
//!
//! Every message is one SSE frame of the form `data: <JSON>\n\n`, where the
//! JSON object carries a `type` discriminator:
//!
//! - `connected` - acknowledgment sent only to the subscribing client
//! - `user_joined` / `user_left` - topic membership changes
//! - `started` / `completed` / `error` - assessment lifecycle
//! - `message` - free-form chat between observers of a topic
//!
//! Messages are ephemeral: they exist only on the wire and are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observer identity attached to membership and chat messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
        }
    }

    /// Placeholder identity for clients that connect without one
    pub fn anonymous(client_id: &str) -> Self {
        Self::new(client_id, "anonymous")
    }
}

/// Assessment lifecycle payload shared by `started`, `completed` and `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_level: Option<String>,
    /// Generic, user-facing text; never internal error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            submission_id: None,
            student_name: None,
            evaluation_id: None,
            overall_level: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_submission(mut self, submission_id: impl Into<String>) -> Self {
        self.submission_id = Some(submission_id.into());
        self
    }

    pub fn with_student(mut self, student_name: impl Into<String>) -> Self {
        self.student_name = Some(student_name.into());
        self
    }

    pub fn with_evaluation(mut self, evaluation_id: Uuid, overall_level: impl Into<String>) -> Self {
        self.evaluation_id = Some(evaluation_id);
        self.overall_level = Some(overall_level.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Everything that travels over a progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    /// Subscription acknowledged
    #[serde(rename_all = "camelCase")]
    Connected { client_id: String, user: UserInfo },

    /// Another observer subscribed to the topic
    UserJoined {
        user: UserInfo,
        timestamp: DateTime<Utc>,
    },

    /// An observer left the topic
    UserLeft {
        user: UserInfo,
        timestamp: DateTime<Utc>,
    },

    /// Assessment call issued
    Started(ProgressEvent),

    /// Assessment finished and the result is available
    Completed(ProgressEvent),

    /// Provider failed; the result was produced by fallback generation
    Error(ProgressEvent),

    /// Chat message relayed between observers
    Message {
        user: UserInfo,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressMessage {
    pub fn user_joined(user: UserInfo) -> Self {
        Self::UserJoined {
            user,
            timestamp: Utc::now(),
        }
    }

    pub fn user_left(user: UserInfo) -> Self {
        Self::UserLeft {
            user,
            timestamp: Utc::now(),
        }
    }

    pub fn chat(user: UserInfo, message: impl Into<String>) -> Self {
        Self::Message {
            user,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wire discriminator (`type` field)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::Started(_) => "started",
            Self::Completed(_) => "completed",
            Self::Error(_) => "error",
            Self::Message { .. } => "message",
        }
    }

    /// Format as a complete SSE frame: `data: <JSON>\n\n`
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_connected_wire_shape() {
        let msg = ProgressMessage::Connected {
            client_id: "c-1".to_string(),
            user: UserInfo::new("u-1", "Teacher"),
        };
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["clientId"], "c-1");
        assert_eq!(json["user"]["name"], "Teacher");
    }

    #[test]
    fn test_lifecycle_wire_shape_omits_absent_fields() {
        let msg = ProgressMessage::Started(
            ProgressEvent::new("assignment-1")
                .with_submission("sub-9")
                .with_student("Minji"),
        );
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["topicId"], "assignment-1");
        assert_eq!(json["submissionId"], "sub-9");
        assert_eq!(json["studentName"], "Minji");
        assert!(json.get("evaluationId").is_none());
        assert!(json.get("overallLevel").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_completed_carries_evaluation() {
        let id = Uuid::new_v4();
        let msg = ProgressMessage::Completed(ProgressEvent::new("a").with_evaluation(id, "good"));
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["evaluationId"], id.to_string());
        assert_eq!(json["overallLevel"], "good");
    }

    #[test]
    fn test_membership_and_chat_types() {
        let user = UserInfo::new("u", "n");
        assert_eq!(ProgressMessage::user_joined(user.clone()).event_type(), "user_joined");
        assert_eq!(ProgressMessage::user_left(user.clone()).event_type(), "user_left");

        let chat = ProgressMessage::chat(user, "hello");
        let json: Value = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn test_sse_frame_round_trips() {
        let msg = ProgressMessage::chat(UserInfo::new("u", "n"), "hi");
        let frame = msg.to_sse_frame().unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));

        let payload = frame.trim_start_matches("data: ").trim_end();
        let parsed: ProgressMessage = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed, msg);
    }
}
