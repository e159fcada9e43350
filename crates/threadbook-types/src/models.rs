use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type SpoolId = i64;
pub type ThreadId = i64;
pub type MessageId = i64;

/// Visibility of a thread inside its spool.
///
/// Public threads are joined by every spool member when they are created.
/// Private threads start with the creator only and grow by invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    Public,
    Private,
}

impl ThreadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    /// Parse the wire/storage form. Anything other than `public` or `private` is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThreadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub creator_id: UserId,
    pub spool_id: SpoolId,
    pub title: String,
    #[serde(rename = "type")]
    pub thread_type: ThreadType,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn is_creator(&self, user_id: UserId) -> bool {
        self.creator_id == user_id
    }
}

/// Attachment link stored alongside a message. The binary lives in the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub id: i64,
    pub message_id: MessageId,
    pub file_link: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub payloads: Vec<Payload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_type_parses_only_known_values() {
        assert_eq!(ThreadType::parse("public"), Some(ThreadType::Public));
        assert_eq!(ThreadType::parse("private"), Some(ThreadType::Private));
        assert_eq!(ThreadType::parse("Public"), None);
        assert_eq!(ThreadType::parse("secret"), None);
        assert_eq!(ThreadType::parse(""), None);
    }

    #[test]
    fn thread_serializes_type_field() {
        let now = Utc::now();
        let thread = Thread {
            id: 7,
            creator_id: 1,
            spool_id: 3,
            title: "general".into(),
            thread_type: ThreadType::Private,
            is_closed: false,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&thread).unwrap();
        assert_eq!(json["type"], "private");
        assert_eq!(json["is_closed"], false);
    }
}
