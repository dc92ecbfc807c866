//! Core types for history-export
//!
//! Wire records mirror the Graph chat message shape (camelCase JSON) as plain
//! data; report and job types describe the pipeline around them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A chat or channel message as returned by the conversation API
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier
    pub id: String,
    /// Identifier of the thread root this message replies to (None = thread root)
    #[serde(default)]
    pub reply_to_id: Option<String>,
    /// Version tag of the message
    #[serde(default)]
    pub etag: Option<String>,
    /// Creation time
    pub created_date_time: DateTime<Utc>,
    /// Last edit time
    #[serde(default)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
    /// Deletion time (deleted messages keep their slot in the thread)
    #[serde(default)]
    pub deleted_date_time: Option<DateTime<Utc>>,
    /// Subject line, only set on channel thread roots
    #[serde(default)]
    pub subject: Option<String>,
    /// Summary text used for notifications
    #[serde(default)]
    pub summary: Option<String>,
    /// Importance ("normal", "high", "urgent")
    #[serde(default)]
    pub importance: Option<String>,
    /// Locale of the message
    #[serde(default)]
    pub locale: Option<String>,
    /// Sender
    #[serde(default)]
    pub from: Option<IdentitySet>,
    /// Message body
    #[serde(default)]
    pub body: MessageBody,
    /// Attached files, cards and links
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<MessageAttachment>,
    /// Entities mentioned in the message
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mentions: Vec<MessageMention>,
    /// Reactions on the message
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reactions: Vec<MessageReaction>,
}

impl Message {
    /// True when the message starts a thread
    pub fn is_root(&self) -> bool {
        self.reply_to_id.is_none()
    }

    /// Display names of every identity in the sender set
    pub fn sender_names(&self) -> Vec<&str> {
        self.from
            .as_ref()
            .map(IdentitySet::display_names)
            .unwrap_or_default()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Message body content
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    /// Body content
    #[serde(default)]
    pub content: String,
    /// Kind of content
    #[serde(default)]
    pub content_type: ContentKind,
}

/// Kind of message body content
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text
    #[default]
    Text,
    /// HTML markup
    Html,
    /// Any kind the API adds later
    #[serde(other)]
    Other,
}

/// Set of identities that can author or be mentioned in a message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySet {
    /// Bot or application identity
    #[serde(default)]
    pub application: Option<Identity>,
    /// Conversation identity (e.g. a channel)
    #[serde(default)]
    pub conversation: Option<Identity>,
    /// Device identity
    #[serde(default)]
    pub device: Option<Identity>,
    /// User identity
    #[serde(default)]
    pub user: Option<Identity>,
}

impl IdentitySet {
    /// Display names in application, conversation, user, device order
    pub fn display_names(&self) -> Vec<&str> {
        [&self.application, &self.conversation, &self.user, &self.device]
            .into_iter()
            .flatten()
            .filter_map(|identity| identity.display_name.as_deref())
            .collect()
    }
}

/// A single identity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Identity id
    #[serde(default)]
    pub id: Option<String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Attachment on a message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttachment {
    /// Attachment id
    #[serde(default)]
    pub id: Option<String>,
    /// MIME type or card type
    #[serde(default)]
    pub content_type: Option<String>,
    /// Link to the attachment content
    #[serde(default)]
    pub content_url: Option<String>,
    /// Inline content (cards)
    #[serde(default)]
    pub content: Option<String>,
    /// File name
    #[serde(default)]
    pub name: Option<String>,
    /// Thumbnail link
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Mention in a message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMention {
    /// Index of the mention within the body
    #[serde(default)]
    pub id: i64,
    /// Text used for the mention
    #[serde(default)]
    pub mention_text: Option<String>,
    /// Who was mentioned
    #[serde(default)]
    pub mentioned: Option<IdentitySet>,
}

/// Reaction on a message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReaction {
    /// When the reaction was added
    pub created_date_time: DateTime<Utc>,
    /// Reaction kind ("like", "angry", ...)
    pub reaction_type: String,
    /// Who reacted
    #[serde(default)]
    pub user: Option<IdentitySet>,
}

/// One page of a message collection
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessagePage {
    /// Messages on this page, newest first
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: Vec<Message>,
    /// Continuation cursor (absent on the last page)
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Messages sharing one lineage, ordered by creation time
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageThread {
    /// Whether the thread root was part of the fetched set
    pub is_full: bool,
    /// Members in ascending creation order
    pub messages: Vec<Message>,
    /// Creation time of the newest member
    pub last_activity: DateTime<Utc>,
}

/// Which conversation subset a report covers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportScope {
    /// One-to-one or group chat
    Chat {
        /// Chat id
        chat_id: String,
    },
    /// Every message of a channel
    Channel {
        /// Team (group) id
        team_id: String,
        /// Channel id
        channel_id: String,
    },
    /// One thread of a channel (root and replies)
    Thread {
        /// Team (group) id
        team_id: String,
        /// Channel id
        channel_id: String,
        /// Id of the thread root message
        message_id: String,
    },
}

/// Time window requested by the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    /// Messages from the last 24 hours
    LastDay,
    /// Messages from the last 7 days
    Last7Days,
    /// Entire history
    #[default]
    AllTime,
}

impl ReportPeriod {
    /// Cutoff for a report generated at `till`
    pub fn since(self, till: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ReportPeriod::LastDay => Some(till - Duration::days(1)),
            ReportPeriod::Last7Days => Some(till - Duration::days(7)),
            ReportPeriod::AllTime => None,
        }
    }
}

/// Report document format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// HTML document
    Html,
    /// PDF document
    Pdf,
    /// JSON dump of the messages
    Json,
    /// Plain text document
    Txt,
}

impl ReportFormat {
    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Pdf => "pdf",
            ReportFormat::Json => "json",
            ReportFormat::Txt => "txt",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReportFormat::Html => "HTML",
            ReportFormat::Pdf => "PDF",
            ReportFormat::Json => "JSON",
            ReportFormat::Txt => "TXT",
        })
    }
}

/// Destination drive of an upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveScope {
    /// The requesting user's personal drive
    Personal,
    /// The document library of a team
    Group {
        /// Group id of the team
        group_id: String,
    },
}

/// Everything a renderer needs to produce a report
#[derive(Clone, Debug, Serialize)]
pub struct ReportDetails {
    /// Start of the reported window (None = all time)
    pub since: Option<DateTime<Utc>>,
    /// End of the reported window
    pub till: DateTime<Utc>,
    /// Team display name (channel reports)
    pub team_name: Option<String>,
    /// Team id (channel reports)
    pub team_id: Option<String>,
    /// Channel display name (channel reports)
    pub channel_name: Option<String>,
    /// Name of the user who requested the report
    pub author: Option<String>,
    /// Report covers a whole channel
    pub is_channel: bool,
    /// Report covers a single channel thread
    pub is_conversation: bool,
    /// Report covers a chat
    pub is_group_chat: bool,
    /// Reconstructed threads, oldest activity first
    pub threads: Vec<MessageThread>,
}

impl ReportDetails {
    /// Number of messages across all threads
    pub fn message_count(&self) -> usize {
        self.threads.iter().map(|t| t.messages.len()).sum()
    }

    /// Iterate messages in thread order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.threads.iter().flat_map(|t| t.messages.iter())
    }
}

/// Input of the report pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportParameters {
    /// Conversation subset to export
    pub scope: ReportScope,
    /// Requested time window
    #[serde(default)]
    pub period: ReportPeriod,
    /// Output format
    pub format: ReportFormat,
    /// Where the report is stored
    #[serde(default = "default_drive")]
    pub drive: DriveScope,
    /// Requesting user's display name
    #[serde(default)]
    pub author: Option<String>,
    /// Team display name, when known
    #[serde(default)]
    pub team_name: Option<String>,
    /// Channel display name, when known
    #[serde(default)]
    pub channel_name: Option<String>,
}

fn default_drive() -> DriveScope {
    DriveScope::Personal
}

/// File stored in a drive by the upload engine
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedItem {
    /// Drive item id
    pub id: String,
    /// Browser URL of the file
    pub web_url: Option<String>,
    /// Direct download URL
    pub download_url: Option<String>,
    /// MIME type reported by the drive
    pub mime_type: Option<String>,
    /// Stable unique id of the file
    pub unique_id: String,
    /// File name, set by the report pipeline
    pub file_name: Option<String>,
}

/// Unique identifier for a background job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted by the queue
    JobQueued {
        /// Job id
        id: JobId,
        /// Job label
        name: String,
    },
    /// A worker picked the job up
    JobStarted {
        /// Job id
        id: JobId,
    },
    /// Job finished successfully
    JobCompleted {
        /// Job id
        id: JobId,
    },
    /// Job returned an error or panicked
    JobFailed {
        /// Job id
        id: JobId,
        /// Error message
        error: String,
    },
    /// Dispatcher shut down
    Shutdown,
}
