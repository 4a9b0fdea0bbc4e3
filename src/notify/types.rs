//! Notification request and outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered so that `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl NotificationPriority {
    pub const ALL: [NotificationPriority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Only medium and low notifications may wait in a batch.
    pub fn is_batchable(&self) -> bool {
        matches!(self, Self::Medium | Self::Low)
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("unknown notification priority: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Sms,
    Email,
    InApp,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Self::Push, Self::Sms, Self::Email, Self::InApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::InApp => "in_app",
        }
    }

    /// Per-channel priority gate: SMS carries only critical notifications,
    /// email only low-priority non-urgent ones.
    pub fn accepts(&self, notification: &Notification) -> bool {
        match self {
            Self::Sms => notification.priority == NotificationPriority::Critical,
            Self::Email => notification.priority == NotificationPriority::Low && !notification.urgent,
            Self::Push | Self::InApp => true,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            "in_app" | "in-app" => Ok(Self::InApp),
            _ => Err(format!("unknown channel: {s}")),
        }
    }
}

/// A one-off notification request. Not persisted itself; the delivery log
/// records the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Type tag, e.g. `"reminder"`, `"task_completed"`, `"batch"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    /// Bypasses optimal-time deferral and quiet hours.
    #[serde(default)]
    pub urgent: bool,
    /// Identity of the thing this notification is about, used for batch dedup.
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(kind: &str, title: &str, body: &str, priority: NotificationPriority) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            priority,
            urgent: false,
            source_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    pub fn with_source(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Batch dedup key: `(type, source id)`, falling back to the title.
    pub fn dedup_key(&self) -> (&str, &str) {
        (
            self.kind.as_str(),
            self.source_id.as_deref().unwrap_or(self.title.as_str()),
        )
    }
}

/// Why a notification was dropped before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    PriorityDisabled,
    QuietHours,
    DoNotDisturb,
    /// No enabled channel accepts this priority.
    NoChannel,
}

/// Result of [`super::Pipeline::send`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    /// Handed to these channels. Per-channel results land in the delivery log.
    Sent { channels: Vec<Channel> },
    Filtered { reason: FilterReason },
    Queued { deliver_at: DateTime<Utc> },
    /// Added to the owner's pending batch, which now holds `pending` items.
    Batched { pending: usize },
}

impl SendOutcome {
    pub fn sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Outcome of one channel attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: Channel,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of an immediate delivery across all eligible channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub owner: String,
    pub results: Vec<ChannelResult>,
}

impl DeliveryReport {
    /// Delivered if at least one channel succeeded.
    pub fn success(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }
}
