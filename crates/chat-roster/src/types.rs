use serde::{Deserialize, Serialize};
use std::fmt;

/// Server part of the stable, phone-number-derived address form.
pub const PHONE_SERVER: &str = "s.whatsapp.net";
/// Server part of the linked-device address form. Locally scoped, may rotate.
pub const LID_SERVER: &str = "lid";

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_VISIBLE_NOTIFICATIONS: usize = 5;
pub const DEFAULT_PROCESSED_CAPACITY: usize = 1024;

/// Display name some events report for the user's own chat. Never shown as a
/// contact name; the numeric part of the address is used instead.
pub const SELF_NAME_PLACEHOLDER: &str = "You";

/// A contact address in either wire form: `<digits>@s.whatsapp.net` (phone)
/// or `<opaque>@lid` (linked device).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The part before `@`; the whole string when there is no server part.
    pub fn user(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    pub fn server(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, server)| server)
    }

    pub fn is_phone_address(&self) -> bool {
        self.server() == Some(PHONE_SERVER)
    }

    pub fn is_lid(&self) -> bool {
        self.server() == Some(LID_SERVER)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Other,
}

impl MessageKind {
    /// Preview shown for messages that carry no text body.
    pub fn placeholder(&self) -> &'static str {
        match self {
            MessageKind::Text => "",
            MessageKind::Image => "[image]",
            MessageKind::Video => "[video]",
            MessageKind::Audio => "[audio]",
            MessageKind::Document => "[document]",
            MessageKind::Sticker => "[sticker]",
            MessageKind::Other => "[message]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub kind: MessageKind,
    pub direction: Direction,
    pub preview: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// One conversation as currently known. Unique per canonical identity within
/// a merged collection; mutated in place as newer messages arrive, never
/// deleted for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    /// Dedup key. Recomputed on every merge; input values are not trusted.
    pub canonical: Address,
    /// The alias last used to reach this contact.
    pub address: Address,
    /// Phone-address form, when the source exposed both forms at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_address: Option<Address>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub last_message: LastMessage,
    #[serde(default)]
    pub has_unseen: bool,
}

impl ChatRecord {
    pub fn new(address: Address, display_name: impl Into<String>, last_message: LastMessage) -> Self {
        Self {
            canonical: address.clone(),
            address,
            phone_address: None,
            display_name: display_name.into(),
            avatar_url: None,
            last_message,
            has_unseen: false,
        }
    }
}

/// An inbound live message event from the messaging network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub address: Address,
    /// Phone-address form when the event carries both identifier forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_address: Option<Address>,
    pub message_id: String,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub direction: Direction,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(default)]
    pub is_edit: bool,
}

impl MessageEvent {
    pub fn validate(&self) -> crate::Result<()> {
        if self.address.is_empty() {
            return Err(crate::Error::InvalidEvent(
                "message event has an empty address".to_string(),
            ));
        }
        if self.message_id.is_empty() {
            return Err(crate::Error::InvalidEvent(
                "message event has an empty message id".to_string(),
            ));
        }
        Ok(())
    }

    pub fn preview(&self) -> String {
        match self.body.as_deref() {
            Some(body) if !body.is_empty() => body.to_string(),
            _ => self.kind.placeholder().to_string(),
        }
    }

    /// Reported push name, unless it is missing or the self-referential
    /// placeholder; then the numeric part of the phone address (or of the
    /// alias when no phone form is known).
    pub fn display_name(&self) -> String {
        match self.push_name.as_deref() {
            Some(name) if !name.is_empty() && name != SELF_NAME_PLACEHOLDER => name.to_string(),
            _ => self
                .phone_address
                .as_ref()
                .unwrap_or(&self.address)
                .user()
                .to_string(),
        }
    }
}

/// A user-visible notification derived from one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNotification {
    pub canonical: Address,
    pub message_id: String,
    pub display_name: String,
    pub preview: String,
    pub timestamp: u64,
}

/// Events emitted by roster components for external handling.
///
/// The receiver decides what to do with each: re-render open chat lists on
/// `MappingSaved`, play the audio cue on `PlaySound`, raise a transient toast
/// on `ShowToast`. All sends are best-effort.
#[derive(Debug, Clone)]
pub enum RosterEvent {
    MappingSaved { alias: Address, phone: Address },
    PlaySound,
    ShowToast(ChatNotification),
}
