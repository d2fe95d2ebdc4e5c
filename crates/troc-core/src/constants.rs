//! Application-wide constants
//!
//! Centralized location for magic strings and configuration values
//! that are used across multiple modules.

/// Canned questions available while a conversation is still restricted
/// (no confirmed booking between the two parties). The catalog is fixed and
/// ordered; a preset is identified by exact content match plus sender.
pub const PRESET_QUESTIONS: &[&str] = &[
    "Is this still available?",
    "What exactly is included in the price?",
    "Is the date or time flexible?",
    "Where does this take place?",
    "Do you offer anything for beginners?",
];

/// Returns true when `text` exactly matches one of the preset questions.
pub fn is_preset_question(text: &str) -> bool {
    PRESET_QUESTIONS.iter().any(|q| *q == text)
}

/// Off-platform channel names and phrases the classifier matches
/// case-insensitively. Any hit flags the message on its own.
pub const CONTACT_CHANNEL_KEYWORDS: &[&str] = &[
    "whatsapp",
    "telegram",
    "signal",
    "viber",
    "snapchat",
    "instagram",
    "facebook",
    "wechat",
    "skype",
    "call me",
    "text me",
    "my number",
    "my email",
];

/// Advisory shown to the sender when the classifier flags a message.
/// The message itself is sent unmodified; this is a nudge, not enforcement.
pub const CONTACT_ADVISORY: &str =
    "Looks like you may be sharing contact details. Keeping the conversation \
     on the platform protects your payments and reviews.";

/// Label used when the counterpart resolves in neither identity namespace.
pub const UNKNOWN_PARTY_LABEL: &str = "Unknown member";

/// Prefix for client-generated optimistic message ids, keeping them
/// distinct from the store-assigned id space.
pub const OPTIMISTIC_ID_PREFIX: &str = "local-";

/// Minimum digit count for the phone-number-shape classifier rule.
pub const PHONE_DIGIT_THRESHOLD: usize = 7;

/// Per-thread change-feed channel capacity. A subscriber that falls this
/// far behind is disconnected and must re-fetch history.
pub const FEED_CHANNEL_CAPACITY: usize = 256;

// Change-feed resubscription backoff
pub const RESUBSCRIBE_BACKOFF_BASE_MS: u64 = 200;
pub const RESUBSCRIBE_BACKOFF_MAX_MS: u64 = 5_000;

/// Default database file name inside the data dir.
pub const DB_FILE_NAME: &str = "conversations.db";
