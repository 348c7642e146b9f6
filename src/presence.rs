//! Presence values derived from metadata lines, and the payload sent to the settings endpoint.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The only playback state that produces a visible status.
pub const PLAYING: &str = "Playing";
/// Emoji shown next to the status text.
pub const DEFAULT_EMOJI: &str = "🎵";
/// How long a status stays up before it is cleared.
pub const ACTIVITY_AGE: Duration = Duration::from_secs(10 * 60);

const SEPARATOR: &str = ": ";

/// What the remote status should currently say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    Active {
        label: String,
        expires_at: DateTime<Utc>,
    },
    Cleared,
}

impl PresenceState {
    /// Decides the presence for a raw metadata line.
    ///
    /// The line is split once on `": "`. Only a first field of exactly `Playing`
    /// followed by the separator counts as playing; everything else clears.
    pub fn from_line(line: &str, now: DateTime<Utc>, age: Duration) -> Self {
        match line.split_once(SEPARATOR) {
            Some((PLAYING, label)) => PresenceState::Active {
                label: label.to_string(),
                expires_at: expiry(now, age),
            },
            _ => PresenceState::Cleared,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PresenceState::Active { .. })
    }

    /// Converts into the transient status object, or `None` to clear it.
    pub fn into_status(self, emoji: &str) -> Option<CustomStatus> {
        match self {
            PresenceState::Active { label, expires_at } => Some(CustomStatus {
                text: format!("Listening to {}", label),
                expires_at,
                emoji_name: emoji.to_string(),
            }),
            PresenceState::Cleared => None,
        }
    }
}

fn expiry(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_add_signed(age))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Custom status as understood by the user settings endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomStatus {
    pub text: String,
    pub expires_at: DateTime<Utc>,
    pub emoji_name: String,
}

/// Request body for the settings PATCH.
///
/// `custom_status` is always present; `null` erases a previously set status.
#[derive(Debug, Serialize)]
pub struct SettingsPatch<'a> {
    pub custom_status: Option<&'a CustomStatus>,
}
