//! The user profile: identity, joined channels, and friends.
//!
//! Serde derives make the profile serializable for the embedding
//! application's export/import flow; this crate itself never touches disk
//! or session storage.

use hermes_crypto::generate_keypair;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum length of channel and friend display names.
pub const NAME_MIN: usize = 6;
/// Maximum length of channel and friend display names.
pub const NAME_MAX: usize = 36;

/// Length bounds for base64 key material in profile entries.
const KEY_MIN: usize = 32;
const KEY_MAX: usize = 96;

const ADJECTIVES: [&str; 6] = ["Swift", "Bright", "Silent", "Noble", "Mystic", "Cosmic"];
const NOUNS: [&str; 6] = ["Phoenix", "Dragon", "Falcon", "Knight", "Voyager", "Wanderer"];

/// Profile mutation failures, surfaced to the user interface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// Name outside the allowed length range.
    #[error("name must be between {NAME_MIN} and {NAME_MAX} characters")]
    InvalidNameLength,
    /// A channel with this name already exists.
    #[error("channel {0:?} already exists")]
    DuplicateChannel(String),
    /// A friend with this name already exists.
    #[error("friend {0:?} already exists")]
    DuplicateFriend(String),
    /// Key material is not base64 of an acceptable length.
    #[error("key must be base64, between {KEY_MIN} and {KEY_MAX} characters")]
    InvalidKeyFormat,
}

/// The local user's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Display name used for direct messages.
    pub name: String,
    /// Long-term Ed25519 public key, base64.
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    /// Long-term Ed25519 private key, base64 (seed || public layout).
    #[serde(rename = "privKey")]
    pub priv_key: String,
}

/// A joined channel; `key` present only for private channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Channel name, also the pseudonym derivation context.
    pub name: String,
    /// Shared symmetric channel key, base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// A friend reachable by direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    /// Friend display name.
    pub name: String,
    /// Friend's long-term public key, base64.
    #[serde(rename = "pubKey")]
    pub pub_key: String,
}

/// The complete user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Local identity.
    pub user: UserIdentity,
    /// Joined channels.
    pub channels: Vec<ChannelEntry>,
    /// Known friends.
    pub friends: Vec<FriendEntry>,
}

impl Profile {
    /// Generate a fresh profile: random identity plus the default public
    /// channels.
    pub fn generate() -> Self {
        let keypair = generate_keypair();
        Self {
            user: UserIdentity {
                name: generate_username(),
                pub_key: keypair.pub_key,
                priv_key: keypair.priv_key,
            },
            channels: vec![
                ChannelEntry {
                    name: "General".into(),
                    key: None,
                },
                ChannelEntry {
                    name: "TechTalk".into(),
                    key: None,
                },
            ],
            friends: Vec::new(),
        }
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelEntry> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// Look up a friend by name.
    pub fn friend(&self, name: &str) -> Option<&FriendEntry> {
        self.friends.iter().find(|friend| friend.name == name)
    }

    /// Join a channel; a key makes it private.
    pub fn add_channel(&mut self, name: &str, key: Option<String>) -> Result<(), ProfileError> {
        validate_name(name)?;
        if self.channel(name).is_some() {
            return Err(ProfileError::DuplicateChannel(name.to_string()));
        }
        if let Some(key) = &key {
            validate_key(key)?;
        }
        self.channels.push(ChannelEntry {
            name: name.to_string(),
            key,
        });
        Ok(())
    }

    /// Remove a channel; returns whether it existed.
    pub fn remove_channel(&mut self, name: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|channel| channel.name != name);
        self.channels.len() != before
    }

    /// Add a friend with their public key.
    pub fn add_friend(&mut self, name: &str, pub_key: &str) -> Result<(), ProfileError> {
        validate_name(name)?;
        if self.friend(name).is_some() {
            return Err(ProfileError::DuplicateFriend(name.to_string()));
        }
        validate_key(pub_key)?;
        self.friends.push(FriendEntry {
            name: name.to_string(),
            pub_key: pub_key.to_string(),
        });
        Ok(())
    }

    /// Remove a friend; returns whether they existed.
    pub fn remove_friend(&mut self, name: &str) -> bool {
        let before = self.friends.len();
        self.friends.retain(|friend| friend.name != name);
        self.friends.len() != before
    }
}

/// Random display name: adjective + noun + three digits.
pub fn generate_username() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let number: u16 = rng.gen_range(0..1000);
    format!("{adjective}{noun}{number:03}")
}

fn validate_name(name: &str) -> Result<(), ProfileError> {
    let len = name.chars().count();
    if (NAME_MIN..=NAME_MAX).contains(&len) {
        Ok(())
    } else {
        Err(ProfileError::InvalidNameLength)
    }
}

fn validate_key(key: &str) -> Result<(), ProfileError> {
    let len = key.len();
    let base64_chars = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=');
    if (KEY_MIN..=KEY_MAX).contains(&len) && base64_chars {
        Ok(())
    } else {
        Err(ProfileError::InvalidKeyFormat)
    }
}
