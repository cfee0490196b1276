//! Outbound message packaging and inbound payload opening.
//!
//! Packaging runs the origin half of the data flow: encrypt when key
//! material exists, stamp the TTL class, substitute the per-channel
//! pseudonym, sign the exact payload string, then serialize and pad into a
//! wire frame. Channel messages strip the sender's public key
//! unconditionally; only the pseudonym remains.

use crate::profile::Profile;
use hermes_core::{Envelope, MessageIdGenerator, MessageKind, Payload, Sender, Timestamp};
use hermes_crypto::CryptoError;
use hermes_framing::FramingError;
use thiserror::Error;
use tracing::warn;

/// Display length of pseudonymous sender names.
const PSEUDONYM_DISPLAY_LEN: usize = 16;

/// Outbound packaging failures, surfaced to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageError {
    /// The serialized envelope exceeds the largest wire frame. Distinct so
    /// the interface can explain the limit instead of silently dropping.
    #[error("message of {size} bytes exceeds the largest wire frame")]
    MessageTooLarge {
        /// Serialized envelope size in bytes.
        size: usize,
    },
    /// Key material in the profile could not be used.
    #[error("cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),
    /// The envelope could not be serialized.
    #[error("envelope serialization failed")]
    Serialization,
}

/// Result of opening an inbound payload against the local profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenedMessage {
    /// The payload arrived as plaintext.
    Plain(String),
    /// The payload decrypted successfully.
    Decrypted(String),
    /// Sealed, but no local key material opens it.
    Undecryptable,
}

/// Build a signed envelope for an outgoing message.
///
/// Confidentiality and identity treatment per kind:
/// - `direct`: sealed to the friend's key when known (plaintext otherwise);
///   real display name and public key retained.
/// - `private`: sealed under the channel key when present; public key
///   stripped; pseudonymous name.
/// - `public`: plaintext; public key stripped; pseudonymous name.
pub fn package_message(
    text: &str,
    kind: MessageKind,
    to: &str,
    profile: &Profile,
    ids: &MessageIdGenerator,
) -> Result<Envelope, PackageError> {
    let user = &profile.user;

    let (payload, from) = match kind {
        MessageKind::Direct => {
            let payload = match profile.friend(to) {
                Some(friend) => {
                    Payload::Sealed(hermes_crypto::seal_direct(text, &friend.pub_key)?)
                }
                // No key for this recipient: the message goes out readable.
                None => Payload::Plain(text.to_string()),
            };
            let from = Sender {
                name: user.name.clone(),
                pub_key: Some(user.pub_key.clone()),
            };
            (payload, from)
        }
        MessageKind::Private | MessageKind::Public => {
            let channel_key = profile.channel(to).and_then(|channel| channel.key.clone());
            let payload = match (kind, channel_key) {
                (MessageKind::Private, Some(key)) => {
                    Payload::Sealed(hermes_crypto::seal_channel(text, &key)?)
                }
                _ => Payload::Plain(text.to_string()),
            };
            let name = match hermes_pseudonym::derive(&user.priv_key, to) {
                Ok(pseudonym) => {
                    hermes_pseudonym::shorten(&pseudonym, PSEUDONYM_DISPLAY_LEN).to_string()
                }
                Err(error) => {
                    warn!(%error, channel = %to, "pseudonym derivation failed, using real name");
                    user.name.clone()
                }
            };
            // Anonymity for channel traffic: no public key, ever.
            let from = Sender {
                name,
                pub_key: None,
            };
            (payload, from)
        }
    };

    let mut envelope = Envelope {
        id: ids.next_id(),
        kind,
        timestamp: Timestamp::now(),
        ttl: 0,
        to: to.to_string(),
        from,
        message: payload,
        signature: String::new(),
    };
    hermes_ttl::stamp(&mut envelope);
    envelope.signature =
        hermes_crypto::sign_detached(&envelope.message.signing_string(), &user.priv_key)?;
    Ok(envelope)
}

/// Serialize and pad an envelope into a wire frame.
///
/// Oversized envelopes surface [`PackageError::MessageTooLarge`] rather
/// than being dropped.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, PackageError> {
    let bytes = serde_json::to_vec(envelope).map_err(|_| PackageError::Serialization)?;
    hermes_framing::pad(&bytes).map_err(|error| match error {
        FramingError::PayloadTooLarge { len } => PackageError::MessageTooLarge { size: len },
        _ => PackageError::Serialization,
    })
}

/// Open an inbound payload with the local profile's key material.
pub fn open_envelope(envelope: &Envelope, profile: &Profile) -> OpenedMessage {
    match &envelope.message {
        Payload::Plain(text) => OpenedMessage::Plain(text.clone()),
        Payload::Sealed(sealed) => {
            if sealed.ephemeral_pub_key.is_some() {
                match hermes_crypto::open_direct(sealed, &profile.user.priv_key) {
                    Some(text) => OpenedMessage::Decrypted(text),
                    None => OpenedMessage::Undecryptable,
                }
            } else {
                let key = profile
                    .channel(&envelope.to)
                    .and_then(|channel| channel.key.as_deref());
                match key.and_then(|key| hermes_crypto::open_channel(sealed, key)) {
                    Some(text) => OpenedMessage::Decrypted(text),
                    None => OpenedMessage::Undecryptable,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ChannelEntry, FriendEntry};
    use hermes_crypto::{generate_channel_key, generate_keypair, verify_detached};

    fn profile_with_secret_room() -> Profile {
        let mut profile = Profile::generate();
        profile
            .add_channel("SecretRoom", Some(generate_channel_key()))
            .unwrap();
        profile
    }

    fn ids() -> MessageIdGenerator {
        MessageIdGenerator::new()
    }

    #[test]
    fn public_message_is_plaintext_pseudonymous_and_signed() {
        let profile = Profile::generate();
        let envelope =
            package_message("hello", MessageKind::Public, "General", &profile, &ids()).unwrap();

        assert_eq!(envelope.kind, MessageKind::Public);
        assert_eq!(envelope.to, "General");
        assert_eq!(envelope.ttl, 86_400);
        assert_eq!(envelope.message, Payload::Plain("hello".into()));
        assert!(envelope.id.starts_with("msg_"));
        assert!(matches!(envelope.timestamp, Timestamp::Millis(_)));

        // Pseudonym, not the real username, and no routable key
        assert_eq!(envelope.from.name.len(), 16);
        assert_ne!(envelope.from.name, profile.user.name);
        assert!(envelope.from.pub_key.is_none());

        // Signed with the long-term key even though the envelope does not
        // carry it: verifiable only with out-of-band knowledge of the
        // sender's key.
        assert!(verify_detached(
            "hello",
            &envelope.signature,
            &profile.user.pub_key
        ));
    }

    #[test]
    fn pub_key_field_is_absent_from_channel_wire_json() {
        let profile = Profile::generate();
        let envelope =
            package_message("hello", MessageKind::Public, "General", &profile, &ids()).unwrap();
        let json = envelope.to_json().unwrap();
        assert!(!json.contains("pubKey"));
    }

    #[test]
    fn private_message_is_sealed_and_signed_over_the_sealed_json() {
        let profile = profile_with_secret_room();
        let envelope = package_message(
            "the meeting is at noon",
            MessageKind::Private,
            "SecretRoom",
            &profile,
            &ids(),
        )
        .unwrap();

        assert_eq!(envelope.ttl, 3_600);
        assert!(envelope.from.pub_key.is_none());
        assert_eq!(envelope.from.name.len(), 16);

        let Payload::Sealed(sealed) = &envelope.message else {
            panic!("expected sealed payload");
        };
        assert!(sealed.ephemeral_pub_key.is_none());

        // Signature covers the sealed JSON, not the plaintext
        let sealed_json = envelope.message.signing_string();
        assert!(verify_detached(
            &sealed_json,
            &envelope.signature,
            &profile.user.pub_key
        ));
        assert!(!verify_detached(
            "the meeting is at noon",
            &envelope.signature,
            &profile.user.pub_key
        ));
    }

    #[test]
    fn private_channel_without_key_falls_back_to_plaintext() {
        let mut profile = Profile::generate();
        profile.add_channel("NoKeyChannel", None).unwrap();
        let envelope = package_message(
            "plain",
            MessageKind::Private,
            "NoKeyChannel",
            &profile,
            &ids(),
        )
        .unwrap();

        assert_eq!(envelope.message, Payload::Plain("plain".into()));
        assert!(envelope.from.pub_key.is_none());
    }

    #[test]
    fn direct_message_keeps_identity_and_seals_to_the_friend() {
        let friend_keys = generate_keypair();
        let mut profile = Profile::generate();
        profile
            .add_friend("AliceExample", &friend_keys.pub_key)
            .unwrap();

        let envelope = package_message(
            "hey Alice",
            MessageKind::Direct,
            "AliceExample",
            &profile,
            &ids(),
        )
        .unwrap();

        assert_eq!(envelope.ttl, 300);
        assert_eq!(envelope.from.name, profile.user.name);
        assert_eq!(envelope.from.pub_key.as_ref(), Some(&profile.user.pub_key));

        let Payload::Sealed(sealed) = &envelope.message else {
            panic!("expected sealed payload");
        };
        assert!(sealed.ephemeral_pub_key.is_some());
        assert_eq!(
            hermes_crypto::open_direct(sealed, &friend_keys.priv_key).unwrap(),
            "hey Alice"
        );
    }

    #[test]
    fn direct_message_to_unknown_friend_stays_plaintext() {
        let profile = Profile::generate();
        let envelope = package_message(
            "hey",
            MessageKind::Direct,
            "NobodyKnown",
            &profile,
            &ids(),
        )
        .unwrap();

        assert_eq!(envelope.message, Payload::Plain("hey".into()));
        assert!(envelope.from.pub_key.is_some());
    }

    #[test]
    fn pseudonyms_differ_across_channels_but_not_across_messages() {
        let mut profile = Profile::generate();
        profile.add_channel("OtherRoom", None).unwrap();
        let generator = ids();

        let a1 = package_message("x", MessageKind::Public, "General", &profile, &generator)
            .unwrap();
        let a2 = package_message("y", MessageKind::Public, "General", &profile, &generator)
            .unwrap();
        let b = package_message("z", MessageKind::Public, "OtherRoom", &profile, &generator)
            .unwrap();

        assert_eq!(a1.from.name, a2.from.name);
        assert_ne!(a1.from.name, b.from.name);
    }

    #[test]
    fn ids_are_unique_across_packages() {
        let profile = Profile::generate();
        let generator = ids();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let envelope =
                package_message("x", MessageKind::Public, "General", &profile, &generator)
                    .unwrap();
            assert!(seen.insert(envelope.id));
        }
    }

    #[test]
    fn empty_message_text_is_allowed() {
        let profile = Profile::generate();
        let envelope =
            package_message("", MessageKind::Public, "General", &profile, &ids()).unwrap();
        assert_eq!(envelope.message, Payload::Plain(String::new()));
    }

    #[test]
    fn oversized_message_surfaces_a_distinct_error() {
        let profile = Profile::generate();
        let huge = "x".repeat(70_000);
        let envelope =
            package_message(&huge, MessageKind::Public, "General", &profile, &ids()).unwrap();
        assert!(matches!(
            encode_frame(&envelope),
            Err(PackageError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn normal_message_encodes_to_a_canonical_frame() {
        let profile = Profile::generate();
        let envelope =
            package_message("hello", MessageKind::Public, "General", &profile, &ids()).unwrap();
        let frame = encode_frame(&envelope).unwrap();
        assert!(hermes_framing::FRAME_SIZES.contains(&frame.len()));

        let recovered = Envelope::from_bytes(&hermes_framing::unpad(&frame).unwrap()).unwrap();
        assert_eq!(recovered, envelope);
    }

    #[test]
    fn open_envelope_recovers_channel_plaintext() {
        let profile = profile_with_secret_room();
        let envelope = package_message(
            "secret",
            MessageKind::Private,
            "SecretRoom",
            &profile,
            &ids(),
        )
        .unwrap();

        assert_eq!(
            open_envelope(&envelope, &profile),
            OpenedMessage::Decrypted("secret".into())
        );
    }

    #[test]
    fn open_envelope_without_the_channel_key_is_undecryptable() {
        let sender = profile_with_secret_room();
        let envelope = package_message(
            "secret",
            MessageKind::Private,
            "SecretRoom",
            &sender,
            &ids(),
        )
        .unwrap();

        let outsider = Profile::generate();
        assert_eq!(
            open_envelope(&envelope, &outsider),
            OpenedMessage::Undecryptable
        );
    }

    #[test]
    fn open_envelope_recovers_direct_plaintext_for_the_recipient_only() {
        let mut recipient = Profile::generate();
        recipient.user.name = "AliceExample".into();
        let mut sender = Profile::generate();
        sender
            .add_friend("AliceExample", &recipient.user.pub_key)
            .unwrap();

        let envelope = package_message(
            "hey Alice",
            MessageKind::Direct,
            "AliceExample",
            &sender,
            &ids(),
        )
        .unwrap();

        assert_eq!(
            open_envelope(&envelope, &recipient),
            OpenedMessage::Decrypted("hey Alice".into())
        );
        let outsider = Profile::generate();
        assert_eq!(
            open_envelope(&envelope, &outsider),
            OpenedMessage::Undecryptable
        );
    }

    #[test]
    fn open_envelope_passes_plaintext_through() {
        let profile = Profile::generate();
        let envelope =
            package_message("hi", MessageKind::Public, "General", &profile, &ids()).unwrap();
        assert_eq!(
            open_envelope(&envelope, &profile),
            OpenedMessage::Plain("hi".into())
        );
    }

    #[test]
    fn wire_json_for_direct_messages_matches_the_expected_shape() {
        let friend_keys = generate_keypair();
        let profile = Profile {
            channels: vec![ChannelEntry {
                name: "General".into(),
                key: None,
            }],
            friends: vec![FriendEntry {
                name: "AliceExample".into(),
                pub_key: friend_keys.pub_key,
            }],
            ..Profile::generate()
        };

        let envelope = package_message(
            "hey",
            MessageKind::Direct,
            "AliceExample",
            &profile,
            &ids(),
        )
        .unwrap();
        let json = envelope.to_json().unwrap();

        assert!(json.contains("\"type\":\"direct\""));
        assert!(json.contains("\"pubKey\""));
        assert!(json.contains("\"encrypted\""));
        assert!(json.contains("\"nonce\""));
        assert!(json.contains("\"ephemeralPubKey\""));
    }
}
