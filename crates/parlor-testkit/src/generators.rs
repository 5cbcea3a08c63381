//! Proptest generators for property-based testing.

use proptest::prelude::*;

use parlor_core::{encode_payload, Entry, EntryBuilder, Identity, LogAddress, LogKind, MessageEntry};

/// Generate a channel or conversation address.
pub fn address() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}".prop_map(String::from)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=1_900_000_000_000i64
}

/// Generate a chat message.
pub fn message_entry() -> impl Strategy<Value = MessageEntry> {
    (
        address(),
        "[a-f0-9]{16}",
        0i64..4,
        0i64..3,
        ".{0,200}",
        timestamp(),
        0i64..10_000,
    )
        .prop_map(
            |(channel, id, kind, type_indicator, text, created_at, counter)| MessageEntry {
                id,
                kind,
                type_indicator,
                message: text,
                created_at,
                counter,
                channel_id: channel,
                signature: String::new(),
            },
        )
}

/// Generate up to `max` messages.
pub fn messages(max: usize) -> impl Strategy<Value = Vec<MessageEntry>> {
    prop::collection::vec(message_entry(), 0..=max)
}

/// Sign `message` as a root entry of the channel log `channel`.
pub fn message_entry_signed(identity: &Identity, channel: &str, message: &MessageEntry) -> Entry {
    let payload = encode_payload(message).unwrap_or_default();
    EntryBuilder::new(LogAddress::derive(LogKind::Channel, channel))
        .timestamp(message.created_at)
        .payload(payload)
        .sign(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::{decode_payload, validate_entry};

    proptest! {
        #[test]
        fn test_signed_message_entries_validate(
            seed in any::<[u8; 32]>(),
            channel in address(),
            msg in message_entry(),
        ) {
            let identity = Identity::from_seed(&seed);
            let entry = message_entry_signed(&identity, &channel, &msg);

            prop_assert!(validate_entry(&entry, &LogAddress::derive(LogKind::Channel, &channel)).is_ok());
            prop_assert_eq!(decode_payload::<MessageEntry>(&entry.payload).unwrap(), msg);
        }

        #[test]
        fn test_entry_id_unique_with_different_message(
            seed in any::<[u8; 32]>(),
            m1 in message_entry(),
            m2 in message_entry(),
        ) {
            prop_assume!(m1 != m2);
            let identity = Identity::from_seed(&seed);

            let e1 = message_entry_signed(&identity, "general", &m1);
            let e2 = message_entry_signed(&identity, "general", &m2);
            prop_assert_ne!(e1.compute_id(), e2.compute_id());
        }
    }
}
