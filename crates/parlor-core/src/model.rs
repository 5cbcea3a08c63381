//! Chat records stored in logs and registries.
//!
//! Field names on the wire follow the client protocol (`camelCase`, `r` for
//! the message counter) so snapshots can be handed to the delivery sink
//! without translation.

use serde::{Deserialize, Serialize};

/// Channel key material. Channels without keys are not listed publicly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ivk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<String>,
}

/// Channel metadata as supplied by a caller or a seed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<ChannelKeys>,
}

impl ChannelInfo {
    /// Minimal metadata for a channel known only by its address.
    pub fn for_address(address: &str) -> Self {
        Self {
            address: address.to_string(),
            name: address.to_string(),
            description: String::new(),
            owner: String::new(),
            timestamp: 0,
            keys: None,
        }
    }
}

/// Channel registry value: the metadata plus the locator of the channel log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub address: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<ChannelKeys>,
    pub log_address: String,
}

impl ChannelRecord {
    pub fn new(info: ChannelInfo, log_address: String) -> Self {
        Self {
            address: info.address,
            name: info.name,
            description: info.description,
            owner: info.owner,
            timestamp: info.timestamp,
            keys: info.keys,
            log_address,
        }
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            address: self.address.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            owner: self.owner.clone(),
            timestamp: self.timestamp,
            keys: self.keys.clone(),
        }
    }

    /// Whether the record carries key material and is publicly listed.
    pub fn has_keys(&self) -> bool {
        self.keys.is_some()
    }
}

/// A chat message appended to a channel or conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: i64,
    pub type_indicator: i64,
    pub message: String,
    pub created_at: i64,
    #[serde(rename = "r")]
    pub counter: i64,
    pub channel_id: String,
    pub signature: String,
}

/// Direct-message users registry value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub half_key: String,
}

/// Conversation registry value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub address: String,
    pub encrypted_secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_names() {
        let msg = MessageEntry {
            id: "m1".into(),
            kind: 1,
            type_indicator: 0,
            message: "hello".into(),
            created_at: 1_600_000_000,
            counter: 3,
            channel_id: "general".into(),
            signature: "sig".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["typeIndicator"], 0);
        assert_eq!(json["createdAt"], 1_600_000_000);
        assert_eq!(json["r"], 3);
        assert_eq!(json["channelId"], "general");
    }

    #[test]
    fn test_channel_info_defaults() {
        let info: ChannelInfo =
            serde_json::from_str(r#"{"address":"general","name":"general"}"#).unwrap();
        assert_eq!(info.description, "");
        assert!(info.keys.is_none());

        let record = ChannelRecord::new(info.clone(), "/parlor/00".into());
        assert!(!record.has_keys());
        assert_eq!(record.info(), info);
    }
}
