use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, IntoStaticStr,
)]
pub enum ActionKind {
    Melee,
    Ranged,
    Spell,
    Ability,
    Heal,
    Defeat,
}

impl ActionKind {
    /// Verb phrase joining actor and target in the message text.
    pub fn verb(&self) -> &'static str {
        match self {
            ActionKind::Melee => "hits",
            ActionKind::Ranged => "shoots",
            ActionKind::Spell => "casts a spell on",
            ActionKind::Ability => "uses an ability on",
            ActionKind::Heal => "heals",
            ActionKind::Defeat => "defeats",
        }
    }

    pub fn deals_damage(&self) -> bool {
        matches!(
            self,
            ActionKind::Melee | ActionKind::Ranged | ActionKind::Spell | ActionKind::Ability
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{}", name)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChatChannel {
    Say,
    Shout,
    Tell,
    Party,
    Linkshell,
    Emote,
}

/// Decoded content of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Action {
        actor: String,
        target: String,
        action: ActionKind,
        amount: Option<u32>,
    },
    Chat {
        channel: ChatChannel,
        speaker: String,
        text: String,
    },
    StatusChange {
        target: String,
        effect: String,
        gained: bool,
    },
    System {
        code: u16,
        text: String,
    },
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Action,
    Chat,
    StatusChange,
    System,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{}", name)
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Action { .. } => PayloadKind::Action,
            Payload::Chat { .. } => PayloadKind::Chat,
            Payload::StatusChange { .. } => PayloadKind::StatusChange,
            Payload::System { .. } => PayloadKind::System,
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, Payload::Chat { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_chat_channel_strings() {
        assert_eq!(ChatChannel::Linkshell.to_string(), "linkshell");
        assert_eq!(ChatChannel::from_str("tell").unwrap(), ChatChannel::Tell);
        assert!(ChatChannel::from_str("yell").is_err());
    }

    #[test]
    fn test_payload_kind() {
        let payload = Payload::StatusChange {
            target: "Alice".to_string(),
            effect: "Protect".to_string(),
            gained: true,
        };
        assert_eq!(payload.kind(), PayloadKind::StatusChange);
        assert_eq!(payload.kind().to_string(), "StatusChange");
        assert!(!payload.is_chat());
    }

    #[test]
    fn test_payload_json_shape() {
        let payload = Payload::Action {
            actor: "Alice".to_string(),
            target: "Goblin".to_string(),
            action: ActionKind::Melee,
            amount: Some(45),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "action");
        assert_eq!(json["action"], "Melee");
        assert_eq!(json["amount"], 45);
    }
}
