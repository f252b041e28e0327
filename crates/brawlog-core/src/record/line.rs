//! Chat line decoding.
//!
//! Every message, whether it arrives in a live frame or inside an imported
//! file, is a single chat line of twelve comma-separated fields:
//!
//! ```text
//! Field  Content
//! ──────────────────────────────────────────────
//! 0      message code (hex)
//! 1..10  flags, colour, entity ids, length (hex)
//! 11     message text (may itself contain commas)
//! ```
//!
//! The message code selects how the text is interpreted. Text that does not
//! match the grammar of its code is kept as a `System` payload rather than
//! rejected, so only structural problems are decode errors.

use crate::error::{Error, Result};
use crate::record::{ActionKind, ChatChannel, Payload};

pub const FIELD_COUNT: usize = 12;

/// Message codes with a dedicated interpretation.
pub mod codes {
    pub const SAY: u16 = 0x01;
    pub const SHOUT: u16 = 0x02;
    pub const TELL: u16 = 0x04;
    pub const PARTY: u16 = 0x05;
    pub const LINKSHELL: u16 = 0x06;
    pub const EMOTE: u16 = 0x07;
    /// Incoming chat codes are the outgoing code with this bit set.
    pub const INCOMING_BIT: u16 = 0x08;

    pub const MELEE: u16 = 0x14;
    pub const RANGED: u16 = 0x19;
    pub const HEAL: u16 = 0x1E;
    pub const DEFEAT: u16 = 0x24;
    pub const SPELL: u16 = 0x28;
    pub const STATUS_GAINED: u16 = 0x40;
    pub const STATUS_LOST: u16 = 0x41;
    pub const ABILITY: u16 = 0x65;
}

/// Decode one chat line into its payload.
pub fn decode_line(line: &str) -> Result<Payload> {
    let line = line.trim_end_matches(['\r', '\n', '\0']);
    let fields: Vec<&str> = line.splitn(FIELD_COUNT, ',').collect();
    if fields.len() < FIELD_COUNT {
        return Err(Error::decode(
            fields.len() as u64,
            format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                fields.len()
            ),
        ));
    }

    let code = u16::from_str_radix(fields[0], 16).map_err(|e| {
        Error::decode(0, format!("invalid message code {:?}: {}", fields[0], e))
    })?;

    for (index, field) in fields.iter().enumerate().take(FIELD_COUNT - 1).skip(1) {
        if u32::from_str_radix(field, 16).is_err() {
            return Err(Error::decode(
                index as u64,
                format!("field {} is not hexadecimal: {:?}", index, field),
            ));
        }
    }

    Ok(classify(code, fields[FIELD_COUNT - 1]))
}

/// Message code of a chat line, without interpreting the text.
pub fn line_code(line: &str) -> Option<u16> {
    let (code, _) = line.split_once(',')?;
    u16::from_str_radix(code, 16).ok()
}

/// Build a well-formed chat line for the given code and text.
pub fn format_line(code: u16, text: &str) -> String {
    format!(
        "{:02x},00,00,80808080,00000000,00000000,{:04x},00,01,00,00,{}",
        code,
        text.len().min(0xFFFF),
        text
    )
}

fn classify(code: u16, text: &str) -> Payload {
    if let Some(channel) = chat_channel(code) {
        return parse_chat(channel, text);
    }

    if let Some(kind) = action_kind(code)
        && let Some(payload) = parse_action(kind, text)
    {
        return payload;
    }

    let status = match code {
        codes::STATUS_GAINED => parse_status_gained(text),
        codes::STATUS_LOST => parse_status_lost(text),
        _ => None,
    };

    status.unwrap_or_else(|| Payload::System {
        code,
        text: text.to_string(),
    })
}

fn chat_channel(code: u16) -> Option<ChatChannel> {
    if code == 0 || code > 0x0F {
        return None;
    }
    match code & !codes::INCOMING_BIT {
        codes::SAY => Some(ChatChannel::Say),
        codes::SHOUT => Some(ChatChannel::Shout),
        codes::TELL => Some(ChatChannel::Tell),
        codes::PARTY => Some(ChatChannel::Party),
        codes::LINKSHELL => Some(ChatChannel::Linkshell),
        codes::EMOTE => Some(ChatChannel::Emote),
        _ => None,
    }
}

fn action_kind(code: u16) -> Option<ActionKind> {
    match code {
        codes::MELEE => Some(ActionKind::Melee),
        codes::RANGED => Some(ActionKind::Ranged),
        codes::SPELL => Some(ActionKind::Spell),
        codes::ABILITY => Some(ActionKind::Ability),
        codes::HEAL => Some(ActionKind::Heal),
        codes::DEFEAT => Some(ActionKind::Defeat),
        _ => None,
    }
}

fn parse_chat(channel: ChatChannel, text: &str) -> Payload {
    let (speaker, message) = if channel == ChatChannel::Emote {
        text.split_once(' ').unwrap_or((text, ""))
    } else {
        text.split_once(" : ").unwrap_or(("", text))
    };

    Payload::Chat {
        channel,
        speaker: speaker.trim().to_string(),
        text: message.to_string(),
    }
}

fn parse_action(kind: ActionKind, text: &str) -> Option<Payload> {
    let body = text.trim().trim_end_matches('.');

    let (head, amount) = match body.rsplit_once(" for ") {
        Some((head, tail)) => {
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            match digits.parse::<u32>() {
                Ok(amount) => (head, Some(amount)),
                Err(_) => (body, None),
            }
        }
        None => (body, None),
    };

    let separator = format!(" {} ", kind.verb());
    let (actor, target) = head.split_once(separator.as_str())?;
    if actor.is_empty() || target.is_empty() {
        return None;
    }

    Some(Payload::Action {
        actor: strip_article(actor),
        target: strip_article(target),
        action: kind,
        amount,
    })
}

fn parse_status_gained(text: &str) -> Option<Payload> {
    let body = text.trim().trim_end_matches('.');
    let (target, effect) = body.split_once(" gains the effect of ")?;
    Some(Payload::StatusChange {
        target: strip_article(target),
        effect: effect.to_string(),
        gained: true,
    })
}

fn parse_status_lost(text: &str) -> Option<Payload> {
    let body = text.trim().trim_end_matches('.');
    let body = body.strip_suffix(" effect wears off")?;
    let (target, effect) = body.split_once("'s ")?;
    Some(Payload::StatusChange {
        target: strip_article(target),
        effect: effect.to_string(),
        gained: false,
    })
}

fn strip_article(name: &str) -> String {
    let name = name.trim();
    name.strip_prefix("the ")
        .or_else(|| name.strip_prefix("The "))
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_melee() {
        let line = format_line(codes::MELEE, "Alice hits the Goblin Smithy for 45 points of damage.");
        let payload = decode_line(&line).unwrap();
        assert_eq!(
            payload,
            Payload::Action {
                actor: "Alice".to_string(),
                target: "Goblin Smithy".to_string(),
                action: ActionKind::Melee,
                amount: Some(45),
            }
        );
    }

    #[test]
    fn test_decode_defeat_without_amount() {
        let line = format_line(codes::DEFEAT, "Alice defeats the Goblin.");
        match decode_line(&line).unwrap() {
            Payload::Action { action, amount, .. } => {
                assert_eq!(action, ActionKind::Defeat);
                assert_eq!(amount, None);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_chat_with_commas() {
        let line = format_line(codes::PARTY | codes::INCOMING_BIT, "Bob : pull, then rest");
        assert_eq!(
            decode_line(&line).unwrap(),
            Payload::Chat {
                channel: ChatChannel::Party,
                speaker: "Bob".to_string(),
                text: "pull, then rest".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_emote() {
        let line = format_line(codes::EMOTE, "Alice waves.");
        match decode_line(&line).unwrap() {
            Payload::Chat {
                channel, speaker, ..
            } => {
                assert_eq!(channel, ChatChannel::Emote);
                assert_eq!(speaker, "Alice");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_status_changes() {
        let gained = format_line(codes::STATUS_GAINED, "Alice gains the effect of Protect.");
        let lost = format_line(codes::STATUS_LOST, "Alice's Protect effect wears off.");

        assert_eq!(
            decode_line(&gained).unwrap(),
            Payload::StatusChange {
                target: "Alice".to_string(),
                effect: "Protect".to_string(),
                gained: true,
            }
        );
        assert_eq!(
            decode_line(&lost).unwrap(),
            Payload::StatusChange {
                target: "Alice".to_string(),
                effect: "Protect".to_string(),
                gained: false,
            }
        );
    }

    #[test]
    fn test_unrecognised_text_falls_back_to_system() {
        let line = format_line(codes::MELEE, "Something odd happened.");
        assert_eq!(
            decode_line(&line).unwrap(),
            Payload::System {
                code: codes::MELEE,
                text: "Something odd happened.".to_string(),
            }
        );
    }

    #[test]
    fn test_too_few_fields() {
        let result = decode_line("14,00,00,Alice hits Bob");
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn test_non_hex_code() {
        let line = format_line(codes::SAY, "hi").replacen("01", "zz", 1);
        assert!(decode_line(&line).is_err());
    }

    #[test]
    fn test_line_code() {
        let line = format_line(codes::ABILITY, "Alice uses an ability on Goblin.");
        assert_eq!(line_code(&line), Some(codes::ABILITY));
        assert_eq!(line_code("nonsense"), None);
    }
}
