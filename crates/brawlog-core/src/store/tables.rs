//! Aggregates derived from applied records.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::record::{ActionKind, ChatChannel, EventRecord, Payload};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActorTotals {
    pub actions: u64,
    pub damage_dealt: u64,
    pub damage_taken: u64,
    pub healing_done: u64,
    pub defeats: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tables {
    actors: BTreeMap<String, ActorTotals>,
    chat: BTreeMap<ChatChannel, u64>,
    /// target -> effects currently on it
    effects: BTreeMap<String, BTreeSet<String>>,
    system_messages: u64,
}

impl Tables {
    pub fn rebuild<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut tables = Self::default();
        for record in records {
            tables.apply(record);
        }
        tables
    }

    pub fn apply(&mut self, record: &EventRecord) {
        match &record.payload {
            Payload::Action {
                actor,
                target,
                action,
                amount,
            } => {
                let amount = amount.unwrap_or(0) as u64;
                let totals = self.actors.entry(actor.clone()).or_default();
                totals.actions += 1;
                match action {
                    ActionKind::Heal => totals.healing_done += amount,
                    ActionKind::Defeat => totals.defeats += 1,
                    kind if kind.deals_damage() => {
                        totals.damage_dealt += amount;
                        self.actors.entry(target.clone()).or_default().damage_taken += amount;
                    }
                    _ => {}
                }
                if *action == ActionKind::Defeat {
                    self.effects.remove(target);
                }
            }
            Payload::Chat { channel, .. } => {
                *self.chat.entry(*channel).or_default() += 1;
            }
            Payload::StatusChange {
                target,
                effect,
                gained,
            } => {
                if *gained {
                    self.effects
                        .entry(target.clone())
                        .or_default()
                        .insert(effect.clone());
                } else if let Some(active) = self.effects.get_mut(target) {
                    active.remove(effect);
                    if active.is_empty() {
                        self.effects.remove(target);
                    }
                }
            }
            Payload::System { .. } => self.system_messages += 1,
        }
    }

    pub fn clear_chat(&mut self) {
        self.chat.clear();
    }

    pub fn actor(&self, name: &str) -> Option<&ActorTotals> {
        self.actors.get(name)
    }

    /// Actors in name order.
    pub fn actors(&self) -> impl Iterator<Item = (&str, &ActorTotals)> {
        self.actors.iter().map(|(name, totals)| (name.as_str(), totals))
    }

    pub fn chat_count(&self, channel: ChatChannel) -> u64 {
        self.chat.get(&channel).copied().unwrap_or(0)
    }

    pub fn chat_total(&self) -> u64 {
        self.chat.values().sum()
    }

    pub fn active_effects(&self, target: &str) -> Vec<&str> {
        self.effects
            .get(target)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn system_messages(&self) -> u64 {
        self.system_messages
    }
}
