//! Summary command implementation.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use brawlog_core::record::ChatChannel;
use brawlog_core::Store;
use owo_colors::OwoColorize;
use serde_json::json;
use strum::IntoEnumIterator;

/// Run the summary command
pub fn run(path: &Path, json: bool) -> Result<()> {
    let store = Store::open(path)?;
    let view = store.view();
    let tables = view.tables();

    let mut sequences: BTreeMap<String, u64> = BTreeMap::new();
    for record in view.records() {
        sequences.insert(record.provenance.to_string(), record.sequence);
    }
    let chat: BTreeMap<String, u64> = ChatChannel::iter()
        .map(|channel| (channel.to_string(), tables.chat_count(channel)))
        .filter(|(_, count)| *count > 0)
        .collect();

    if json {
        let actors: BTreeMap<&str, _> = tables.actors().collect();
        let summary = json!({
            "path": path,
            "records": view.len(),
            "origin": store.origin(),
            "last_sequence": sequences,
            "actors": actors,
            "chat": chat,
            "system_messages": tables.system_messages(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", path.display().bold());
    println!("  Records : {}", view.len());
    if let Some(origin) = store.origin() {
        println!("  Source  : {}", origin);
    }
    for (provenance, sequence) in &sequences {
        println!("  Last #  : {} {}", provenance, sequence);
    }
    if let Some(first) = view.records().first() {
        println!("  From    : {}", first.timestamp);
    }
    if let Some(last) = view.last() {
        println!("  To      : {}", last.timestamp);
    }

    let mut actors: Vec<_> = tables.actors().collect();
    actors.sort_by(|a, b| b.1.damage_dealt.cmp(&a.1.damage_dealt).then(a.0.cmp(b.0)));
    if !actors.is_empty() {
        println!();
        println!(
            "  {:<20} {:>8} {:>10} {:>10} {:>10} {:>8}",
            "Actor", "Actions", "Dealt", "Taken", "Healed", "Defeats"
        );
        for (name, totals) in actors {
            let effects = tables.active_effects(name);
            println!(
                "  {:<20} {:>8} {:>10} {:>10} {:>10} {:>8}{}",
                name,
                totals.actions,
                totals.damage_dealt,
                totals.damage_taken,
                totals.healing_done,
                totals.defeats,
                if effects.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", effects.join(", ")).dimmed().to_string()
                }
            );
        }
    }

    if !chat.is_empty() {
        println!();
        for (channel, count) in &chat {
            println!("  {:<10} {}", channel, count);
        }
    }
    println!("  System messages: {}", tables.system_messages());
    Ok(())
}
