//! Console output: applied records and operation progress.

use std::io::Write as _;
use std::sync::mpsc::Receiver;

use anyhow::{Result, anyhow};
use brawlog_core::record::ChatChannel;
use brawlog_core::{
    ChangeDescriptor, ChangePhase, EventRecord, Payload, ResetReason, StatusEvent, StatusTrigger,
    StoreObserver, StoreView,
};
use owo_colors::OwoColorize;

/// Prints each record as it is applied.
pub struct ConsoleObserver;

impl StoreObserver for ConsoleObserver {
    fn name(&self) -> &str {
        "console"
    }

    fn on_change(
        &mut self,
        phase: ChangePhase,
        change: &ChangeDescriptor,
        view: &StoreView<'_>,
    ) -> anyhow::Result<()> {
        if phase != ChangePhase::After {
            return Ok(());
        }
        match change {
            ChangeDescriptor::Record { .. } => {
                if let Some(record) = view.last() {
                    println!("{}", format_record(record));
                }
            }
            ChangeDescriptor::Reset {
                reason: ResetReason::Restored,
            } => println!("{}", "Store rolled back".yellow()),
            _ => {}
        }
        Ok(())
    }
}

pub fn format_record(record: &EventRecord) -> String {
    let time = record.timestamp.format("%H:%M:%S").dimmed().to_string();
    let body = match &record.payload {
        Payload::Action {
            actor,
            target,
            action,
            amount,
        } => {
            let amount = amount
                .map(|n| format!(" {}", n.bold()))
                .unwrap_or_default();
            format!("{} {} {}{}", actor.cyan(), action.verb(), target, amount)
        }
        Payload::Chat {
            channel,
            speaker,
            text,
        } => format!("[{}] {}: {}", colored_channel(*channel), speaker.bold(), text),
        Payload::StatusChange {
            target,
            effect,
            gained,
        } => {
            let sign = if *gained {
                "+".green().to_string()
            } else {
                "-".red().to_string()
            };
            format!("{} {}{}", target, sign, effect)
        }
        Payload::System { text, .. } => text.dimmed().to_string(),
    };
    format!("{} {}", time, body)
}

fn colored_channel(channel: ChatChannel) -> String {
    let name = channel.to_string();
    match channel {
        ChatChannel::Party => name.cyan().to_string(),
        ChatChannel::Linkshell => name.green().to_string(),
        ChatChannel::Tell => name.magenta().to_string(),
        ChatChannel::Shout => name.yellow().to_string(),
        ChatChannel::Say | ChatChannel::Emote => name,
    }
}

/// Renders the monitor's status feed on stderr.
#[derive(Default)]
pub struct ProgressRenderer {
    quiet_records: bool,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip per-record progress lines (a `ConsoleObserver` already prints them).
    pub fn quiet_records(mut self) -> Self {
        self.quiet_records = true;
        self
    }

    /// Render events until the operation ends and return the final one.
    pub fn follow(&self, feed: &Receiver<StatusEvent>) -> Result<StatusEvent> {
        for event in feed.iter() {
            if event.is_terminal() {
                eprintln!();
                return Ok(event);
            }
            self.render(&event);
        }
        Err(anyhow!("Monitor stopped without a final status"))
    }

    fn render(&self, event: &StatusEvent) {
        let line = match event.trigger {
            StatusTrigger::Transition if event.stopping => {
                format!("{} stopping", event.operation)
            }
            StatusTrigger::Transition => format!("{} started", event.operation),
            StatusTrigger::Record if self.quiet_records => return,
            StatusTrigger::Record => match event.progress() {
                Ok((processed, total)) => format!(
                    "{} {}/{} ({}%)",
                    event.operation,
                    processed,
                    total,
                    processed * 100 / total
                ),
                Err(_) => format!("{} {} records", event.operation, event.processed_items),
            },
            StatusTrigger::Saving => match event.progress() {
                Ok((written, total)) => format!("saving {}/{}", written, total),
                Err(_) => "saving".to_string(),
            },
        };
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{}", line.dimmed());
        let _ = stderr.flush();
    }
}

/// Print the outcome of an operation; a failure becomes an error.
pub fn report(event: &StatusEvent) -> Result<()> {
    if event.completed {
        let mut summary = format!("{} records", event.processed_items);
        if event.skipped_items > 0 {
            summary.push_str(&format!(", {} skipped", event.skipped_items));
        }
        if event.warnings > 0 {
            summary.push_str(&format!(", {} warnings", event.warnings));
        }
        println!("{} {} ({})", "✓".green(), event.operation, summary);
        return Ok(());
    }

    let failure = event
        .failure
        .as_ref()
        .ok_or_else(|| anyhow!("{} ended without a result", event.operation))?;
    if event.is_cancelled() {
        println!("{} {} cancelled; changes rolled back", "✗".yellow(), event.operation);
    } else {
        println!(
            "{} {} failed after {} records; changes rolled back",
            "✗".red(),
            event.operation,
            event.processed_items
        );
    }
    if let Some(path) = &failure.reopen {
        println!("  Reopen {} to continue from the last good state", path.display());
    }
    Err(anyhow!("{}", failure.message))
}
