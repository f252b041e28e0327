//! CLI argument parsing tests.
//!
//! These tests verify that command-line arguments are parsed correctly
//! without actually executing the commands.

#[path = "../src/cli.rs"]
#[allow(dead_code)]
mod cli;

use std::path::PathBuf;

use brawlog_core::ImportSourceType;
use clap::Parser;
use cli::{Args, Command};

fn parse(args: &[&str]) -> Result<Args, clap::Error> {
    Args::try_parse_from(std::iter::once("brawlog").chain(args.iter().copied()))
}

#[test]
fn test_capture_defaults() {
    let args = parse(&["capture"]).unwrap();
    assert_eq!(args.config, PathBuf::from("brawlog.toml"));
    match args.command {
        Command::Capture { log, output } => {
            assert!(log.is_none());
            assert!(output.is_none());
        }
        _ => panic!("Expected Capture command"),
    }
}

#[test]
fn test_capture_from_log() {
    let args = parse(&["capture", "--log", "cap.bin", "-o", "fight.blog"]).unwrap();
    match args.command {
        Command::Capture { log, output } => {
            assert_eq!(log, Some(PathBuf::from("cap.bin")));
            assert_eq!(output, Some(PathBuf::from("fight.blog")));
        }
        _ => panic!("Expected Capture command"),
    }
}

#[test]
fn test_continue_requires_store() {
    assert!(parse(&["continue"]).is_err());
    let args = parse(&["continue", "fight.blog"]).unwrap();
    assert!(matches!(args.command, Command::Continue { log: None, .. }));
}

#[test]
fn test_import_format_names() {
    let args = parse(&["import", "old.dat", "new.blog", "--format", "dvs-parse"]).unwrap();
    match args.command {
        Command::Import {
            format, upgrade, ..
        } => {
            assert_eq!(format, Some(ImportSourceType::DvsParse));
            assert!(!upgrade.upgrade_timestamps);
        }
        _ => panic!("Expected Import command"),
    }

    assert!(parse(&["import", "a", "b", "--format", "csv"]).is_err());
}

#[test]
fn test_upgrade_with_negative_offset() {
    let args = parse(&[
        "reparse",
        "old.blog",
        "new.blog",
        "--upgrade-timestamps",
        "--utc-offset",
        "-300",
    ])
    .unwrap();
    match args.command {
        Command::Reparse { upgrade, .. } => {
            assert!(upgrade.upgrade_timestamps);
            assert_eq!(upgrade.utc_offset, Some(-300));
        }
        _ => panic!("Expected Reparse command"),
    }
}

#[test]
fn test_utc_offset_requires_upgrade_flag() {
    assert!(parse(&["reparse", "a.blog", "b.blog", "--utc-offset", "540"]).is_err());
}

#[test]
fn test_scan_json_flag() {
    let args = parse(&["scan", "--json"]).unwrap();
    assert!(matches!(args.command, Command::Scan { json: true, log: None }));
}

#[test]
fn test_summary_and_global_config() {
    let args = parse(&["--config", "alt.toml", "summary", "fight.blog"]).unwrap();
    assert_eq!(args.config, PathBuf::from("alt.toml"));
    assert!(matches!(args.command, Command::Summary { json: false, .. }));
}

#[test]
fn test_missing_subcommand_is_error() {
    assert!(parse(&[]).is_err());
}
