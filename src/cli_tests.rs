use clap::Parser;

use super::{Cli, Commands};

fn parse(args: &[&str]) -> Cli {
    Cli::parse_from(args)
}

#[test]
fn new_parses_positionals_and_options() {
    let cli = parse(&[
        "mile",
        "new",
        "Receiver installed",
        "20/06/01",
        "-o",
        "ito",
        "-s",
        "none",
    ]);
    assert_eq!(cli.entity, "milestone");
    match cli.command {
        Commands::New(args) => {
            assert_eq!(args.description, "Receiver installed");
            assert_eq!(args.value, "20/06/01");
            assert_eq!(args.owner.as_deref(), Some("ito"));
            assert_eq!(args.status.as_deref(), Some("none"));
            assert!(!args.json);
        }
        other => panic!("expected New, got {:?}", other),
    }
}

#[test]
fn entity_flag_selects_the_database() {
    let cli = parse(&["mile", "-e", "task", "ls"]);
    assert_eq!(cli.entity, "task");
}

#[test]
fn update_collects_repeatable_field_changes() {
    let cli = parse(&[
        "mile",
        "update",
        "receiver",
        "-f",
        "value=20/07/01",
        "-f",
        "status=moved",
        "-m",
        "slipped",
    ]);
    match cli.command {
        Commands::Update(args) => {
            assert_eq!(args.name, "receiver");
            assert_eq!(args.fields, ["value=20/07/01", "status=moved"]);
            assert_eq!(args.note, "slipped");
        }
        other => panic!("expected Update, got {:?}", other),
    }
}

#[test]
fn ls_parses_filters_and_time_window() {
    let cli = parse(&[
        "mile",
        "ls",
        "-s",
        "late",
        "-s",
        "none",
        "-o",
        "ito",
        "--date-field",
        "updated",
        "--after",
        "20/01/01",
        "--sort",
        "value",
        "-j",
    ]);
    match cli.command {
        Commands::Ls(args) => {
            assert_eq!(args.filter.status, ["late", "none"]);
            assert_eq!(args.filter.owner, ["ito"]);
            assert_eq!(args.time.date_field.as_deref(), Some("updated"));
            assert_eq!(args.time.after.as_deref(), Some("20/01/01"));
            assert_eq!(args.sort.as_deref(), Some("value"));
            assert!(args.json);
        }
        other => panic!("expected Ls, got {:?}", other),
    }
}

#[test]
fn find_defaults_to_weak_strength() {
    let cli = parse(&["mile", "find", "antenna"]);
    match cli.command {
        Commands::Find(args) => {
            assert_eq!(args.query, "antenna");
            assert_eq!(args.strength, "weak");
            assert!(args.field.is_none());
        }
        other => panic!("expected Find, got {:?}", other),
    }
}

#[test]
fn trace_defaults_tracetype_to_current_entity() {
    let cli = parse(&["mile", "trace", "receiver", "dishaligned"]);
    match cli.command {
        Commands::Trace(args) => {
            assert_eq!(args.name, "receiver");
            assert_eq!(args.target, "dishaligned");
            assert!(args.tracetype.is_none());
        }
        other => panic!("expected Trace, got {:?}", other),
    }
}

#[test]
fn timeline_and_export_parse() {
    let cli = parse(&["mile", "timeline", "--curve", "-t", "integration"]);
    match cli.command {
        Commands::Timeline(args) => {
            assert!(args.curve);
            assert_eq!(args.filter.dtype, ["integration"]);
        }
        other => panic!("expected Timeline, got {:?}", other),
    }

    let cli = parse(&["mile", "export", "csv", "-s", "complete"]);
    match cli.command {
        Commands::Export(args) => {
            assert_eq!(args.format, "csv");
            assert_eq!(args.filter.status, ["complete"]);
        }
        other => panic!("expected Export, got {:?}", other),
    }
}

#[test]
fn filter_args_only_override_populated_fields() {
    let cli = parse(&["mile", "ls", "-s", "late"]);
    match cli.command {
        Commands::Ls(args) => {
            let filter = args.filter.to_filter();
            assert_eq!(filter.status, ["late"]);
            assert_eq!(filter.dtype, ["all"]);
            assert_eq!(filter.id, ["-1"]);
        }
        other => panic!("expected Ls, got {:?}", other),
    }
}
