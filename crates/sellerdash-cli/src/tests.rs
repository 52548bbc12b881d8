use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["sellerdash-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["sellerdash-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["sellerdash-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_upload_command() {
    let cli = Cli::try_parse_from([
        "sellerdash-cli",
        "upload",
        "--report-type",
        "business",
        "--submitter",
        "7",
        "exports/business.csv",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Upload {
            report_type: ReportType::Business,
            submitter: 7,
            ref path,
        }) if path == &PathBuf::from("exports/business.csv")
    ));
}

#[test]
fn upload_accepts_legacy_report_type_names() {
    let cli = Cli::try_parse_from([
        "sellerdash-cli",
        "upload",
        "--report-type",
        "Return_Report",
        "--submitter",
        "1",
        "r.csv",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Upload {
            report_type: ReportType::Returns,
            ..
        })
    ));
}

#[test]
fn upload_rejects_unknown_report_type() {
    let result = Cli::try_parse_from([
        "sellerdash-cli",
        "upload",
        "--report-type",
        "orders",
        "--submitter",
        "1",
        "x.csv",
    ]);
    assert!(result.is_err());
}

#[test]
fn upload_requires_a_path() {
    let result = Cli::try_parse_from([
        "sellerdash-cli",
        "upload",
        "--report-type",
        "business",
        "--submitter",
        "1",
    ]);
    assert!(result.is_err());
}

#[test]
fn history_limit_defaults_to_twenty() {
    let cli = Cli::try_parse_from(["sellerdash-cli", "history", "--submitter", "3"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::History {
            submitter: 3,
            limit: 20
        })
    ));
}

#[test]
fn parses_metrics_command_with_repeated_metric_flags() {
    let cli = Cli::try_parse_from([
        "sellerdash-cli",
        "metrics",
        "--report-type",
        "business",
        "--store",
        "1",
        "--from",
        "2025-01-01",
        "--to",
        "2025-01-31",
        "--metric",
        "total_revenue",
        "--metric",
        "conversion_rate",
        "--compare-previous",
    ])
    .unwrap();
    let Some(Commands::Metrics {
        report_type,
        store,
        from,
        to,
        metrics,
        compare_previous,
    }) = cli.command
    else {
        panic!("expected metrics command");
    };
    assert_eq!(report_type, ReportType::Business);
    assert_eq!(store, 1);
    assert_eq!(from, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    assert_eq!(to, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    assert_eq!(metrics, ["total_revenue", "conversion_rate"]);
    assert!(compare_previous);
}

#[test]
fn metrics_rejects_malformed_dates() {
    let result = Cli::try_parse_from([
        "sellerdash-cli",
        "metrics",
        "--report-type",
        "business",
        "--store",
        "1",
        "--from",
        "01/01/2025",
        "--to",
        "2025-01-31",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_schema_command() {
    let cli =
        Cli::try_parse_from(["sellerdash-cli", "schema", "--report-type", "inventory"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Schema {
            report_type: ReportType::Inventory
        })
    ));
}
