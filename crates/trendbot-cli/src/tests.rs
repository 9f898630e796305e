use super::*;

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["trendbot"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
    assert!(!cli.json);
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["trendbot", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["trendbot", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn collect_without_filter_sweeps_everything() {
    let cli = Cli::try_parse_from(["trendbot", "collect"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Collect { ref sources, limit: None }) if sources.is_empty()
    ));
}

#[test]
fn collect_accepts_a_source_list_and_limit() {
    let cli = Cli::try_parse_from([
        "trendbot",
        "collect",
        "--source",
        "github,hackernews",
        "--limit",
        "10",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Collect { ref sources, limit: Some(10) })
            if sources == &[Source::Github, Source::Hackernews]
    ));
}

#[test]
fn collect_rejects_unknown_source() {
    assert!(Cli::try_parse_from(["trendbot", "collect", "--source", "myspace"]).is_err());
}

#[test]
fn analyze_hours_back_is_optional() {
    let cli = Cli::try_parse_from(["trendbot", "analyze"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Analyze { hours_back: None })
    ));

    let cli = Cli::try_parse_from(["trendbot", "analyze", "--hours-back", "6"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Analyze {
            hours_back: Some(6)
        })
    ));
}

#[test]
fn run_now_parses_job_name() {
    let cli = Cli::try_parse_from(["trendbot", "run-now", "publishing"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::RunNow {
            job: JobName::Publishing
        })
    ));
    assert!(Cli::try_parse_from(["trendbot", "run-now", "lunch"]).is_err());
}

#[test]
fn json_flag_is_global() {
    let cli = Cli::try_parse_from(["trendbot", "status", "--json"]).unwrap();
    assert!(cli.json);
    assert!(matches!(cli.command, Some(Commands::Status)));
}

#[test]
fn cleanup_days_override() {
    let cli = Cli::try_parse_from(["trendbot", "cleanup", "--days", "7"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Cleanup { days: Some(7) })
    ));
}
