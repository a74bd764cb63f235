mod config;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kujenga_lessons")]
#[command(about = "Writes the plot data of the differential equations lessons as JSON", long_about = None)]
struct Cli {
    /// Lesson configuration JSON; the lesson defaults are used without it
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::LessonConfig::default(),
    };

    let report = report::build(&config)?;

    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &report).context("Failed to write the lesson report")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn config_path_is_optional() {
        let cli = Cli::try_parse_from(["kujenga_lessons"]).expect("no arguments is valid");
        assert_eq!(cli.config, None);

        let cli = Cli::try_parse_from(["kujenga_lessons", "lesson.json"]).expect("one path is valid");
        assert_eq!(cli.config, Some(PathBuf::from("lesson.json")));
    }

    #[test]
    fn help_is_not_read_as_a_config_path() {
        let err = match Cli::try_parse_from(["kujenga_lessons", "--help"]) {
            Ok(_) => panic!("--help should not parse into a config path"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(Cli::try_parse_from(["kujenga_lessons", "a.json", "b.json"]).is_err());
    }
}
