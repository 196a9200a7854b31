use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use roundtable::logging;
use roundtable::rooms::RoomKind;
use roundtable::settings::Settings;

mod commands;
mod prompt;
mod session;

use session::APOLOGY;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sit down at the roundtable and discuss interactively
    #[command(about = "Start an interactive session in a room")]
    Session {
        /// Which preset room to use (see `roundtable rooms`)
        #[arg(short, long, default_value_t = RoomKind::default())]
        room: RoomKind,

        /// Save the transcript as JSON lines (`--report=FILE`); without a path a
        /// file is created under ~/.config/roundtable/reports
        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        report: Option<Option<PathBuf>>,
    },

    /// Ask the room a single question and exit
    #[command(about = "Run one headless turn")]
    Run {
        #[arg(short, long, default_value_t = RoomKind::default())]
        room: RoomKind,

        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        report: Option<Option<PathBuf>>,

        /// The question for the room
        text: String,
    },

    /// List the preset rooms
    Rooms,

    /// Display the current version
    Version,
}

/// A bare `--report` becomes an empty path, which picks the default report file
fn report_file(report: Option<Option<PathBuf>>) -> Option<PathBuf> {
    report.map(Option::unwrap_or_default)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new()?;
    logging::init(settings.log_level);
    tracing::debug!(
        project = settings.project_name(),
        model = settings.llm_model(),
        "settings loaded"
    );

    let result = match cli.command {
        Some(Command::Session { room, report }) => {
            commands::session::execute(&settings, room, report_file(report)).await
        }
        Some(Command::Run { room, report, text }) => {
            commands::run::execute(&settings, room, text, report_file(report)).await
        }
        Some(Command::Rooms) => commands::rooms::execute().await,
        Some(Command::Version) => commands::version::execute().await,
        None => {
            println!("No command provided - Run 'roundtable help' to see available commands.");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("{}", APOLOGY);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command.unwrap()
    }

    #[test]
    fn test_bare_report_flag_leaves_the_question_alone() {
        match parse(&["roundtable", "run", "--report", "What is new?"]) {
            Command::Run { report, text, .. } => {
                assert_eq!(report, Some(None));
                assert_eq!(report_file(report), Some(PathBuf::new()));
                assert_eq!(text, "What is new?");
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_report_path_needs_equals() {
        match parse(&["roundtable", "run", "--room", "coding", "--report=out.jsonl", "hi"]) {
            Command::Run { room, report, text } => {
                assert_eq!(room, RoomKind::Coding);
                assert_eq!(report, Some(Some(PathBuf::from("out.jsonl"))));
                assert_eq!(text, "hi");
            }
            _ => panic!("Expected run command"),
        }

        match parse(&["roundtable", "session"]) {
            Command::Session { room, report } => {
                assert_eq!(room, RoomKind::Basic);
                assert_eq!(report, None);
            }
            _ => panic!("Expected session command"),
        }
    }
}
