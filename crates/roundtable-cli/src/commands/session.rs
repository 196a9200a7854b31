use anyhow::Result;
use std::path::PathBuf;

use crate::prompt::cliclack::CliclackPrompt;
use crate::session::{report, Session};
use roundtable::rooms::{build_room, RoomKind};
use roundtable::settings::Settings;

/// Build a session in the given room; an empty report path picks a file under
/// `~/.config/roundtable/reports`
pub fn build_session<'a>(
    settings: &Settings,
    room: RoomKind,
    report_file: Option<PathBuf>,
) -> Result<Session<'a>> {
    let room = build_room(room, settings)?;
    let report_file = match report_file {
        Some(path) if path.as_os_str().is_empty() => Some(report::default_report_file()?),
        other => other,
    };
    Ok(Session::new(
        room,
        Box::new(CliclackPrompt::new()),
        report_file,
    ))
}

pub async fn execute(settings: &Settings, room: RoomKind, report_file: Option<PathBuf>) -> Result<()> {
    let mut session = build_session(settings, room, report_file)?;
    session.start().await
}
