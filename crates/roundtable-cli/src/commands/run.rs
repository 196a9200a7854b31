use anyhow::Result;
use std::path::PathBuf;

use roundtable::rooms::RoomKind;
use roundtable::settings::Settings;

pub async fn execute(
    settings: &Settings,
    room: RoomKind,
    text: String,
    report_file: Option<PathBuf>,
) -> Result<()> {
    // Run is a single headless turn of a session
    let mut session = super::session::build_session(settings, room, report_file)?;
    session.headless_start(&text).await
}
