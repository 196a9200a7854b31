use anyhow::Result;
use console::style;
use roundtable::rooms::RoomKind;
use strum::IntoEnumIterator;

pub async fn execute() -> Result<()> {
    for kind in RoomKind::iter() {
        println!("{:<12} {}", style(kind).bold(), kind.description());
    }
    Ok(())
}
