mod routes;
mod state;

use clap::Parser;
use roundtable::logging;
use roundtable::rooms::RoomKind;
use roundtable::settings::Settings;

/// Serve the roundtable meeting room over HTTP
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Open the meeting room in the default browser once listening
    #[arg(long)]
    open: bool,

    /// Room used when a request does not name one
    #[arg(short, long, default_value_t = RoomKind::default())]
    room: RoomKind,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new()?;
    logging::init(settings.log_level);

    let addr = settings.server.socket_addr()?;
    let state = state::AppState::new(settings, cli.room);
    let app = routes::configure(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    if cli.open {
        let url = format!("http://{}", listener.local_addr()?);
        if let Err(e) = webbrowser::open(&url) {
            tracing::warn!(error = %e, "could not open the browser, visit {} instead", url);
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}
