use std::io::Write;

use tracing::instrument;

use crate::{error::Error, tunnel::TunnelSession};

pub const LINK_LABEL: &str = "🔗 LINK:";
pub const CONNECTED_LABEL: &str = "✅ CONNECTED:";

/// Writes the tunnel's public URL and then its connection details, one line
/// each, as soon as the session observes them. Neither wait has a timeout.
#[instrument(name = "report", skip(session, out), fields(target = %session.target()))]
pub async fn report<W: Write + Send>(session: &mut TunnelSession, out: &mut W) -> Result<(), Error> {
    let url = session.url_assigned().await?;
    writeln!(out, "{} {}", LINK_LABEL, url)?;
    out.flush()?;

    let connection = session.connected().await?;
    writeln!(out, "{} {}", CONNECTED_LABEL, connection)?;
    out.flush()?;

    Ok(())
}
