use clap::Parser;

use crate::error::Error;

/// Usage line written to stderr when no port is given.
pub const USAGE: &str = "❗ Usage: node tunnel.js <port>";

/// CLI arguments. The port is taken as a raw string so an empty value can be
/// reported the same way as a missing one.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(help = "Local port to expose e.g. '3000' targets http://localhost:3000")]
    pub port: Option<String>,
}

impl Args {
    /// Resolves the port argument. Absent and empty values are a
    /// `MissingArgument`, anything that isn't a `u16` is an `InvalidPort`.
    pub fn port(&self) -> Result<u16, Error> {
        match self.port.as_deref() {
            None | Some("") => Err(Error::MissingArgument),
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::InvalidPort(raw.to_string())),
        }
    }
}

/// The local HTTP endpoint a tunnel for `port` forwards to.
pub fn local_target(port: u16) -> String {
    format!("http://localhost:{}", port)
}
