/*!
This crate is the `tunnel` CLI. It exposes a service running on your local machine through a
Cloudflare quick tunnel, printing the public URL and then the tunnel connection once the
`cloudflared` binary reports them.

The only argument is the local port to expose:

```bash
cargo run -- 3000
```

`cloudflared` must be installed. Its location, the local probe and logging are configured through
an optional `configuration/settings.yaml` or `TUNNEL_*` environment variables.
*/

use std::process::ExitCode;

use clap::Parser;

use client::{
    cli::{Args, USAGE},
    configuration::get_configuration,
    error::Error,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber, MultiWriter},
};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let port = match args.port() {
        Ok(port) => port,
        Err(Error::MissingArgument) => {
            eprintln!("{}", USAGE);
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => {
            eprintln!("❗ {}", err);
            return Ok(ExitCode::FAILURE);
        }
    };

    let settings = get_configuration()?;

    // Setup and initialise the logger
    let sink = MultiWriter::new(settings.log.file.as_deref())?;
    let subscriber = get_subscriber(String::from("tunnel"), settings.log.level.clone(), sink);
    init_subscriber(subscriber);

    let application = Application::build(&settings);

    application
        .run_until_stopped(port, &mut std::io::stdout())
        .await?;

    Ok(ExitCode::SUCCESS)
}
