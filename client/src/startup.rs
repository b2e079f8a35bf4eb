use std::io::Write;

use tracing::{event, instrument, Level};

use crate::{
    cli::local_target,
    configuration::Settings,
    error::Error,
    local::probe_local_service,
    reporter::report,
    tunnel::{Cloudflared, Provisioner},
};

pub struct Application {
    provisioner: Box<dyn Provisioner>,
    probe: bool,
}

impl Application {
    /// Builds the application around a `cloudflared` quick tunnel. NOTE - This does not
    /// request a tunnel. Use `run_until_stopped()` to do so.
    pub fn build(settings: &Settings) -> Self {
        Self::with_provisioner(Box::new(Cloudflared::new(&settings.cloudflared)), settings.probe)
    }

    pub fn with_provisioner(provisioner: Box<dyn Provisioner>, probe: bool) -> Self {
        Self { provisioner, probe }
    }

    /// Exposes `localhost:<port>` through a single tunnel request, reporting
    /// the public URL and then the connection to `out`. Runs until the
    /// collaborator exits; there is no cancellation of a pending request.
    #[instrument(name = "run_until_stopped", skip(self, out), fields(provisioner = self.provisioner.name()))]
    pub async fn run_until_stopped<W: Write + Send>(
        &self,
        port: u16,
        out: &mut W,
    ) -> Result<(), Error> {
        let target = local_target(port);

        if self.probe {
            match probe_local_service(&target).await {
                Ok(status) => event!(Level::INFO, "Local service answered with {}", status),
                Err(err) => event!(Level::WARN, "{}", err),
            }
        }

        let mut session = self.provisioner.provision(&target).await?;

        report(&mut session, out).await?;

        session.closed().await;
        event!(Level::INFO, "Tunnel to {} closed", session.target());

        Ok(())
    }
}
