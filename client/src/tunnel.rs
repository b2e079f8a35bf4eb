use std::process::Stdio;

use async_trait::async_trait;
use protocol::{AssignedUrl, Connection, LogLineProtocol, TunnelEvent};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader, Lines},
    process::{Child, Command},
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{event, instrument, Level};

use crate::{configuration::CloudflaredSettings, error::Error};

/// Where a session is in its lifecycle. There is no way back and no failure
/// state: a collaborator that never emits leaves the session pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    UrlAssigned,
    Connected,
}

/// A handle on one outbound tunnel request. The caller awaits the
/// `url-assigned` and `connected` notifications through it.
pub struct TunnelSession {
    target: String,
    state: SessionState,
    url: Option<AssignedUrl>,
    connection: Option<Connection>,
    url_rx: oneshot::Receiver<AssignedUrl>,
    connected_rx: oneshot::Receiver<Connection>,
    closed_rx: oneshot::Receiver<()>,
    // Task driving the collaborator, aborted when the session is dropped.
    task: Option<JoinHandle<()>>,
}

/// The collaborator's side of a session. Each event is delivered at most once,
/// and dropping the notifier marks the session as closed.
pub struct SessionNotifier {
    url_tx: Option<oneshot::Sender<AssignedUrl>>,
    connected_tx: Option<oneshot::Sender<Connection>>,
    _closed_tx: oneshot::Sender<()>,
}

impl TunnelSession {
    /// Creates a pending session for `target` along with the notifier that
    /// resolves it.
    pub fn new(target: impl Into<String>) -> (Self, SessionNotifier) {
        let (url_tx, url_rx) = oneshot::channel();
        let (connected_tx, connected_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        let session = Self {
            target: target.into(),
            state: SessionState::Init,
            url: None,
            connection: None,
            url_rx,
            connected_rx,
            closed_rx,
            task: None,
        };

        let notifier = SessionNotifier {
            url_tx: Some(url_tx),
            connected_tx: Some(connected_tx),
            _closed_tx: closed_tx,
        };

        (session, notifier)
    }

    /// Ties the lifetime of a background task to the session.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Waits for the public URL. There is no timeout: if the collaborator stays
    /// alive without assigning one, this never resolves.
    pub async fn url_assigned(&mut self) -> Result<AssignedUrl, Error> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let url = (&mut self.url_rx)
            .await
            .map_err(|_| Error::CollaboratorClosed(TunnelEvent::URL_ASSIGNED))?;

        self.url = Some(url.clone());
        self.state = SessionState::UrlAssigned;

        Ok(url)
    }

    /// Waits for the tunnel connection. The URL is always awaited first, so a
    /// session never moves to `Connected` without passing `UrlAssigned`.
    pub async fn connected(&mut self) -> Result<Connection, Error> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }

        self.url_assigned().await?;

        let connection = (&mut self.connected_rx)
            .await
            .map_err(|_| Error::CollaboratorClosed(TunnelEvent::CONNECTED))?;

        self.connection = Some(connection.clone());
        self.state = SessionState::Connected;

        Ok(connection)
    }

    /// Resolves once the collaborator has gone away.
    pub async fn closed(&mut self) {
        let _ = (&mut self.closed_rx).await;
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl SessionNotifier {
    /// Delivers an event to the session. Returns `false` when an event of this
    /// kind was already delivered or the session no longer listens.
    pub fn notify(&mut self, event: TunnelEvent) -> bool {
        match event {
            TunnelEvent::UrlAssigned(url) => self
                .url_tx
                .take()
                .is_some_and(|tx| tx.send(url).is_ok()),
            TunnelEvent::Connected(connection) => self
                .connected_tx
                .take()
                .is_some_and(|tx| tx.send(connection).is_ok()),
        }
    }

    /// Whether both events have been delivered.
    pub fn is_complete(&self) -> bool {
        self.url_tx.is_none() && self.connected_tx.is_none()
    }
}

/// The external service that provisions tunnels.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Human-readable provisioner name.
    fn name(&self) -> &str;

    /// Requests a tunnel to `target` (e.g. `http://localhost:8080`). Exactly
    /// one request is issued per call.
    async fn provision(&self, target: &str) -> Result<TunnelSession, Error>;
}

/// Quick tunnels provisioned by the `cloudflared` binary. No account is
/// needed and the URL is a random `*.trycloudflare.com` host.
pub struct Cloudflared {
    binary: String,
}

impl Cloudflared {
    pub fn new(settings: &CloudflaredSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
        }
    }
}

#[async_trait]
impl Provisioner for Cloudflared {
    fn name(&self) -> &str {
        "cloudflared"
    }

    #[instrument(name = "provision_quick_tunnel", skip(self))]
    async fn provision(&self, target: &str) -> Result<TunnelSession, Error> {
        event!(
            Level::INFO,
            "Requesting quick tunnel to {} from {}",
            target,
            self.binary
        );

        let child = Command::new(&self.binary)
            .arg("tunnel")
            .arg("--url")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let (mut session, notifier) = TunnelSession::new(target);
        session.attach(tokio::spawn(watch_collaborator(child, notifier)));

        Ok(session)
    }
}

/// Reads the collaborator's output until both streams close, forwarding
/// recognised events to the session, then reaps the process.
async fn watch_collaborator(mut child: Child, mut notifier: SessionNotifier) {
    let mut stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
    // cloudflared logs to stderr, including the URL banner.
    let mut stderr = child.stderr.take().map(|err| BufReader::new(err).lines());

    while stdout.is_some() || stderr.is_some() {
        let line = tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => line,
            line = next_line(&mut stderr), if stderr.is_some() => line,
        };

        if let Some(line) = line {
            handle_line(&line, &mut notifier);
        }
    }

    match child.wait().await {
        Ok(status) => event!(Level::INFO, "Tunnel process exited: {}", status),
        Err(err) => event!(Level::ERROR, "Failed to wait on tunnel process: {}", err),
    }
}

/// Reads the next line, closing the stream on EOF or error.
async fn next_line<R: AsyncRead + Unpin>(lines: &mut Option<Lines<BufReader<R>>>) -> Option<String> {
    let reader = lines.as_mut()?;

    match reader.next_line().await {
        Ok(Some(line)) => Some(line),
        Ok(None) => {
            *lines = None;
            None
        }
        Err(err) => {
            event!(Level::WARN, "Failed to read tunnel output: {}", err);
            *lines = None;
            None
        }
    }
}

fn handle_line(line: &str, notifier: &mut SessionNotifier) {
    event!(target: "tunnel::cloudflared", Level::DEBUG, "{}", line);

    if let Some(tunnel_event) = TunnelEvent::from_log_line(line) {
        let name = tunnel_event.name();
        if notifier.notify(tunnel_event) {
            event!(Level::INFO, "Tunnel event received: {}", name);

            if notifier.is_complete() {
                event!(Level::INFO, "Tunnel established");
            }
        }
    }
}
