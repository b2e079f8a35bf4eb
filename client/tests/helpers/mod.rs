#![allow(dead_code)]

use std::{
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use client::{
    error::Error,
    startup::Application,
    tunnel::{Provisioner, SessionNotifier, TunnelSession},
};
use tokio::{sync::mpsc, task::JoinHandle};

/// Stdout stand-in shared between the application task and the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("Output is not UTF-8")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A provisioner that records each request and hands the session's notifier
/// to the test, which then plays the collaborator.
pub struct FakeProvisioner {
    targets: Arc<Mutex<Vec<String>>>,
    notifiers: mpsc::UnboundedSender<SessionNotifier>,
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn provision(&self, target: &str) -> Result<TunnelSession, Error> {
        self.targets.lock().unwrap().push(target.to_string());

        let (session, notifier) = TunnelSession::new(target);
        self.notifiers
            .send(notifier)
            .expect("Test dropped the notifier receiver");

        Ok(session)
    }
}

pub struct TestApplication {
    pub output: SharedBuffer,
    pub targets: Arc<Mutex<Vec<String>>>,
    pub notifiers: mpsc::UnboundedReceiver<SessionNotifier>,
    pub handle: JoinHandle<Result<(), Error>>,
}

impl TestApplication {
    /// Waits for the next provisioning request and returns its notifier.
    pub async fn next_notifier(&mut self) -> SessionNotifier {
        tokio::time::timeout(Duration::from_secs(2), self.notifiers.recv())
            .await
            .expect("No tunnel was requested")
            .expect("Provisioner went away")
    }

    /// Like `next_notifier`, leaving room for the local check to give up first.
    pub async fn next_notifier_after_local_check(&mut self) -> SessionNotifier {
        tokio::time::timeout(
            client::local::PROBE_TIMEOUT + Duration::from_secs(3),
            self.notifiers.recv(),
        )
        .await
        .expect("No tunnel was requested")
        .expect("Provisioner went away")
    }

    /// Waits until the application has written `lines` lines of output.
    pub async fn wait_for_lines(&self, lines: usize) -> Vec<String> {
        for _ in 0..200 {
            let output = self.output.contents();
            if output.lines().count() >= lines {
                return output.lines().map(str::to_string).collect();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("Timed out waiting for {} lines of output", lines);
    }
}

/// Spawns the application without checking the local service first:
/// nothing listens on the test ports.
pub fn spawn_app(port: u16) -> TestApplication {
    spawn_app_checking_local(port, false)
}

pub fn spawn_app_checking_local(port: u16, check_local: bool) -> TestApplication {
    let targets = Arc::new(Mutex::new(Vec::new()));
    let (notifiers_tx, notifiers) = mpsc::unbounded_channel();

    let provisioner = FakeProvisioner {
        targets: targets.clone(),
        notifiers: notifiers_tx,
    };

    let application = Application::with_provisioner(Box::new(provisioner), check_local);

    let output = SharedBuffer::default();
    let mut application_output = output.clone();

    // Spawn the application on a background task
    let handle = tokio::spawn(async move {
        application
            .run_until_stopped(port, &mut application_output)
            .await
    });

    TestApplication {
        output,
        targets,
        notifiers,
        handle,
    }
}

/// Binds a local port that accepts connections but never answers them.
pub async fn spawn_silent_service() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind silent service");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    port
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    listener.local_addr().unwrap().port()
}

/// Writes an executable shell script standing in for `cloudflared`. The
/// arguments it was invoked with are recorded next to it with an `.args`
/// suffix.
#[cfg(unix)]
pub fn fake_cloudflared(body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::temp_dir().join(format!("fake-cloudflared-{}", uuid::Uuid::new_v4()));
    let script = format!("#!/bin/sh\necho \"$@\" > \"$0.args\"\n{}\n", body);

    std::fs::write(&path, script).expect("Failed to write fake cloudflared");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake cloudflared executable");

    path
}

/// The arguments recorded by a `fake_cloudflared` script.
pub fn recorded_args(script: &std::path::Path) -> String {
    let mut path = script.as_os_str().to_owned();
    path.push(".args");

    std::fs::read_to_string(PathBuf::from(path))
        .expect("Fake cloudflared did not record its arguments")
        .trim()
        .to_string()
}

pub const URL_BANNER: &str =
    "2024-01-15T10:00:00Z INF |  https://example.trycloudflare.com                          |";
pub const REGISTERED: &str = "2024-01-15T10:00:01Z INF Registered tunnel connection connIndex=0 connection=6b1c7b4e-6a2e-4b53-a5f5-1d9b1f5e2a3c event=0 ip=198.41.200.13 location=ams01 protocol=quic";
