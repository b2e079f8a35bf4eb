use std::{
    fs::{File, OpenOptions},
    io::{self, Stderr, Write},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use tracing::{dispatcher::set_global_default, Subscriber};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// A writer that sends output to stderr and, when configured, a log file.
/// Stdout is left alone as it carries the tunnel report.
pub struct MultiWriter {
    file: Option<Mutex<File>>,
}

impl MultiWriter {
    /// Opens (appending) or creates the log file if one is given.
    pub fn new(log_file: Option<&Path>) -> io::Result<Self> {
        let file = match log_file {
            Some(path) => Some(Mutex::new(
                OpenOptions::new().create(true).append(true).open(path)?,
            )),
            None => None,
        };

        Ok(Self { file })
    }
}

impl<'a> MakeWriter<'a> for MultiWriter {
    type Writer = MultiWriterGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MultiWriterGuard {
            stderr: io::stderr(),
            // A poisoned lock only means another writer panicked mid-record.
            file: self
                .file
                .as_ref()
                .map(|file| file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())),
        }
    }
}

/// A guard that wraps the actual writers.
pub struct MultiWriterGuard<'a> {
    stderr: Stderr,
    file: Option<MutexGuard<'a, File>>,
}

impl<'a> Write for MultiWriterGuard<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stderr.write_all(buf)?;

        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stderr.flush()?;
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Gets a tracing subscriber set at the `RUST_LOG` environment variable (otherwise the value provided)
/// with a JSON storage layer & bunyan formatting.
pub fn get_subscriber<Sink>(
    name: String,
    env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    // Default log level to `RUST_LOG` env var otherwise whatever is provided here.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(env_filter));
    let formatting_layer = BunyanFormattingLayer::new(name, sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Creates a `log` instance as the global logger with the subscriber as the
/// global default.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().expect("Failed to initialise logger");

    set_global_default(subscriber.into()).expect("Failed to set subscriber for logging");
}
