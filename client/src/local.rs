use std::time::Duration;

use http_body_util::Empty;
use hyper::{body::Bytes, Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::{event, instrument, Level};

use crate::error::Error;

/// How long the local service gets to answer before the probe gives up.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends a `HEAD /` to the local service a tunnel is about to expose and
/// returns the status it answers with. Any status counts as reachable. A
/// service that doesn't answer within `PROBE_TIMEOUT` is a probe error.
#[instrument(name = "probe_local_service")]
pub async fn probe_local_service(address: &str) -> Result<StatusCode, Error> {
    tokio::time::timeout(PROBE_TIMEOUT, send_probe(address))
        .await
        .map_err(|_| Error::Probe {
            address: address.to_string(),
            reason: format!("no answer within {}s", PROBE_TIMEOUT.as_secs()),
        })?
}

async fn send_probe(address: &str) -> Result<StatusCode, Error> {
    let probe_error = |reason: String| Error::Probe {
        address: address.to_string(),
        reason,
    };

    let uri = address
        .parse::<Uri>()
        .map_err(|e| probe_error(e.to_string()))?;
    let host = uri
        .host()
        .ok_or_else(|| probe_error("address has no host".to_string()))?;
    let port = uri.port_u16().unwrap_or(80);

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| probe_error(e.to_string()))?;

    // Use an adapter to access something implementing `tokio::io` traits as if they implement
    // `hyper::rt` IO traits.
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| probe_error(e.to_string()))?;

    // Spawn a task to poll the connection, driving the HTTP state
    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            event!(Level::DEBUG, "Probe connection failed: {:?}", err);
        }
    });

    let authority = format!("{}:{}", host, port);
    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/")
        .header(hyper::header::HOST, authority)
        .body(Empty::<Bytes>::new())
        .map_err(|e| probe_error(e.to_string()))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| probe_error(e.to_string()))?;

    Ok(response.status())
}
