/*!
The line protocol spoken by the tunnel-provisioning collaborator (`cloudflared`).

`cloudflared` has no structured event stream for quick tunnels. It reports the
assigned URL inside a banner and each edge registration as a `key=value` log
line, so the client reads its output line by line and recognises the two
events it cares about:

```text
2024-01-15T10:00:00Z INF |  https://random-slug.trycloudflare.com   |
2024-01-15T10:00:01Z INF Registered tunnel connection connIndex=0 connection=6b1c... event=0 ip=198.41.200.13 location=ams01 protocol=quic
```
*/

use std::fmt;

/// Hosts under which `cloudflared` hands out public URLs.
const TUNNEL_DOMAINS: [&str; 2] = [".trycloudflare.com", ".cfargotunnel.com"];

/// Marker of the log line emitted once an edge connection is registered.
const REGISTERED_CONNECTION: &str = "Registered tunnel connection";

/// Parsing signature for values carried by a single line of collaborator output.
pub trait LogLineProtocol {
    /// Recognises the value in `line`. Lines that don't carry it yield `None`.
    fn from_log_line(line: &str) -> Option<Self>
    where
        Self: Sized;
}

/// The public URL assigned to a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedUrl(pub String);

impl AssignedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_tunnel_url(candidate: &str) -> bool {
    let Some(rest) = candidate.strip_prefix("https://") else {
        return false;
    };
    let host = rest.split(['/', ':']).next().unwrap_or_default();

    TUNNEL_DOMAINS
        .iter()
        .any(|domain| host.len() > domain.len() && host.ends_with(domain))
}

impl LogLineProtocol for AssignedUrl {
    /// Finds an `https://` URL on one of the tunnel domains. The banner wraps
    /// the URL in `|` borders and other log lines may quote it, so these are
    /// stripped from each word before it is checked.
    fn from_log_line(line: &str) -> Option<Self> {
        line.split_whitespace()
            .map(|word| word.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | '|')))
            .find(|candidate| is_tunnel_url(candidate))
            .map(|url| AssignedUrl(url.trim_end_matches('/').to_string()))
    }
}

/// An edge connection registered by the collaborator. This is the payload of
/// the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Index of the connection among the collaborator's edge connections.
    pub index: u8,
    pub id: String,
    pub ip: Option<String>,
    /// Edge location code e.g. `ams01`.
    pub location: String,
    pub protocol: Option<String>,
}

impl LogLineProtocol for Connection {
    fn from_log_line(line: &str) -> Option<Self> {
        let (_, fields) = line.split_once(REGISTERED_CONNECTION)?;

        let mut index = None;
        let mut id = None;
        let mut ip = None;
        let mut location = None;
        let mut protocol = None;

        for (key, value) in fields
            .split_whitespace()
            .filter_map(|field| field.split_once('='))
        {
            match key {
                "connIndex" => index = value.parse::<u8>().ok(),
                "connection" => id = Some(value.to_string()),
                "ip" => ip = Some(value.to_string()),
                "location" => location = Some(value.to_string()),
                "protocol" => protocol = Some(value.to_string()),
                _ => {}
            }
        }

        Some(Connection {
            index: index?,
            id: id?,
            ip,
            location: location?,
            protocol,
        })
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connIndex={} connection={}", self.index, self.id)?;
        if let Some(ip) = &self.ip {
            write!(f, " ip={}", ip)?;
        }
        write!(f, " location={}", self.location)?;
        if let Some(protocol) = &self.protocol {
            write!(f, " protocol={}", protocol)?;
        }
        Ok(())
    }
}

/// The two notifications a tunnel session observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    UrlAssigned(AssignedUrl),
    Connected(Connection),
}

impl TunnelEvent {
    pub const URL_ASSIGNED: &'static str = "url-assigned";
    pub const CONNECTED: &'static str = "connected";

    /// The event's name, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TunnelEvent::UrlAssigned(_) => Self::URL_ASSIGNED,
            TunnelEvent::Connected(_) => Self::CONNECTED,
        }
    }
}

impl LogLineProtocol for TunnelEvent {
    /// Registration lines are checked first.
    fn from_log_line(line: &str) -> Option<Self> {
        if let Some(connection) = Connection::from_log_line(line) {
            return Some(TunnelEvent::Connected(connection));
        }

        AssignedUrl::from_log_line(line).map(TunnelEvent::UrlAssigned)
    }
}
