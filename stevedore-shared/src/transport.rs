//! Transport addressing for the runtime control socket.

use std::path::PathBuf;

/// Address of the container runtime's control socket.
///
/// The runtime normally listens on a local Unix socket; TCP exists so the
/// agent can be pointed at a fake runtime in tests.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Transport {
    /// TCP transport on localhost.
    Tcp { port: u16 },

    /// Unix socket transport.
    Unix { socket_path: PathBuf },
}

impl Transport {
    /// Create a TCP transport.
    pub fn tcp(port: u16) -> Self {
        Self::Tcp { port }
    }

    /// Create a Unix socket transport.
    pub fn unix(socket_path: impl Into<PathBuf>) -> Self {
        Self::Unix {
            socket_path: socket_path.into(),
        }
    }

    /// Get the URI representation of this transport.
    pub fn to_uri(&self) -> String {
        match self {
            Transport::Tcp { port } => format!("tcp://127.0.0.1:{}", port),
            Transport::Unix { socket_path } => format!("unix://{}", socket_path.display()),
        }
    }

    /// Parse a transport from a URI string.
    pub fn from_uri(uri: &str) -> Result<Self, String> {
        if let Some(rest) = uri.strip_prefix("tcp://") {
            let port = rest
                .split(':')
                .nth(1)
                .ok_or_else(|| format!("invalid TCP URI '{}': missing port", uri))?
                .parse::<u16>()
                .map_err(|e| format!("invalid TCP port in '{}': {}", uri, e))?;
            Ok(Self::tcp(port))
        } else if let Some(path) = uri.strip_prefix("unix://") {
            Ok(Self::unix(PathBuf::from(path)))
        } else {
            Err(format!(
                "invalid transport URI '{}': expected tcp:// or unix://",
                uri
            ))
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_round_trip() {
        let unix = Transport::unix("/run/runtime.sock");
        assert_eq!(Transport::from_uri(&unix.to_uri()), Ok(unix));

        let tcp = Transport::tcp(7777);
        assert_eq!(Transport::from_uri(&tcp.to_uri()), Ok(tcp));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(Transport::from_uri("vsock://1024").is_err());
        assert!(Transport::from_uri("127.0.0.1:80").is_err());
    }
}
