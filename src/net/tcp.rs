//! TCP connection factory with server failover

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ConnectionFactory, ServerAddress};
use crate::client::ClientConfig;
use crate::protocol::{FramedChannel, NetworkError, NetworkResult, ProtocolChannel, StreamCloser};

/// Byte stream a channel can be framed over.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Wraps a connected TCP stream (for example with TLS) before framing.
pub trait SecureTransport: Send + Sync {
    fn wrap(&self, stream: TcpStream, server: &ServerAddress) -> NetworkResult<Box<dyn Transport>>;
}

/// Connects to the configured servers in order, first success wins.
pub struct TcpConnectionFactory {
    servers: Vec<ServerAddress>,
    connect_timeout: Duration,
    tcp_nodelay: bool,
    secure: Option<Arc<dyn SecureTransport>>,
}

impl TcpConnectionFactory {
    pub fn new(servers: Vec<ServerAddress>, connect_timeout: Duration) -> Self {
        Self {
            servers,
            connect_timeout,
            tcp_nodelay: true,
            secure: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            servers: config.servers.clone(),
            connect_timeout: config.connect_timeout(),
            tcp_nodelay: config.tcp_nodelay,
            secure: None,
        }
    }

    /// Wrap every connection with `secure` before framing.
    pub fn with_secure_transport(mut self, secure: Arc<dyn SecureTransport>) -> Self {
        self.secure = Some(secure);
        self
    }

    fn connect(&self, server: &ServerAddress) -> NetworkResult<TcpStream> {
        let addrs = (server.host.as_str(), server.port)
            .to_socket_addrs()
            .map_err(NetworkError::Io)?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, error = %err, "Connect attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(match last_err {
            Some(err) => NetworkError::Io(err),
            None => NetworkError::ConnectFailed(format!("{} did not resolve", server)),
        })
    }

    fn frame(&self, stream: TcpStream, server: &ServerAddress) -> NetworkResult<Box<dyn ProtocolChannel>> {
        stream.set_nodelay(self.tcp_nodelay).map_err(NetworkError::Io)?;
        let closer = Arc::new(StreamCloser::for_socket(
            stream.try_clone().map_err(NetworkError::Io)?,
        ));
        let peer = server.to_string();
        match &self.secure {
            Some(secure) => {
                let transport = secure.wrap(stream, server)?;
                Ok(Box::new(FramedChannel::new(transport, peer, closer)))
            }
            None => Ok(Box::new(FramedChannel::new(stream, peer, closer))),
        }
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    fn open(&self) -> NetworkResult<Box<dyn ProtocolChannel>> {
        let mut failures = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            match self.connect(server) {
                Ok(stream) => {
                    info!(server = %server, "Connected to journal server");
                    return self.frame(stream, server);
                }
                Err(err) => {
                    warn!(server = %server, error = %err, "Journal server unreachable");
                    failures.push(format!("{}: {}", server, err));
                }
            }
        }
        if failures.is_empty() {
            return Err(NetworkError::ConnectFailed("no servers configured".to_string()));
        }
        Err(NetworkError::ConnectFailed(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_fails_over_to_next_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let live = listener.local_addr().unwrap().port();

        let factory = TcpConnectionFactory::new(
            vec![
                ServerAddress::new("127.0.0.1", unused_port()),
                ServerAddress::new("127.0.0.1", live),
            ],
            Duration::from_secs(1),
        );

        let channel = factory.open().unwrap();
        assert_eq!(channel.peer(), format!("127.0.0.1:{}", live));
        assert!(channel.is_open());
    }

    #[test]
    fn test_reports_every_failure() {
        let factory = TcpConnectionFactory::new(
            vec![
                ServerAddress::new("127.0.0.1", unused_port()),
                ServerAddress::new("127.0.0.1", unused_port()),
            ],
            Duration::from_millis(500),
        );

        match factory.open() {
            Err(NetworkError::ConnectFailed(message)) => assert_eq!(message.matches("127.0.0.1").count(), 2),
            other => panic!("expected ConnectFailed, got {:?}", other.map(|c| c.peer().to_string())),
        }
    }

    #[test]
    fn test_force_close_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let factory = TcpConnectionFactory::new(
            vec![ServerAddress::new("127.0.0.1", port)],
            Duration::from_secs(1),
        );

        let mut channel = factory.open().unwrap();
        let _server_side = listener.accept().unwrap();
        let closer = channel.force_close_handle();

        let reader = std::thread::spawn(move || channel.read_command().is_err());
        std::thread::sleep(Duration::from_millis(50));
        closer.force_close();

        assert!(reader.join().unwrap());
    }
}
