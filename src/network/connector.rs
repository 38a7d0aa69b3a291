//! Outbound server connections.
//!
//! The session layer asks an [`IrcConnector`] for a connection and gets
//! back an [`IrcLink`]; the connector owns the socket, the TLS handshake,
//! the registration burst and the I/O task that pumps lines between the
//! wire and the link. Tests substitute the connector to drive sessions
//! without a network.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ironbnc_proto::{Command, LineCodec, Message};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, lookup_host};
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::{IrcLink, LinkEvent};
use crate::error::ConnectError;
use crate::user::User;

/// Everything needed to open and register one server connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    /// Local bind address (vhost), if configured.
    pub bind_addr: Option<String>,
    pub nick: String,
    pub ident: String,
    pub realname: String,
    pub server_password: Option<String>,
}

/// Opens outbound server connections on behalf of accounts.
#[async_trait]
pub trait IrcConnector: Send + Sync {
    /// Open, register, and start pumping a server connection. The
    /// returned link is live; inbound lines are delivered to
    /// [`User::handle_server_message`] until the socket closes.
    async fn connect(
        &self,
        request: ConnectRequest,
        user: Arc<User>,
    ) -> Result<Arc<IrcLink>, ConnectError>;
}

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// The real connector: TCP, optionally wrapped in TLS with the system
/// trust roots.
pub struct TcpConnector;

impl TcpConnector {
    async fn open_socket(
        request: &ConnectRequest,
    ) -> Result<Box<dyn Transport>, ConnectError> {
        let mut addrs = lookup_host((request.host.as_str(), request.port)).await?;
        let addr = addrs.next().ok_or_else(|| ConnectError::Resolve {
            host: request.host.clone(),
            port: request.port,
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if let Some(bind) = &request.bind_addr {
            match bind.parse::<IpAddr>() {
                Ok(ip) => socket.bind(SocketAddr::new(ip, 0))?,
                Err(_) => {
                    warn!(bind = %bind, "ignoring unparseable bind address");
                }
            }
        }

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(true)?;

        if !request.ssl {
            return Ok(Box::new(stream));
        }

        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            // Skip certificates the trust store itself cannot parse.
            let _ = roots.add(cert);
        }
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(request.host.clone())
            .map_err(|_| ConnectError::InvalidServerName(request.host.clone()))?;
        let connector = TlsConnector::from(Arc::new(config));
        let tls = connector.connect(server_name, stream).await?;
        Ok(Box::new(tls))
    }

    async fn pump(
        mut framed: Framed<Box<dyn Transport>, LineCodec>,
        mut rx: mpsc::UnboundedReceiver<LinkEvent>,
        link: Arc<IrcLink>,
        user: Arc<User>,
    ) {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(LinkEvent::Line(msg)) => {
                        if framed.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Some(LinkEvent::Close(reason)) => {
                        debug!(server = %link.server(), reason = %reason, "closing server connection");
                        let _ = framed.flush().await;
                        return;
                    }
                    None => return,
                },
                incoming = framed.next() => match incoming {
                    Some(Ok(msg)) => {
                        if let Command::PING(token) = &msg.command {
                            link.send(Message::from_command(Command::PONG(token.clone())));
                            continue;
                        }
                        link.observe(&msg);
                        user.handle_server_message(msg);
                    }
                    Some(Err(e)) => {
                        warn!(server = %link.server(), error = %e, "server stream error");
                        break;
                    }
                    None => break,
                },
            }
        }

        user.server_connection_lost(&link);
    }
}

#[async_trait]
impl IrcConnector for TcpConnector {
    async fn connect(
        &self,
        request: ConnectRequest,
        user: Arc<User>,
    ) -> Result<Arc<IrcLink>, ConnectError> {
        let transport = Self::open_socket(&request).await?;
        let framed = Framed::new(transport, LineCodec::new());
        let (link, rx) = IrcLink::channel(&request.host);

        link.set_initial_nick(&request.nick);
        if let Some(pass) = &request.server_password {
            link.send(Message::from_command(Command::PASS(pass.clone())));
        }
        link.send(Message::from_command(Command::NICK(request.nick.clone())));
        link.send(Message::from_command(Command::USER(
            request.ident.clone(),
            "0".to_string(),
            "*".to_string(),
            request.realname.clone(),
        )));

        tokio::spawn(Self::pump(framed, rx, link.clone(), user));
        Ok(link)
    }
}
