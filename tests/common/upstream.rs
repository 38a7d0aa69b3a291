//! Fake upstream IRC server the bouncer connects out to.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ironbnc_proto::{Command, LineCodec, Message};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;

pub struct FakeIrcServer {
    listener: TcpListener,
}

impl FakeIrcServer {
    pub async fn bind() -> anyhow::Result<FakeIrcServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(FakeIrcServer { listener })
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Accept a raw connection without completing registration. Used
    /// for timing assertions on connection attempts.
    pub async fn accept_raw(&self, wait: Duration) -> anyhow::Result<TcpStream> {
        match timeout(wait, self.listener.accept()).await {
            Ok(Ok((stream, _))) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => anyhow::bail!("no connection attempt within {wait:?}"),
        }
    }

    /// Accept a bouncer connection and complete IRC registration.
    pub async fn accept(&self) -> anyhow::Result<FakeIrcConn> {
        let stream = self.accept_raw(Duration::from_secs(10)).await?;
        let mut framed = Framed::new(stream, LineCodec::new());

        let mut nick = String::new();
        loop {
            let msg = match timeout(Duration::from_secs(10), framed.next()).await {
                Ok(Some(Ok(msg))) => msg,
                _ => anyhow::bail!("registration burst did not complete"),
            };
            match msg.command {
                Command::NICK(n) => nick = n,
                Command::USER(..) => break,
                _ => {}
            }
        }

        framed
            .send(
                format!(":fake.example.net 001 {nick} :Welcome to the fake network")
                    .parse::<Message>()?,
            )
            .await?;

        Ok(FakeIrcConn { framed, nick })
    }
}

/// One registered bouncer-to-server session.
pub struct FakeIrcConn {
    framed: Framed<TcpStream, LineCodec>,
    pub nick: String,
}

impl FakeIrcConn {
    /// Send a raw server-to-client line.
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.framed.send(line.parse::<Message>()?).await?;
        Ok(())
    }

    pub async fn recv_timeout(&mut self, wait: Duration) -> anyhow::Result<Message> {
        match timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(msg))) => Ok(msg),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => anyhow::bail!("bouncer closed the connection"),
            Err(_) => anyhow::bail!("timed out waiting for bouncer traffic"),
        }
    }

    /// Drain traffic for `window`, returning everything received.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<Message> {
        let mut received = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let Some(remaining) =
                deadline.checked_duration_since(tokio::time::Instant::now())
            else {
                return received;
            };
            match timeout(remaining, self.framed.next()).await {
                Ok(Some(Ok(msg))) => received.push(msg),
                _ => return received,
            }
        }
    }
}
