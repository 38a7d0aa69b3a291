//! Test IRC client driving the bouncer's client listener.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ironbnc_proto::{Command, LineCodec, Message};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// Overall deadline for "read until" style assertions.
const RECV_DEADLINE: Duration = Duration::from_secs(10);

pub struct TestClient {
    framed: Framed<TcpStream, LineCodec>,
}

impl TestClient {
    pub async fn connect(addr: &str) -> anyhow::Result<TestClient> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TestClient {
            framed: Framed::new(stream, LineCodec::new()),
        })
    }

    pub async fn send(&mut self, command: Command) -> anyhow::Result<()> {
        self.framed.send(Message::from_command(command)).await?;
        Ok(())
    }

    /// Run the bouncer login handshake.
    pub async fn login(&mut self, account: &str, password: &str, nick: &str) -> anyhow::Result<()> {
        self.send(Command::PASS(password.to_string())).await?;
        self.send(Command::NICK(nick.to_string())).await?;
        self.send(Command::USER(
            account.to_string(),
            "0".to_string(),
            "*".to_string(),
            "test user".to_string(),
        ))
        .await?;
        Ok(())
    }

    pub async fn recv_timeout(&mut self, wait: Duration) -> anyhow::Result<Message> {
        match timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(msg))) => Ok(msg),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => anyhow::bail!("connection closed"),
            Err(_) => anyhow::bail!("timed out waiting for a message"),
        }
    }

    /// Read until a message matches, returning it. Fails on deadline or
    /// disconnect.
    pub async fn recv_until<F>(&mut self, pred: F) -> anyhow::Result<Message>
    where
        F: Fn(&Message) -> bool,
    {
        let deadline = tokio::time::Instant::now() + RECV_DEADLINE;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| anyhow::anyhow!("deadline waiting for expected message"))?;
            let msg = self.recv_timeout(remaining).await?;
            if pred(&msg) {
                return Ok(msg);
            }
        }
    }

    /// Read until the server closes the connection with an ERROR line,
    /// returning its text.
    pub async fn recv_error(&mut self) -> anyhow::Result<String> {
        let msg = self
            .recv_until(|m| matches!(m.command, Command::ERROR(_)))
            .await?;
        match msg.command {
            Command::ERROR(text) => Ok(text),
            _ => unreachable!(),
        }
    }
}

/// Whether a message is a bouncer notice containing `needle`.
pub fn is_notice_containing(msg: &Message, needle: &str) -> bool {
    matches!(&msg.command, Command::NOTICE(_, text) if text.contains(needle))
}
