//! Client-side listener: accepts sockets, runs the login handshake, and
//! pumps lines between the socket and the account session.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use ironbnc_proto::{Command, LineCodec, Message};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::{ClientLink, LinkEvent};
use crate::bouncer::Bouncer;

/// Accept loop; one spawned task per client connection.
pub async fn run_listener(listener: TcpListener, bouncer: Arc<Bouncer>) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "listening for clients");
    loop {
        let (stream, peer) = listener.accept().await?;
        let bouncer = bouncer.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, peer, bouncer).await {
                debug!(peer = %peer, error = %e, "client connection ended");
            }
        });
    }
}

fn auth_notice(text: &str) -> Message {
    Message::from_command(Command::NOTICE("AUTH".to_string(), text.to_string()))
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    bouncer: Arc<Bouncer>,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LineCodec::new());
    framed
        .send(auth_notice(
            "*** ironbnc - log in with PASS <password>, NICK <nick>, USER <account>",
        ))
        .await?;

    // Registration handshake. Nothing is relayed until PASS, NICK and
    // USER have all arrived and the credentials check out.
    let mut nick: Option<String> = None;
    let mut password: Option<String> = None;
    let mut account: Option<String> = None;

    let (nick, password, account) = loop {
        if let (Some(n), Some(p), Some(a)) = (&nick, &password, &account) {
            break (n.clone(), p.clone(), a.clone());
        }
        let Some(msg) = framed.next().await else {
            return Ok(());
        };
        match msg?.command {
            Command::PASS(pass) => password = Some(pass),
            Command::NICK(n) => nick = Some(n),
            Command::USER(user, ..) => account = Some(user),
            Command::QUIT(_) => return Ok(()),
            Command::PING(token) => {
                framed
                    .send(Message::from_command(Command::PONG(token)))
                    .await?;
            }
            _ => {
                framed
                    .send(auth_notice("*** You need to log in first."))
                    .await?;
            }
        }
    };

    let user = match bouncer.login(&account, Some(&password), peer.ip(), None) {
        Ok(user) => user,
        Err(err) => {
            warn!(
                user = %account,
                peer = %peer,
                code = err.error_code(),
                "login rejected"
            );
            let _ = framed
                .send(Message::from_command(Command::ERROR(err.kill_line())))
                .await;
            return Ok(());
        }
    };

    let (link, mut rx) = ClientLink::channel(peer);
    link.set_nick(&nick);
    link.set_owner(user.name());

    if let Err(err) = user.attach(link.clone()) {
        let _ = framed
            .send(Message::from_command(Command::ERROR(err.kill_line())))
            .await;
        return Ok(());
    }

    // Single pump for both directions; returning drops the socket, so a
    // queued close always tears the connection down for real.
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(LinkEvent::Line(msg)) => {
                    if framed.send(msg).await.is_err() {
                        break;
                    }
                }
                Some(LinkEvent::Close(reason)) => {
                    let _ = framed
                        .send(Message::from_command(Command::ERROR(format!(
                            "Closing link: {reason}"
                        ))))
                        .await;
                    break;
                }
                None => break,
            },
            incoming = framed.next() => match incoming {
                Some(Ok(msg)) => {
                    link.note_received(&msg);
                    match &msg.command {
                        Command::QUIT(_) => {
                            link.kill("Goodbye");
                        }
                        Command::PING(token) => {
                            link.send(Message::from_command(Command::PONG(token.clone())));
                        }
                        _ => user.forward_from_client(msg),
                    }
                }
                Some(Err(e)) => {
                    debug!(peer = %peer, error = %e, "client stream error");
                    break;
                }
                None => break,
            },
        }
    }

    user.client_connection_lost(&link);
    Ok(())
}
