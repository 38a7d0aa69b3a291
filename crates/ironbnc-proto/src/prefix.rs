use std::fmt;

use crate::error::ProtoError;

/// The source of an IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// A server name, e.g. `irc.example.net`.
    ServerName(String),
    /// A user prefix: nick, user, host (`nick!user@host`).
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix token (without the leading `:`).
    ///
    /// A token containing `!` or `@` is a user prefix; a bare token with a
    /// dot is taken to be a server name, anything else a plain nickname.
    pub fn parse(s: &str) -> Result<Prefix, ProtoError> {
        if s.is_empty() {
            return Err(ProtoError::InvalidPrefix(s.to_string()));
        }

        if let Some((nick, rest)) = s.split_once('!') {
            let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
            return Ok(Prefix::Nickname(
                nick.to_string(),
                user.to_string(),
                host.to_string(),
            ));
        }

        if let Some((nick, host)) = s.split_once('@') {
            return Ok(Prefix::Nickname(
                nick.to_string(),
                String::new(),
                host.to_string(),
            ));
        }

        if s.contains('.') {
            Ok(Prefix::ServerName(s.to_string()))
        } else {
            Ok(Prefix::Nickname(s.to_string(), String::new(), String::new()))
        }
    }

    /// The nickname, if this is a user prefix.
    pub fn nickname(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) => Some(nick),
            Prefix::ServerName(_) => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{name}"),
            Prefix::Nickname(nick, user, host) => {
                write!(f, "{nick}")?;
                if !user.is_empty() {
                    write!(f, "!{user}")?;
                }
                if !host.is_empty() {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}
