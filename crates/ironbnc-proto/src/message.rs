use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::error::ProtoError;
use crate::prefix::Prefix;

/// An owned IRC message: optional prefix plus command and parameters.
///
/// ```
/// use ironbnc_proto::{Command, Message};
///
/// let msg: Message = ":nick!user@host PRIVMSG #chan :hi".parse().unwrap();
/// assert!(matches!(msg.command, Command::PRIVMSG(..)));
/// assert_eq!(msg.to_string(), ":nick!user@host PRIVMSG #chan :hi");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: Command,
}

impl Message {
    pub fn new(prefix: Option<Prefix>, command: Command) -> Message {
        Message { prefix, command }
    }

    /// A message with no prefix (client-to-server direction).
    pub fn from_command(command: Command) -> Message {
        Message {
            prefix: None,
            command,
        }
    }

    /// A numeric reply from `server` addressed to `nick`.
    ///
    /// `args` follows the target nick; the last argument becomes the
    /// trailing parameter when serialization requires it.
    pub fn response(server: &str, code: u16, nick: &str, args: &[&str]) -> Message {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(nick.to_string());
        params.extend(args.iter().map(|s| s.to_string()));
        Message {
            prefix: Some(Prefix::ServerName(server.to_string())),
            command: Command::Response(code, params),
        }
    }

    /// The nickname of the message source, if any.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nickname)
    }
}

impl FromStr for Message {
    type Err = ProtoError;

    fn from_str(line: &str) -> Result<Message, ProtoError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtoError::EmptyMessage);
        }

        let (prefix, rest) = if let Some(stripped) = line.strip_prefix(':') {
            let (token, rest) = stripped.split_once(' ').unwrap_or((stripped, ""));
            (Some(Prefix::parse(token)?), rest.trim_start_matches(' '))
        } else {
            (None, line)
        };

        // Split off the trailing parameter first; the remainder is
        // whitespace-separated.
        let (middle, trailing) = match rest.split_once(" :") {
            Some((middle, trailing)) => (middle, Some(trailing)),
            None => (rest, None),
        };

        let mut tokens = middle.split(' ').filter(|t| !t.is_empty());
        let verb = tokens.next().ok_or(ProtoError::EmptyMessage)?;
        let mut params: Vec<String> = tokens.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Message {
            prefix,
            command: Command::new(verb, params),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_without_prefix() {
        let msg: Message = "NICK newnick".parse().unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, Command::NICK("newnick".into()));
    }

    #[test]
    fn parses_message_with_trailing() {
        let msg: Message = ":irc.example.net 422 nick :MOTD File is missing"
            .parse()
            .unwrap();
        assert_eq!(msg.prefix, Some(Prefix::ServerName("irc.example.net".into())));
        assert_eq!(
            msg.command,
            Command::Response(422, vec!["nick".into(), "MOTD File is missing".into()])
        );
    }

    #[test]
    fn strips_line_endings() {
        let msg: Message = "PING :token\r\n".parse().unwrap();
        assert_eq!(msg.command, Command::PING("token".into()));
    }

    #[test]
    fn rejects_empty_lines() {
        assert!("".parse::<Message>().is_err());
        assert!("\r\n".parse::<Message>().is_err());
    }

    #[test]
    fn response_constructor_sets_prefix() {
        let msg = Message::response("bnc.local", 1, "nick", &["Welcome back"]);
        assert_eq!(msg.to_string(), ":bnc.local 001 nick :Welcome back");
    }

    #[test]
    fn display_roundtrip_of_relayed_traffic() {
        let raw = ":nick!user@host PRIVMSG #chan :hello there";
        let msg: Message = raw.parse().unwrap();
        assert_eq!(msg.to_string(), raw);
    }
}
