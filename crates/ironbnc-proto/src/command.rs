use std::fmt;

/// An IRC command with its parameters.
///
/// Only the commands the bouncer session layer produces or inspects get
/// structured variants; everything else rides in [`Command::Raw`] so that
/// relayed traffic round-trips untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PRIVMSG(String, String),
    NOTICE(String, String),
    JOIN(String),
    PART(String, Option<String>),
    KICK(String, String, Option<String>),
    NICK(String),
    MODE(String, Vec<String>),
    TOPIC(String, Option<String>),
    NAMES(String),
    AWAY(Option<String>),
    PING(String),
    PONG(String),
    QUIT(Option<String>),
    ERROR(String),
    PASS(String),
    USER(String, String, String, String),
    /// A numeric reply: code plus parameters (first is the target nick).
    Response(u16, Vec<String>),
    /// Any other command, verbatim.
    Raw(String, Vec<String>),
}

impl Command {
    /// Build a command from a verb and parameter list.
    pub fn new(verb: &str, params: Vec<String>) -> Command {
        let verb_upper = verb.to_ascii_uppercase();

        if verb_upper.len() == 3 && verb_upper.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(code) = verb_upper.parse::<u16>() {
                return Command::Response(code, params);
            }
        }

        let mut params = params;
        match (verb_upper.as_str(), params.len()) {
            ("PRIVMSG", 2) => {
                let text = params.pop().unwrap_or_default();
                let target = params.pop().unwrap_or_default();
                Command::PRIVMSG(target, text)
            }
            ("NOTICE", 2) => {
                let text = params.pop().unwrap_or_default();
                let target = params.pop().unwrap_or_default();
                Command::NOTICE(target, text)
            }
            ("JOIN", 1) => Command::JOIN(params.remove(0)),
            ("PART", 1 | 2) => {
                let chan = params.remove(0);
                Command::PART(chan, params.pop())
            }
            ("KICK", 2 | 3) => {
                let chan = params.remove(0);
                let who = params.remove(0);
                Command::KICK(chan, who, params.pop())
            }
            ("NICK", 1) => Command::NICK(params.remove(0)),
            ("MODE", n) if n >= 1 => {
                let target = params.remove(0);
                Command::MODE(target, params)
            }
            ("TOPIC", 1 | 2) => {
                let chan = params.remove(0);
                Command::TOPIC(chan, params.pop())
            }
            ("NAMES", 1) => Command::NAMES(params.remove(0)),
            ("AWAY", 0 | 1) => Command::AWAY(params.pop()),
            ("PING", 1) => Command::PING(params.remove(0)),
            ("PONG", 1) => Command::PONG(params.remove(0)),
            ("QUIT", 0 | 1) => Command::QUIT(params.pop()),
            ("ERROR", 1) => Command::ERROR(params.remove(0)),
            ("PASS", 1) => Command::PASS(params.remove(0)),
            ("USER", 4) => {
                let realname = params.pop().unwrap_or_default();
                let host = params.pop().unwrap_or_default();
                let mode = params.pop().unwrap_or_default();
                let user = params.pop().unwrap_or_default();
                Command::USER(user, mode, host, realname)
            }
            _ => Command::Raw(verb_upper, params),
        }
    }

    /// The command verb (numeric replies render as three digits).
    pub fn verb(&self) -> String {
        match self {
            Command::PRIVMSG(..) => "PRIVMSG".into(),
            Command::NOTICE(..) => "NOTICE".into(),
            Command::JOIN(..) => "JOIN".into(),
            Command::PART(..) => "PART".into(),
            Command::KICK(..) => "KICK".into(),
            Command::NICK(..) => "NICK".into(),
            Command::MODE(..) => "MODE".into(),
            Command::TOPIC(..) => "TOPIC".into(),
            Command::NAMES(..) => "NAMES".into(),
            Command::AWAY(..) => "AWAY".into(),
            Command::PING(..) => "PING".into(),
            Command::PONG(..) => "PONG".into(),
            Command::QUIT(..) => "QUIT".into(),
            Command::ERROR(..) => "ERROR".into(),
            Command::PASS(..) => "PASS".into(),
            Command::USER(..) => "USER".into(),
            Command::Response(code, _) => format!("{code:03}"),
            Command::Raw(verb, _) => verb.clone(),
        }
    }

    /// The parameter list in wire order.
    pub fn params(&self) -> Vec<&str> {
        match self {
            Command::PRIVMSG(t, x) | Command::NOTICE(t, x) => vec![t, x],
            Command::JOIN(c) | Command::NICK(c) | Command::NAMES(c) => vec![c],
            Command::PART(c, reason) => {
                let mut v = vec![c.as_str()];
                v.extend(reason.as_deref());
                v
            }
            Command::KICK(c, who, reason) => {
                let mut v = vec![c.as_str(), who.as_str()];
                v.extend(reason.as_deref());
                v
            }
            Command::MODE(t, modes) => {
                let mut v = vec![t.as_str()];
                v.extend(modes.iter().map(String::as_str));
                v
            }
            Command::TOPIC(c, topic) => {
                let mut v = vec![c.as_str()];
                v.extend(topic.as_deref());
                v
            }
            Command::AWAY(reason) | Command::QUIT(reason) => {
                reason.as_deref().into_iter().collect()
            }
            Command::PING(x) | Command::PONG(x) | Command::ERROR(x) | Command::PASS(x) => {
                vec![x]
            }
            Command::USER(u, m, h, r) => vec![u, m, h, r],
            Command::Response(_, params) | Command::Raw(_, params) => {
                params.iter().map(String::as_str).collect()
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())?;
        let params = self.params();
        for (i, param) in params.iter().enumerate() {
            let last = i == params.len() - 1;
            if last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}
