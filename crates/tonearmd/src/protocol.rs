//! Line protocol: request parsing and response framing.
//!
//! One request per line. Arguments are separated by whitespace; double quotes group an
//! argument containing spaces, with `\"` and `\\` as the only escapes. A response is
//! zero or more payload lines, a status line (`OK` or `ERR <message>`) and an empty line.

use std::fmt::Write as _;

/// Malformed request line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unterminated quoted argument")]
    UnterminatedQuote,
    #[error("invalid escape \\{0}")]
    InvalidEscape(char),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("not a number: {0:?}")]
    InvalidNumber(String),
}

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Playlists,
    AddPlaylist(String),
    DeletePlaylist(String),
    Add { playlist: String, paths: Vec<String> },
    Clear(String),
    Tracks(String),
    Play { playlist: String, pos: i64 },
    Pause,
    Stop,
    Next,
    Prev,
    Status,
    Quit,
}

/// Split a request line into arguments.
pub fn tokenize(line: &str) -> Result<Vec<String>, ProtocolError> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            return Ok(args);
        };
        let mut arg = String::new();
        if first == '"' {
            chars.next();
            loop {
                match chars.next() {
                    None => return Err(ProtocolError::UnterminatedQuote),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(c @ ('"' | '\\')) => arg.push(c),
                        Some(c) => return Err(ProtocolError::InvalidEscape(c)),
                        None => return Err(ProtocolError::UnterminatedQuote),
                    },
                    Some(c) => arg.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                arg.push(c);
            }
        }
        args.push(arg);
    }
}

/// Parse one line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Request>, ProtocolError> {
    let mut args = tokenize(line)?;
    if args.is_empty() {
        return Ok(None);
    }
    let name = args.remove(0).to_ascii_lowercase();
    let req = match name.as_str() {
        "ping" => no_args(args, "ping", Request::Ping)?,
        "playlists" => no_args(args, "playlists", Request::Playlists)?,
        "addplaylist" => Request::AddPlaylist(one_arg(args, "addplaylist <name>")?),
        "deleteplaylist" => Request::DeletePlaylist(one_arg(args, "deleteplaylist <name>")?),
        "add" => {
            if args.len() < 2 {
                return Err(ProtocolError::Usage("add <playlist> <path>..."));
            }
            let playlist = args.remove(0);
            Request::Add {
                playlist,
                paths: args,
            }
        }
        "clear" => Request::Clear(one_arg(args, "clear <playlist>")?),
        "tracks" => Request::Tracks(one_arg(args, "tracks <playlist>")?),
        "play" => {
            let [playlist, pos]: [String; 2] = args
                .try_into()
                .map_err(|_| ProtocolError::Usage("play <playlist> <pos>"))?;
            let pos = pos
                .parse::<i64>()
                .map_err(|_| ProtocolError::InvalidNumber(pos))?;
            Request::Play { playlist, pos }
        }
        "pause" => no_args(args, "pause", Request::Pause)?,
        "stop" => no_args(args, "stop", Request::Stop)?,
        "next" => no_args(args, "next", Request::Next)?,
        "prev" => no_args(args, "prev", Request::Prev)?,
        "status" => no_args(args, "status", Request::Status)?,
        "quit" => no_args(args, "quit", Request::Quit)?,
        _ => return Err(ProtocolError::UnknownCommand(name)),
    };
    Ok(Some(req))
}

fn no_args(args: Vec<String>, usage: &'static str, req: Request) -> Result<Request, ProtocolError> {
    if args.is_empty() {
        Ok(req)
    } else {
        Err(ProtocolError::Usage(usage))
    }
}

fn one_arg(args: Vec<String>, usage: &'static str) -> Result<String, ProtocolError> {
    let [arg]: [String; 1] = args.try_into().map_err(|_| ProtocolError::Usage(usage))?;
    Ok(arg)
}

/// Quote `s` so [`tokenize`] reads it back as one argument.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// A response ready to be framed onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    lines: Vec<String>,
    error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            lines: Vec::new(),
            error: None,
        }
    }

    pub fn ok_with(lines: Vec<String>) -> Self {
        Self { lines, error: None }
    }

    pub fn err(msg: impl std::fmt::Display) -> Self {
        Self {
            lines: Vec::new(),
            error: Some(msg.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Wire form, including the terminating empty line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            // Payload lines never contain newlines; flatten anything that slipped in.
            let _ = writeln!(out, "{}", line.replace(['\r', '\n'], " "));
        }
        match &self.error {
            None => out.push_str("OK\n"),
            Some(msg) => {
                let _ = writeln!(out, "ERR {}", msg.replace(['\r', '\n'], " "));
            }
        }
        out.push('\n');
        out
    }
}

impl<E: std::error::Error> From<Result<(), E>> for Response {
    fn from(res: Result<(), E>) -> Self {
        match res {
            Ok(()) => Response::ok(),
            Err(e) => Response::err(e),
        }
    }
}
