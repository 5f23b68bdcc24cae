//! Control protocol wire types.
//!
//! One newline-terminated command per connection, one reply line back:
//!
//! ```text
//!   client → server:  PLAY_PAUSE | NEXT | PREV | QUIT | STATUS | PING
//!   server → client:  OK | ERR <message> | <payload>
//! ```
//!
//! Commands are case-insensitive and whitespace-trimmed on the wire.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command")]
    EmptyCommand,
}

/// A parsed control command.  Unrecognized (but non-empty) tokens are kept as
/// `Unknown` so the dispatcher can answer them with `ERR unknown command`
/// instead of the server dropping them on the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    PlayPause,
    Next,
    Prev,
    Quit,
    Status,
    Ping,
    Unknown(String),
}

impl ControlCommand {
    /// Parse one wire line: trim surrounding whitespace, uppercase.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let token = line.trim().to_ascii_uppercase();
        if token.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        Ok(match token.as_str() {
            "PLAY_PAUSE" => ControlCommand::PlayPause,
            "NEXT" => ControlCommand::Next,
            "PREV" => ControlCommand::Prev,
            "QUIT" => ControlCommand::Quit,
            "STATUS" => ControlCommand::Status,
            "PING" => ControlCommand::Ping,
            _ => ControlCommand::Unknown(token),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            ControlCommand::PlayPause => "PLAY_PAUSE",
            ControlCommand::Next => "NEXT",
            ControlCommand::Prev => "PREV",
            ControlCommand::Quit => "QUIT",
            ControlCommand::Status => "STATUS",
            ControlCommand::Ping => "PING",
            ControlCommand::Unknown(token) => token,
        }
    }
}

/// The synchronous reply to one control command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlReply {
    pub ok: bool,
    pub data: String,
    pub err: String,
}

impl ControlReply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn with_data(data: impl Into<String>) -> Self {
        Self {
            ok: true,
            data: data.into(),
            err: String::new(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: String::new(),
            err: message.into(),
        }
    }

    /// Encode as a single reply line (without the trailing newline).
    pub fn encode(&self) -> String {
        if !self.ok {
            format!("ERR {}", self.err)
        } else if self.data.is_empty() {
            "OK".to_string()
        } else {
            self.data.clone()
        }
    }

    /// Decode a reply line on the client side.  `OK` yields an empty payload,
    /// `ERR <message>` yields the error message, anything else is a payload.
    pub fn decode(line: &str) -> Result<String, String> {
        let line = line.trim();
        if let Some(msg) = line.strip_prefix("ERR ") {
            return Err(msg.to_string());
        }
        if line == "ERR" {
            return Err(String::new());
        }
        if line == "OK" {
            return Ok(String::new());
        }
        Ok(line.to_string())
    }
}

/// Build the STATUS payload.  Hand-assembled so field order stays stable
/// (`playing`, `station`, `country`); serde_json is used only for escaping.
pub fn status_payload(playing: bool, station: &str, country: &str) -> String {
    let name = if station.is_empty() { "-" } else { station };
    format!(
        "{{\"playing\":{},\"station\":{},\"country\":{}}}",
        playing,
        serde_json::to_string(name).unwrap_or_else(|_| "\"-\"".into()),
        serde_json::to_string(country).unwrap_or_else(|_| "\"\"".into()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_trimmed() {
        let cases = [
            ("play_pause", ControlCommand::PlayPause),
            ("PLAY_PAUSE", ControlCommand::PlayPause),
            ("PlAy_PaUsE", ControlCommand::PlayPause),
            ("  next", ControlCommand::Next),
            ("prev  ", ControlCommand::Prev),
            ("  quit  ", ControlCommand::Quit),
            ("status\n", ControlCommand::Status),
            ("ping", ControlCommand::Ping),
        ];
        for (input, expected) in cases {
            assert_eq!(ControlCommand::parse(input).unwrap(), expected, "{input:?}");
        }
    }

    #[test]
    fn parse_rejects_empty_input() {
        for input in ["", "   ", "\t\t", "\n\n"] {
            assert_eq!(
                ControlCommand::parse(input),
                Err(ProtocolError::EmptyCommand),
                "{input:?}"
            );
        }
    }

    #[test]
    fn parse_keeps_unknown_tokens() {
        assert_eq!(
            ControlCommand::parse("  bogus \n").unwrap(),
            ControlCommand::Unknown("BOGUS".into())
        );
    }

    #[test]
    fn reply_encoding() {
        assert_eq!(ControlReply::ok().encode(), "OK");
        assert_eq!(ControlReply::with_data("QUEUED").encode(), "QUEUED");
        assert_eq!(
            ControlReply::err("no stations available").encode(),
            "ERR no stations available"
        );
    }

    #[test]
    fn reply_decoding() {
        assert_eq!(ControlReply::decode("OK\n"), Ok(String::new()));
        assert_eq!(ControlReply::decode("QUEUED"), Ok("QUEUED".into()));
        assert_eq!(
            ControlReply::decode("ERR unknown command"),
            Err("unknown command".into())
        );
    }

    #[test]
    fn status_payload_shape() {
        assert_eq!(
            status_payload(false, "", "US"),
            r#"{"playing":false,"station":"-","country":"US"}"#
        );
        assert_eq!(
            status_payload(true, "Test \"FM\"", "DE"),
            r#"{"playing":true,"station":"Test \"FM\"","country":"DE"}"#
        );
    }
}
