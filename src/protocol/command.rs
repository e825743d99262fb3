//! Inbound frame grammar.
//!
//! Every frame is parsed exactly once into an [`InboundCommand`]; the
//! decoder then dispatches with a single `match`.  Argument errors are
//! captured as [`InboundCommand::Malformed`] so the decoder can answer
//! with an `ERROR:` frame without re-parsing.
//!
//! `m`, `RESET`, `SHUTDOWN`, `EMERGENCY_STOP` and `RELAY:*` are matched
//! case-insensitively; every other token is case-sensitive.

use crate::error::ProtocolError;
use crate::schedule::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayAction {
    On,
    Off,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundCommand<'a> {
    GetLog,
    ClearLog,
    /// `CMD:SCHEDULE_FILE` or the legacy `BEGINFILE`.
    BeginSchedule,
    EndSchedule,
    /// Payload of a `DATA:` fragment, trimmed.
    Data(&'a str),
    ManualStart,
    EmergencyStop,
    Reset,
    Shutdown,
    SetTime(Timestamp),
    Relay(RelayAction),
    ReadSchedule,
    ReadSequence,
    UpdateSequence {
        rinse: u32,
        pump_cycles: u32,
    },
    WifiOn {
        ssid: Option<&'a str>,
        password: Option<&'a str>,
        port: Option<u16>,
    },
    WifiOff,
    WifiStatus,
    SendCmdStart(usize),
    SendCmdPart {
        index: usize,
        payload: &'a str,
    },
    SendCmd(&'a str),
    /// A known command whose arguments did not parse.
    Malformed {
        command: &'static str,
        error: ProtocolError,
    },
    /// Anything else.  Raw schedule text while an upload is active.
    Other(&'a str),
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn malformed(command: &'static str, error: ProtocolError) -> InboundCommand<'static> {
    InboundCommand::Malformed { command, error }
}

impl<'a> InboundCommand<'a> {
    /// Classify one trimmed frame.
    pub fn parse(text: &'a str) -> Self {
        match text {
            "GETLOG" => return Self::GetLog,
            "CLEARLOG" => return Self::ClearLog,
            "CMD:SCHEDULE_FILE" | "BEGINFILE" => return Self::BeginSchedule,
            "CMD:END_SCHEDULE" => return Self::EndSchedule,
            "READ_SCHEDULE" => return Self::ReadSchedule,
            "READ_SEQUENCE" => return Self::ReadSequence,
            "wifi_off" => return Self::WifiOff,
            "wifi_status" => return Self::WifiStatus,
            _ => {}
        }

        if text.eq_ignore_ascii_case("m") {
            return Self::ManualStart;
        }
        if text.eq_ignore_ascii_case("RESET") {
            return Self::Reset;
        }
        if text.eq_ignore_ascii_case("SHUTDOWN") {
            return Self::Shutdown;
        }
        if text.eq_ignore_ascii_case("EMERGENCY_STOP") {
            return Self::EmergencyStop;
        }
        if let Some(arg) = strip_prefix_ignore_case(text, "RELAY:") {
            return Self::parse_relay(arg.trim());
        }

        if let Some(payload) = text.strip_prefix("DATA:") {
            return Self::Data(payload.trim());
        }
        if let Some(digits) = text.strip_prefix("T:") {
            return match Timestamp::parse_compact(digits.trim()) {
                Ok(ts) => Self::SetTime(ts),
                Err(e) => malformed("TIME_SET", e),
            };
        }
        if let Some(args) = text.strip_prefix("UPDATE_SEQUENCE:") {
            return Self::parse_update_sequence(args);
        }
        if text == "wifi_on" || text.starts_with("wifi_on ") {
            return Self::parse_wifi_on(&text["wifi_on".len()..]);
        }

        // The START/PART forms share the SEND_CMD prefix, so check them first.
        if let Some(count) = text.strip_prefix("SEND_CMD_START:") {
            return match count.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Self::SendCmdStart(n),
                _ => malformed("SEND_CMD_START", ProtocolError::InvalidFragmentCount),
            };
        }
        if let Some(rest) = text.strip_prefix("SEND_CMD_PART") {
            return Self::parse_part(rest);
        }
        if let Some(cmd) = text.strip_prefix("SEND_CMD:") {
            let cmd = cmd.trim();
            return if cmd.is_empty() {
                malformed("SEND_CMD", ProtocolError::InvalidCommand)
            } else {
                Self::SendCmd(cmd)
            };
        }

        Self::Other(text)
    }

    fn parse_relay(arg: &str) -> Self {
        if arg.eq_ignore_ascii_case("ON") {
            Self::Relay(RelayAction::On)
        } else if arg.eq_ignore_ascii_case("OFF") {
            Self::Relay(RelayAction::Off)
        } else if arg.eq_ignore_ascii_case("STATUS") {
            Self::Relay(RelayAction::Status)
        } else {
            malformed("RELAY", ProtocolError::InvalidArguments)
        }
    }

    fn parse_update_sequence(args: &str) -> Self {
        let parsed = args.split_once(',').and_then(|(r, p)| {
            Some((r.trim().parse::<u32>().ok()?, p.trim().parse::<u32>().ok()?))
        });
        match parsed {
            Some((rinse, pump_cycles)) => Self::UpdateSequence { rinse, pump_cycles },
            None => malformed("UPDATE_SEQUENCE", ProtocolError::InvalidArguments),
        }
    }

    fn parse_wifi_on(args: &'a str) -> Self {
        let mut words = args.split_whitespace();
        let ssid = words.next();
        let password = words.next();
        let port = match words.next().map(str::parse::<u16>) {
            None => None,
            Some(Ok(p)) if p != 0 => Some(p),
            Some(_) => return malformed("WIFI_ON", ProtocolError::InvalidArguments),
        };
        if words.next().is_some() {
            return malformed("WIFI_ON", ProtocolError::InvalidArguments);
        }
        Self::WifiOn {
            ssid,
            password,
            port,
        }
    }

    /// `<index>:<payload>` after the `SEND_CMD_PART` token.
    fn parse_part(rest: &'a str) -> Self {
        let Some((index, payload)) = rest.split_once(':') else {
            return malformed("SEND_CMD_PART", ProtocolError::InvalidFragmentIndex);
        };
        match index.trim().parse::<usize>() {
            Ok(index) => Self::SendCmdPart { index, payload },
            Err(_) => malformed("SEND_CMD_PART", ProtocolError::InvalidFragmentIndex),
        }
    }
}
