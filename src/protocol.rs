//! Message envelope protocol
//!
//! Every line exchanged with the operator or a peer is `<type> <payload...>`.
//! The type tag selects how the router handles the rest of the line:
//!
//! | Tag       | Handling                                             |
//! |-----------|------------------------------------------------------|
//! | `command` | relayed (serial origin only), then dispatched        |
//! | `data`    | echoed to serial and appended to the log             |
//! | `status`  | echoed to serial and appended to the log             |
//! | `help`    | usage summary written to serial                      |
//! | `flash`   | log dumped to serial between separators, then erased |
//!
//! Lines are parsed through [`Tokens`], a cursor over the borrowed line.
//! The line itself is never modified, so it can be relayed verbatim after
//! its tag has been read.

use core::fmt::Write;

use heapless::String;

use crate::config::STATUS_LINE_LEN;
use crate::types::NodeMode;

/// Characters separating tokens
const SEPARATORS: [char; 2] = [' ', '\t'];

/// Cursor yielding whitespace-separated tokens of a line
///
/// Repeated separators count as one and no empty token is ever produced.
#[derive(Clone, Debug)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    /// Start tokenizing `line`
    #[must_use]
    pub const fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// Next token, or `None` once the line is exhausted
    pub fn next_token(&mut self) -> Option<&'a str> {
        let start = self.rest.trim_start_matches(SEPARATORS);
        if start.is_empty() {
            self.rest = start;
            return None;
        }

        match start.find(SEPARATORS) {
            Some(end) => {
                self.rest = &start[end..];
                Some(&start[..end])
            }
            None => {
                self.rest = "";
                Some(start)
            }
        }
    }

    /// Unconsumed part of the line with leading separators removed
    #[must_use]
    pub fn remainder(&self) -> &'a str {
        self.rest.trim_start_matches(SEPARATORS)
    }

    /// Whether no tokens remain
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remainder().is_empty()
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Message type selected by the first token of a line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Configuration command
    Command,
    /// Sensor or payload data to log
    Data,
    /// Peer status line to log
    Status,
    /// Usage request
    Help,
    /// Dump and erase the log
    Flash,
    /// Unrecognised tag
    Unknown,
}

impl MessageKind {
    /// Classify a type tag (case-sensitive)
    #[must_use]
    pub fn classify(tag: &str) -> Self {
        match tag {
            "command" => Self::Command,
            "data" => Self::Data,
            "status" => Self::Status,
            "help" => Self::Help,
            "flash" => Self::Flash,
            _ => Self::Unknown,
        }
    }

    /// Tag as written on the wire
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Data => "data",
            Self::Status => "status",
            Self::Help => "help",
            Self::Flash => "flash",
            Self::Unknown => "",
        }
    }

    /// Whether the payload is persisted to the log
    #[must_use]
    pub const fn is_loggable(self) -> bool {
        matches!(self, Self::Data | Self::Status)
    }
}

/// Usage summary written for a `help` message
pub const USAGE: &str = "\
Usage: <type> <payload...>\n\
  command <path...> [value]  apply and relay a configuration change\n\
  data <payload>             echo and log a data line\n\
  status <payload>           echo and log a status line\n\
  help                       show this summary\n\
  flash                      dump the log to serial and erase it\n";

/// Line written before and after a log dump
pub const SEPARATOR: &str = "----------------------------------------\n";

/// Prefix of a radio-received payload echoed to serial
pub const RECEIVED_PREFIX: &str = "Received: ";

/// Snapshot reported by every heartbeat
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceStatus<'a> {
    /// Node identifier
    pub id: u32,
    /// RSSI of the last received packet in dBm
    pub rssi: i16,
    /// Battery charge in percent
    pub battery_level: f32,
    /// Operating mode
    pub mode: NodeMode,
    /// Free-form health string
    pub status: &'a str,
}

impl DeviceStatus<'_> {
    /// Render the status line (without terminator)
    ///
    /// `status ID:<id> RSSI:<int> batteryLevel:<float> mode:<string> status:<string>`
    ///
    /// Returns `None` rather than a truncated line when it does not fit.
    #[must_use]
    pub fn to_line(&self) -> Option<String<STATUS_LINE_LEN>> {
        let mut line = String::new();
        write!(
            line,
            "status ID:{} RSSI:{} batteryLevel:{:.2} mode:{} status:{}",
            self.id,
            self.rssi,
            self.battery_level,
            self.mode.as_str(),
            self.status
        )
        .ok()?;
        Some(line)
    }
}
