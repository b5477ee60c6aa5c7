//! Command dispatcher
//!
//! A command is a path through nested static tables, e.g. `update gain 22`:
//! the top-level table routes `update` to the update table, whose `gain`
//! handler reads the next token as a number and forwards it to the node.
//!
//! Lookup is a first-match, case-sensitive linear scan. There is no
//! fallback entry: an unmatched token is logged and nothing else happens.
//! Handlers pull any arguments they need from the same [`Tokens`] cursor.
//!
//! Numeric arguments are parsed permissively. Trailing garbage is ignored
//! and a missing or non-numeric argument becomes zero with a warning; the
//! operator sees the effect (or its absence) rather than an error reply.

use crate::protocol::Tokens;
use crate::radio::hardware::ConfigError;
use crate::types::NodeMode;

/// Sink for text replies produced while a command runs
pub trait Reply {
    /// Queue `text` for the operator
    fn reply(&mut self, text: &str);
}

/// Operations command handlers may perform on the node
pub trait NodeControl: Reply {
    /// Change output power in dBm
    fn set_output_power(&mut self, dbm: i8) -> Result<(), ConfigError>;

    /// Change carrier frequency in MHz
    fn set_frequency(&mut self, mhz: f32) -> Result<(), ConfigError>;

    /// Change spreading factor
    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), ConfigError>;

    /// Change bandwidth in kHz
    fn set_bandwidth(&mut self, khz: f32) -> Result<(), ConfigError>;

    /// Current operating mode
    fn mode(&self) -> NodeMode;

    /// Switch operating mode
    fn set_mode(&mut self, mode: NodeMode);

    /// Drive the switched output, returns whether it was applied
    fn set_output(&mut self, on: bool) -> bool;
}

/// Handler bound to a table entry
pub type Handler = fn(&mut dyn NodeControl, &mut Tokens<'_>);

/// What a table entry does when its name matches
#[derive(Clone, Copy)]
pub enum Action {
    /// Run a handler
    Run(Handler),
    /// Resolve the next token in a sub-table
    Nested(&'static [Entry]),
    /// List the names of the table this entry belongs to
    Help,
}

/// Named entry of a command table
#[derive(Clone, Copy)]
pub struct Entry {
    /// Token matched exactly
    pub name: &'static str,
    /// Bound action
    pub action: Action,
}

impl Entry {
    const fn run(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            action: Action::Run(handler),
        }
    }

    const fn nested(name: &'static str, table: &'static [Entry]) -> Self {
        Self {
            name,
            action: Action::Nested(table),
        }
    }

    const fn help() -> Self {
        Self {
            name: "help",
            action: Action::Help,
        }
    }
}

/// How a dispatch ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch<'a> {
    /// The named handler ran
    Handled(&'static str),
    /// A table listing was written
    Help,
    /// The line ran out before a handler was reached
    NoCommand,
    /// A token matched no entry
    Unmatched(&'a str),
}

/// Resolve the next token in `table` and run what it is bound to
pub fn dispatch<'a>(
    node: &mut dyn NodeControl,
    table: &'static [Entry],
    tokens: &mut Tokens<'a>,
) -> Dispatch<'a> {
    let Some(token) = tokens.next_token() else {
        warn!("No command provided");
        return Dispatch::NoCommand;
    };

    let Some(entry) = table.iter().find(|entry| entry.name == token) else {
        warn!("Unknown command: {}", token);
        return Dispatch::Unmatched(token);
    };

    match entry.action {
        Action::Run(handler) => {
            debug!("Running command {}", entry.name);
            handler(node, tokens);
            Dispatch::Handled(entry.name)
        }
        Action::Nested(sub_table) => dispatch(node, sub_table, tokens),
        Action::Help => {
            write_help(node, table);
            Dispatch::Help
        }
    }
}

/// Write `Available commands: a, b, c` for `table`
pub fn write_help(out: &mut dyn NodeControl, table: &[Entry]) {
    out.reply("Available commands: ");
    for (i, entry) in table.iter().enumerate() {
        if i > 0 {
            out.reply(", ");
        }
        out.reply(entry.name);
    }
    out.reply("\n");
}

/// Top-level command table
#[cfg(feature = "switched-output")]
pub const COMMANDS: &[Entry] = &[
    Entry::help(),
    Entry::nested("update", UPDATE_COMMANDS),
    Entry::nested("set", SET_COMMANDS),
    Entry::run("mode", handle_mode),
];

/// Top-level command table
#[cfg(not(feature = "switched-output"))]
pub const COMMANDS: &[Entry] = &[
    Entry::help(),
    Entry::nested("update", UPDATE_COMMANDS),
    Entry::run("mode", handle_mode),
];

/// Radio parameter setters under `update`
pub const UPDATE_COMMANDS: &[Entry] = &[
    Entry::help(),
    Entry::run("gain", handle_gain),
    Entry::run("freqMhz", handle_frequency),
    Entry::run("sf", handle_spreading_factor),
    Entry::run("bwKHz", handle_bandwidth),
];

/// Output controls under `set`
#[cfg(feature = "switched-output")]
pub const SET_COMMANDS: &[Entry] = &[Entry::help(), Entry::run("output", handle_output)];

fn report(what: &str, result: Result<(), ConfigError>) {
    match result {
        Ok(()) => debug!("{} updated", what),
        Err(ConfigError::OutOfRange) => warn!("{} rejected: out of range", what),
        Err(ConfigError::Hardware(e)) => warn!("{} rejected by radio, code {}", what, e.code()),
    }
}

fn handle_gain(node: &mut dyn NodeControl, tokens: &mut Tokens<'_>) {
    let value = parse_int(tokens.next_token());
    match i8::try_from(value) {
        Ok(dbm) => report("Output power", node.set_output_power(dbm)),
        Err(_) => warn!("Output power {} out of range", value),
    }
}

fn handle_frequency(node: &mut dyn NodeControl, tokens: &mut Tokens<'_>) {
    let mhz = parse_float(tokens.next_token());
    report("Frequency", node.set_frequency(mhz));
}

fn handle_spreading_factor(node: &mut dyn NodeControl, tokens: &mut Tokens<'_>) {
    let value = parse_int(tokens.next_token());
    match u8::try_from(value) {
        Ok(sf) => report("Spreading factor", node.set_spreading_factor(sf)),
        Err(_) => warn!("Spreading factor {} out of range", value),
    }
}

fn handle_bandwidth(node: &mut dyn NodeControl, tokens: &mut Tokens<'_>) {
    let khz = parse_float(tokens.next_token());
    report("Bandwidth", node.set_bandwidth(khz));
}

fn handle_mode(node: &mut dyn NodeControl, tokens: &mut Tokens<'_>) {
    let Some(name) = tokens.next_token() else {
        let current = node.mode();
        node.reply("mode: ");
        node.reply(current.as_str());
        node.reply("\n");
        return;
    };

    match NodeMode::from_name(name) {
        Some(mode) => {
            node.set_mode(mode);
            info!("Mode set to {}", mode.as_str());
            node.reply("mode set to ");
            node.reply(mode.as_str());
            node.reply("\n");
        }
        None => warn!("Unknown mode: {}", name),
    }
}

#[cfg(feature = "switched-output")]
fn handle_output(node: &mut dyn NodeControl, tokens: &mut Tokens<'_>) {
    let on = match parse_int(tokens.next_token()) {
        0 => false,
        1 => true,
        other => {
            warn!("Output state {} must be 0 or 1", other);
            return;
        }
    };
    if node.set_output(on) {
        info!("Output switched {}", if on { "on" } else { "off" });
    }
}

/// Parse the leading integer of `token`
///
/// Accepts an optional sign followed by digits and ignores anything after
/// them. Saturates on overflow. Missing or non-numeric input yields 0.
#[must_use]
pub fn parse_int(token: Option<&str>) -> i32 {
    let Some(text) = token else {
        warn!("Missing numeric argument, using 0");
        return 0;
    };

    let (negative, digits) = split_sign(text);
    let mut value: i32 = 0;
    let mut seen = false;
    for digit in digits
        .bytes()
        .map_while(|b| b.is_ascii_digit().then(|| i32::from(b - b'0')))
    {
        seen = true;
        value = value.saturating_mul(10).saturating_add(digit);
    }

    if !seen {
        warn!("Invalid numeric argument {}, using 0", text);
        return 0;
    }
    if negative {
        -value
    } else {
        value
    }
}

/// Parse the leading decimal number of `token`
///
/// Accepts an optional sign, digits and a fractional part and ignores
/// anything after them. Missing or non-numeric input yields 0.0.
#[must_use]
pub fn parse_float(token: Option<&str>) -> f32 {
    let Some(text) = token else {
        warn!("Missing numeric argument, using 0");
        return 0.0;
    };

    let (negative, body) = split_sign(text);
    let int_len = body.bytes().take_while(u8::is_ascii_digit).count();
    let mut end = int_len;
    let mut frac_len = 0;
    if body.as_bytes().get(int_len) == Some(&b'.') {
        frac_len = body[int_len + 1..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        end = int_len + 1 + frac_len;
    }

    if int_len == 0 && frac_len == 0 {
        warn!("Invalid numeric argument {}, using 0", text);
        return 0.0;
    }

    let value = body[..end].parse::<f32>().unwrap_or(0.0);
    if negative {
        -value
    } else {
        value
    }
}

fn split_sign(text: &str) -> (bool, &str) {
    match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    }
}
