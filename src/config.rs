//! Trigger configuration parser.
//!
//! Parses tab-delimited trigger config text into an ordered sequence of
//! complete [`TransactionTrigger`] definitions. The format is line-based:
//! `KEY<TAB>value` pairs, with trigger definitions separated by one or more
//! blank lines. Values may be wrapped in double quotes for visual grouping;
//! the quotes are stripped. Unknown keys are ignored. A line that does not
//! split into a key/value pair terminates parsing (treated as end of input).
//!
//! Incomplete trailing definitions are discarded: a trigger or section is
//! only ever stored once it passes its completeness predicate.

use crate::trigger::{SectionTrigger, TransactionTrigger};

/// Recognized config keys.
pub const KEY_TRANSACTION_NAME: &str = "TRANSACTION_NAME";
pub const KEY_TRANSACTION_START_TRIGGER: &str = "TRANSACTION_START_TRIGGER";
pub const KEY_MSG_TIMESTAMP_TRIGGER: &str = "MSG_TIMESTAMP_TRIGGER";
pub const KEY_MSG_TRIGGER: &str = "MSG_TRIGGER";
pub const KEY_SECTION_TRIGGER: &str = "SECTION_TRIGGER";
pub const KEY_SECTION_PARAM: &str = "SECTION_PARAM";

/// Key/value separator in config lines.
const CONFIG_SEPARATOR: char = '\t';

/// Parser states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigState {
    /// Waiting for a `TRANSACTION_NAME` line
    SearchForStart,
    /// Collecting the trigger's start/timestamp/message patterns
    CollectParams,
    /// Collecting parameter patterns for the current section
    CollectSection,
}

/// Streaming state machine that turns config lines into triggers.
///
/// Feed lines with [`push_line`](Self::push_line); when it returns `false`
/// the parser has hit a non-key/value line and wants no further input.
/// Call [`finish`](Self::finish) to flush and take the collected triggers.
///
/// # Example
/// ```
/// use tracemill::config::TriggerConfigParser;
///
/// let config = "TRANSACTION_NAME\tSetup\n\
///     TRANSACTION_START_TRIGGER\tCALL START\n\
///     MSG_TIMESTAMP_TRIGGER\t(\\d+) (\\S+) (.*)\n\
///     MSG_TRIGGER\tMessage (\\d+)\n\
///     SECTION_TRIGGER\tParams\n\
///     SECTION_PARAM\tCode=\n";
///
/// let triggers = TriggerConfigParser::parse_str(config);
/// assert_eq!(triggers.len(), 1);
/// ```
#[derive(Debug)]
pub struct TriggerConfigParser {
    state: ConfigState,
    current_trigger: TransactionTrigger,
    current_section: SectionTrigger,
    triggers: Vec<TransactionTrigger>,
}

impl TriggerConfigParser {
    pub fn new() -> Self {
        Self {
            state: ConfigState::SearchForStart,
            current_trigger: TransactionTrigger::default(),
            current_section: SectionTrigger::default(),
            triggers: Vec::new(),
        }
    }

    /// Parse a whole config text in one call.
    pub fn parse_str(input: &str) -> Vec<TransactionTrigger> {
        let mut parser = Self::new();
        for line in input.lines() {
            if !parser.push_line(line) {
                break;
            }
        }
        parser.finish()
    }

    /// Process one config line (without its line terminator).
    ///
    /// # Returns
    /// `true` to keep reading, `false` when the line could not be split
    /// into a key/value pair (the caller should stop and call `finish`).
    pub fn push_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            // Blank line: definition boundary. Flush whatever is complete
            // and go back to searching for the next trigger.
            self.flush();
            self.state = ConfigState::SearchForStart;
            return true;
        }
        let Some((key, value)) = split_key_value(line, CONFIG_SEPARATOR) else {
            return false;
        };
        self.handle_key_value(&key, value);
        true
    }

    /// Flush and return the collected triggers.
    ///
    /// End-of-input flush: a complete pending section is appended to the
    /// pending trigger, and the pending trigger is appended to the output
    /// if it is complete. Anything incomplete is dropped.
    pub fn finish(mut self) -> Vec<TransactionTrigger> {
        self.flush();
        self.triggers
    }

    /// Number of complete triggers collected so far.
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    fn handle_key_value(&mut self, key: &str, value: String) {
        match self.state {
            ConfigState::SearchForStart => {
                if key == KEY_TRANSACTION_NAME {
                    self.current_trigger.name = value;
                    self.state = ConfigState::CollectParams;
                }
                // Any other key while searching is noise.
            }
            ConfigState::CollectParams => match key {
                KEY_TRANSACTION_START_TRIGGER => {
                    self.current_trigger.start_pattern = value;
                }
                KEY_MSG_TIMESTAMP_TRIGGER => {
                    self.current_trigger.timestamp_pattern = value;
                }
                KEY_MSG_TRIGGER => {
                    self.current_trigger.message_pattern = value;
                }
                KEY_SECTION_TRIGGER => {
                    self.current_section.section_pattern = value;
                    self.state = ConfigState::CollectSection;
                }
                _ => {}
            },
            ConfigState::CollectSection => match key {
                KEY_SECTION_TRIGGER => {
                    // A section is stored whole or not at all: an
                    // incomplete one is replaced, never partially kept.
                    if self.current_section.is_complete() {
                        let section = std::mem::take(&mut self.current_section);
                        self.current_trigger.sections.push(section);
                    } else {
                        self.current_section = SectionTrigger::default();
                    }
                    self.current_section.section_pattern = value;
                }
                KEY_SECTION_PARAM => {
                    self.current_section.parameter_patterns.push(value);
                }
                _ => {}
            },
        }
    }

    fn flush(&mut self) {
        if self.current_section.is_complete() {
            let section = std::mem::take(&mut self.current_section);
            self.current_trigger.sections.push(section);
        }
        if self.current_trigger.is_complete() {
            let trigger = std::mem::take(&mut self.current_trigger);
            self.triggers.push(trigger);
        }
    }
}

impl Default for TriggerConfigParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a config line into a trimmed key/value pair.
///
/// Requires at least one separator; extra separated fields beyond the
/// first two are ignored. Double quotes in the value are stripped.
fn split_key_value(line: &str, sep: char) -> Option<(String, String)> {
    let mut parts = line.split(sep);
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();
    Some((key.to_string(), value.replace('"', "")))
}
