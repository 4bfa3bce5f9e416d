//! Trigger definition types for trace extraction.
//!
//! A trigger is a named bundle of regular expressions describing how to
//! recognize and parse one transaction type in a trace log. Triggers are
//! built up incrementally by the config parser and are only considered
//! usable once every structural field is populated.

use serde::{Deserialize, Serialize};

/// One named sub-structure inside a message (e.g., an information element)
/// and the parameter patterns used to pull fields out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTrigger {
    /// Pattern that recognizes the start of the section in a trace line
    pub section_pattern: String,

    /// Patterns for the parameters captured within this section, in
    /// declaration order
    #[serde(default)]
    pub parameter_patterns: Vec<String>,
}

impl SectionTrigger {
    /// Completeness predicate: a section is usable only when it has a
    /// pattern and at least one parameter.
    ///
    /// Evaluated field-by-field on purpose; emptiness is the only thing
    /// that makes a section incomplete.
    pub fn is_complete(&self) -> bool {
        !self.section_pattern.is_empty() && !self.parameter_patterns.is_empty()
    }
}

/// One recognizable transaction type: how to spot its start line, how to
/// read the per-message timestamp header, how to find the start of each
/// message body, and which sections to mine for fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTrigger {
    /// Transaction type name; must appear within the captured type text of
    /// a timestamp line for this trigger to claim a transaction
    pub name: String,

    /// Search pattern recognizing a transaction start line
    pub start_pattern: String,

    /// Anchored pattern for timestamp lines; must capture exactly
    /// (message_id, timestamp, type)
    pub timestamp_pattern: String,

    /// Anchored pattern for the first line of a message body; capture
    /// group 1 is the message id
    pub message_pattern: String,

    /// Sections to extract within each message, in declaration order
    #[serde(default)]
    pub sections: Vec<SectionTrigger>,
}

impl TransactionTrigger {
    /// Completeness predicate: all four patterns set and at least one
    /// section defined.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty()
            && !self.start_pattern.is_empty()
            && !self.timestamp_pattern.is_empty()
            && !self.message_pattern.is_empty()
            && !self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_trigger_completeness() {
        let mut section = SectionTrigger::default();
        assert!(!section.is_complete());

        section.section_pattern = "Quality of Service".to_string();
        assert!(!section.is_complete());

        section.parameter_patterns.push("Delay class=".to_string());
        assert!(section.is_complete());
    }

    #[test]
    fn test_section_trigger_pattern_only_is_incomplete() {
        let section = SectionTrigger {
            section_pattern: "IMSI".to_string(),
            parameter_patterns: vec![],
        };
        assert!(!section.is_complete());
    }

    #[test]
    fn test_transaction_trigger_completeness() {
        let mut trigger = TransactionTrigger {
            name: "Create PDP".to_string(),
            start_pattern: "CALL START".to_string(),
            timestamp_pattern: r"(\d+)\s+(\S+)\s+(.*)".to_string(),
            message_pattern: r"Message (\d+)".to_string(),
            sections: vec![],
        };
        assert!(!trigger.is_complete());

        trigger.sections.push(SectionTrigger {
            section_pattern: "Params".to_string(),
            parameter_patterns: vec!["Code=".to_string()],
        });
        assert!(trigger.is_complete());
    }

    #[test]
    fn test_transaction_trigger_missing_pattern_is_incomplete() {
        let trigger = TransactionTrigger {
            name: "Create PDP".to_string(),
            start_pattern: "CALL START".to_string(),
            timestamp_pattern: String::new(),
            message_pattern: r"Message (\d+)".to_string(),
            sections: vec![SectionTrigger {
                section_pattern: "Params".to_string(),
                parameter_patterns: vec!["Code=".to_string()],
            }],
        };
        assert!(!trigger.is_complete());
    }
}
