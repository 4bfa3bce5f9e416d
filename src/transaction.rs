//! Transaction and message containers.
//!
//! A [`Transaction`] is one recognized instance of a trigger's pattern set:
//! an ordered collection of [`Message`] field bags plus the trigger that
//! spawned it. Both containers preserve insertion order so that the row
//! projection is stable across runs.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::trigger::TransactionTrigger;

/// Column name for the transaction id in projected rows.
pub const FIELD_TID: &str = "TID";
/// Identity field: message id as captured from the trace.
pub const FIELD_MESSAGE_ID: &str = "message_id";
/// Identity field: message timestamp.
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Identity field: message type text.
pub const FIELD_TYPE: &str = "type";

/// Number of identity columns in a projected row (TID plus the three
/// per-message identity fields). A transaction qualifies for output only
/// if its column union exceeds this.
const IDENTITY_COLUMN_COUNT: usize = 4;

/// One flattened output row: `TID` plus a message's fields.
pub type Row = IndexMap<String, String>;

/// Open-ended field bag for one message within a transaction.
///
/// Fields are kept in insertion order. Once time collection has seen the
/// message it always contains at least `message_id`, `timestamp` and `type`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: IndexMap<String, String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value, overwriting any previous value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// Identity accessor: the captured message id.
    pub fn message_id(&self) -> Option<&str> {
        self.get(FIELD_MESSAGE_ID)
    }

    /// Identity accessor: the captured timestamp.
    pub fn timestamp(&self) -> Option<&str> {
        self.get(FIELD_TIMESTAMP)
    }

    /// Identity accessor: the captured type text.
    pub fn msg_type(&self) -> Option<&str> {
        self.get(FIELD_TYPE)
    }

    /// Iterate fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One recognized transaction: an id, the trigger that matched it, and the
/// messages collected for it keyed by message id.
///
/// The trigger reference is shared (many transactions may be spawned by the
/// same trigger); the messages are exclusively owned.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: u64,
    trigger: Arc<TransactionTrigger>,
    messages: IndexMap<String, Message>,
}

impl Transaction {
    pub fn new(id: u64, trigger: Arc<TransactionTrigger>) -> Self {
        Self {
            id,
            trigger,
            messages: IndexMap::new(),
        }
    }

    /// 1-based transaction id, assigned in recognition order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The trigger definition that spawned this transaction.
    pub fn trigger(&self) -> &TransactionTrigger {
        &self.trigger
    }

    /// Set a field on the message with the given id, creating the message
    /// if this is the first field recorded for it. Message order follows
    /// the order message ids are first encountered.
    pub fn set_field(&mut self, message_id: &str, field: &str, value: &str) {
        let message = self
            .messages
            .entry(message_id.to_string())
            .or_insert_with(Message::new);
        message.set_field(field, value);
    }

    /// Messages in first-encountered order.
    pub fn messages(&self) -> impl Iterator<Item = (&str, &Message)> {
        self.messages.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Distinct columns a projection of this transaction would have:
    /// `TID` plus the union of field names across all messages.
    pub fn column_count(&self) -> usize {
        let mut columns: HashSet<&str> = HashSet::new();
        for message in self.messages.values() {
            for (name, _) in message.fields() {
                columns.insert(name);
            }
        }
        columns.len() + 1
    }

    /// True if at least one message captured a field beyond the identity
    /// fields. Transactions that never did are dropped from the result.
    pub fn has_captured_fields(&self) -> bool {
        self.column_count() > IDENTITY_COLUMN_COUNT
    }

    /// Project to flattened rows, one per message, each row the union of
    /// `TID` and the message's fields in insertion order.
    pub fn to_rows(&self) -> Vec<Row> {
        self.messages
            .values()
            .map(|message| {
                let mut row = Row::new();
                row.insert(FIELD_TID.to_string(), self.id.to_string());
                for (name, value) in message.fields() {
                    row.insert(name.to_string(), value.to_string());
                }
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::SectionTrigger;

    fn test_trigger() -> Arc<TransactionTrigger> {
        Arc::new(TransactionTrigger {
            name: "Create PDP".to_string(),
            start_pattern: "CALL START".to_string(),
            timestamp_pattern: r"(\d+)\s+(\S+)\s+(.*)".to_string(),
            message_pattern: r"Message (\d+)".to_string(),
            sections: vec![SectionTrigger {
                section_pattern: "Params".to_string(),
                parameter_patterns: vec!["Code=".to_string()],
            }],
        })
    }

    #[test]
    fn test_set_field_groups_by_message() {
        let mut transaction = Transaction::new(1, test_trigger());
        transaction.set_field("Message #1", "A", "1");
        transaction.set_field("Message #1", "B", "2");
        transaction.set_field("Message #2", "B", "3");
        transaction.set_field("Message #2", "C", "4");
        transaction.set_field("Message #3", "D", "5");

        assert_eq!(transaction.message_count(), 3);
    }

    #[test]
    fn test_to_rows_shape() {
        let mut transaction = Transaction::new(1, test_trigger());
        transaction.set_field("Message #1", "A", "1");
        transaction.set_field("Message #1", "B", "2");
        transaction.set_field("Message #2", "B", "3");
        transaction.set_field("Message #2", "C", "4");
        transaction.set_field("Message #3", "D", "5");

        let rows = transaction.to_rows();
        assert_eq!(rows.len(), 3);
        // Column union: TID, A, B, C, D
        assert_eq!(transaction.column_count(), 5);
        assert_eq!(rows[0].get("TID").map(|s| s.as_str()), Some("1"));
        assert_eq!(rows[0].get("A").map(|s| s.as_str()), Some("1"));
        assert_eq!(rows[1].get("C").map(|s| s.as_str()), Some("4"));
        assert!(rows[2].get("A").is_none());
    }

    #[test]
    fn test_message_order_is_first_encounter_order() {
        let mut transaction = Transaction::new(2, test_trigger());
        transaction.set_field("b", "message_id", "b");
        transaction.set_field("a", "message_id", "a");
        transaction.set_field("b", "timestamp", "10:00");

        let ids: Vec<&str> = transaction.messages().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_identity_only_transaction_has_no_captured_fields() {
        let mut transaction = Transaction::new(3, test_trigger());
        transaction.set_field("m1", FIELD_MESSAGE_ID, "m1");
        transaction.set_field("m1", FIELD_TIMESTAMP, "10:00:00");
        transaction.set_field("m1", FIELD_TYPE, "Create PDP Request");

        assert!(!transaction.has_captured_fields());

        transaction.set_field("m1", "Params - Code", "7");
        assert!(transaction.has_captured_fields());
    }

    #[test]
    fn test_identity_accessors() {
        let mut message = Message::new();
        message.set_field(FIELD_MESSAGE_ID, "m1");
        message.set_field(FIELD_TIMESTAMP, "10:00:00");
        message.set_field(FIELD_TYPE, "Create PDP Request");

        assert_eq!(message.message_id(), Some("m1"));
        assert_eq!(message.timestamp(), Some("10:00:00"));
        assert_eq!(message.msg_type(), Some("Create PDP Request"));
    }
}
