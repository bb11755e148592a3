//! Last-writer-wins field registers.

use crate::value::Value;
use ddoc_clock::LamportTimestamp;

/// An LWW register for one named document field.
///
/// Stores the current value together with the Lamport stamp of the
/// write that produced it. An incoming write is accepted iff its stamp
/// is strictly greater than the current writer's in the
/// `(counter, client)` total order; since that order is total, every
/// replica that observes the same set of writes converges on the same
/// winner without communication.
///
/// A delete is a write of `None`. It shares the resolution rule with
/// normal writes rather than taking automatic precedence, and it never
/// physically removes the register.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRegister {
    value: Option<Value>,
    writer: LamportTimestamp,
}

impl FieldRegister {
    pub fn new(value: Option<Value>, writer: LamportTimestamp) -> Self {
        Self { value, writer }
    }

    /// Apply a write, local or remote. Returns true if the incoming
    /// write won.
    pub fn write(&mut self, value: Option<Value>, writer: LamportTimestamp) -> bool {
        if writer > self.writer {
            self.value = value;
            self.writer = writer;
            true
        } else {
            false
        }
    }

    /// The visible value; `None` if the register holds a tombstone.
    pub fn get(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Stamp of the winning write.
    pub fn writer(&self) -> &LamportTimestamp {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(counter: u64, client: &str) -> LamportTimestamp {
        LamportTimestamp::new(counter, client)
    }

    #[test]
    fn test_newer_write_wins() {
        let mut reg = FieldRegister::new(Some("old".into()), ts(1, "alice"));
        assert!(reg.write(Some("new".into()), ts(2, "bob")));
        assert_eq!(reg.get(), Some(&"new".into()));
    }

    #[test]
    fn test_stale_write_rejected() {
        let mut reg = FieldRegister::new(Some("current".into()), ts(5, "alice"));
        assert!(!reg.write(Some("stale".into()), ts(3, "bob")));
        assert_eq!(reg.get(), Some(&"current".into()));
    }

    #[test]
    fn test_concurrent_tie_breaks_on_client() {
        let mut reg = FieldRegister::new(Some("from-alice".into()), ts(4, "alice"));
        assert!(reg.write(Some("from-bob".into()), ts(4, "bob")));
        assert_eq!(reg.get(), Some(&"from-bob".into()));

        // The losing direction: alice cannot displace bob at the same counter.
        assert!(!reg.write(Some("from-alice".into()), ts(4, "alice")));
        assert_eq!(reg.get(), Some(&"from-bob".into()));
    }

    #[test]
    fn test_identical_stamp_is_idempotent() {
        let mut reg = FieldRegister::new(Some("v".into()), ts(2, "alice"));
        assert!(!reg.write(Some("v".into()), ts(2, "alice")));
        assert_eq!(reg.get(), Some(&"v".into()));
        assert_eq!(reg.writer(), &ts(2, "alice"));
    }

    #[test]
    fn test_delete_is_an_ordinary_write() {
        let mut reg = FieldRegister::new(Some("v".into()), ts(1, "alice"));
        assert!(reg.write(None, ts(2, "alice")));
        assert!(reg.is_tombstone());
        assert_eq!(reg.get(), None);

        // A concurrent set with a higher stamp beats the delete.
        assert!(reg.write(Some("revived".into()), ts(3, "bob")));
        assert_eq!(reg.get(), Some(&"revived".into()));
    }

    #[test]
    fn test_apply_order_does_not_matter() {
        let writes = [
            (Some(Value::from("a")), ts(3, "alice")),
            (Some(Value::from("b")), ts(3, "bob")),
            (None, ts(2, "carol")),
        ];

        let mut forward = FieldRegister::new(None, ts(0, ""));
        for (value, writer) in writes.iter().cloned() {
            forward.write(value, writer);
        }

        let mut reversed = FieldRegister::new(None, ts(0, ""));
        for (value, writer) in writes.iter().rev().cloned() {
            reversed.write(value, writer);
        }

        assert_eq!(forward, reversed);
        assert_eq!(forward.get(), Some(&"b".into()));
    }
}
