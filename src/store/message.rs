/// Snapshot descriptions written by the store and the coordinator.
pub struct SnapshotMessage;

impl SnapshotMessage {
    /// format a description for a CREATE operation
    pub fn create(collection: &str, id: &str, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[CREATE] {}/{}", collection, id), tx_id)
    }

    /// format a description for an UPDATE operation
    pub fn update(collection: &str, id: &str, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[UPDATE] {}/{}", collection, id), tx_id)
    }

    /// format a description for a DELETE operation
    pub fn delete(collection: &str, id: &str, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[DELETE] {}/{}", collection, id), tx_id)
    }

    /// format the closing marker of a committed transaction
    pub fn transaction_commit(tx_id: &str, operations: usize) -> String {
        format!("[COMMIT] Transaction {} ({} operations)", tx_id, operations)
    }

    fn with_tx(base: String, tx_id: Option<&str>) -> String {
        match tx_id {
            Some(id) => format!("{} tx:{}", base, id),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            SnapshotMessage::create("users", "123", Some("tx001")),
            "[CREATE] users/123 tx:tx001"
        );
        assert_eq!(SnapshotMessage::update("users", "123", None), "[UPDATE] users/123");
        assert_eq!(SnapshotMessage::delete("users", "123", None), "[DELETE] users/123");
        assert_eq!(
            SnapshotMessage::transaction_commit("tx001", 2),
            "[COMMIT] Transaction tx001 (2 operations)"
        );
    }
}
