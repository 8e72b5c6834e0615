//! Ledger event records and their JSON-lines form.

use crate::error::{LedgerError, Result};
use crate::hashing::content_hash_hex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WalletCreated,
    Minted,
    Transferred,
    Burned,
    Staked,
    Unstaked,
    LockupExpired,
    GovernanceStaked,
    GovernanceUnstaked,
    EpochProcessed,
    BlockSealed,
    ItemPurchased,
    FlashSaleActivated,
    FlashSaleDeactivated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WalletCreated => "mesh_credit_wallet_created",
            EventKind::Minted => "mesh_credit_minted",
            EventKind::Transferred => "mesh_credit_transferred",
            EventKind::Burned => "mesh_credit_burned",
            EventKind::Staked => "mesh_credit_staked",
            EventKind::Unstaked => "mesh_credit_unstaked",
            EventKind::LockupExpired => "mesh_credit_lockup_expired",
            EventKind::GovernanceStaked => "mesh_credit_governance_staked",
            EventKind::GovernanceUnstaked => "mesh_credit_governance_unstaked",
            EventKind::EpochProcessed => "mesh_credit_epoch_processed",
            EventKind::BlockSealed => "mesh_credit_block_sealed",
            EventKind::ItemPurchased => "mesh_credit_item_purchased",
            EventKind::FlashSaleActivated => "flash_sale_activated",
            EventKind::FlashSaleDeactivated => "flash_sale_deactivated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only ledger event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: String,
    /// Unix milliseconds
    pub timestamp: u64,
    pub data: Value,
    /// Hex SHA-256 over the canonical `{event, timestamp, data}`
    pub content_hash: String,
}

impl EventRecord {
    pub fn new(kind: EventKind, timestamp: u64, data: Value) -> Result<Self> {
        let event = kind.as_str().to_string();
        let content_hash = Self::compute_hash(&event, timestamp, &data)?;
        Ok(Self {
            event,
            timestamp,
            data,
            content_hash,
        })
    }

    fn compute_hash(event: &str, timestamp: u64, data: &Value) -> Result<String> {
        content_hash_hex(&json!({
            "event": event,
            "timestamp": timestamp,
            "data": data,
        }))
    }

    pub fn verify(&self) -> Result<()> {
        let expected = Self::compute_hash(&self.event, self.timestamp, &self.data)?;
        if expected != self.content_hash {
            return Err(LedgerError::IntegrityMismatch(format!(
                "event '{}' at {} hashes to {}, recorded {}",
                self.event, self.timestamp, expected, self.content_hash
            )));
        }
        Ok(())
    }
}

/// Write records one JSON object per line.
pub fn export_jsonl<W: Write>(records: &[EventRecord], mut writer: W) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSON-lines log, verifying every record's content hash.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<EventRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord = serde_json::from_str(&line).map_err(|e| {
            LedgerError::Serialization(format!("line {}: {}", line_no + 1, e))
        })?;
        record.verify()?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_record_hash_detects_tampering() {
        let mut record = EventRecord::new(
            EventKind::Minted,
            1_000,
            json!({"wallet": "alice", "amount": "100"}),
        )
        .unwrap();
        assert_eq!(record.event, "mesh_credit_minted");
        record.verify().unwrap();

        record.data["amount"] = json!("1000");
        assert!(record.verify().is_err());
    }

    #[test]
    fn test_jsonl_export_and_read() {
        let records = vec![
            EventRecord::new(EventKind::FlashSaleActivated, 1, json!({"multiplier": 2.0})).unwrap(),
            EventRecord::new(EventKind::FlashSaleDeactivated, 2, json!({"bonus": "100"})).unwrap(),
        ];
        let mut buf = Vec::new();
        export_jsonl(&records, &mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);

        let read = read_jsonl(Cursor::new(buf)).unwrap();
        assert_eq!(read, records);
    }

    #[test]
    fn test_read_jsonl_rejects_edited_line() {
        let record = EventRecord::new(EventKind::Burned, 5, json!({"amount": "3"})).unwrap();
        let line = serde_json::to_string(&record).unwrap().replace("\"3\"", "\"4\"");
        assert!(read_jsonl(Cursor::new(line)).is_err());
    }
}
