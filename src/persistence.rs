//! Database persistence layer for MeshCredit

use crate::audit::EventRecord;
use crate::error::{LedgerError, Result};
use crate::ledger::{Block, EconomyManifest};
use crate::proof::{ImmutableProof, ResonanceWeight};
use crate::service::LedgerMeta;
use crate::wallet::Wallet;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Everything one ledger operation changed. Backends apply a batch
/// all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    pub blocks: Vec<Block>,
    /// Wallets whose state changed; upserted by id
    pub wallets: Vec<Wallet>,
    pub proofs: Vec<ImmutableProof>,
    pub resonance: Vec<(String, ResonanceWeight)>,
    pub events: Vec<EventRecord>,
    pub meta: LedgerMeta,
    pub manifest: Option<EconomyManifest>,
}

/// The persisted ledger as a backend hands it back.
#[derive(Debug, Clone, Default)]
pub struct StoredLedger {
    pub blocks: Vec<Block>,
    pub wallets: Vec<Wallet>,
    pub proofs: Vec<ImmutableProof>,
    pub resonance: BTreeMap<String, ResonanceWeight>,
    pub meta: LedgerMeta,
}

/// Abstraction for persistence backends. Implementations must apply each
/// batch atomically.
pub trait Persistence: Send + Sync {
    fn commit(&self, batch: &CommitBatch) -> Result<()>;

    /// `None` when nothing has been committed yet.
    fn load(&self) -> Result<Option<StoredLedger>>;

    /// The event log in commit order.
    fn load_events(&self) -> Result<Vec<EventRecord>>;

    /// Most recently committed manifest.
    fn load_manifest(&self) -> Result<Option<EconomyManifest>>;
}

const META_KEY: &str = "ledger_meta";
const MANIFEST_KEY: &str = "economy_manifest";

pub struct Database {
    conn: Mutex<Connection>,
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::Database("Mutex poisoned".to_string())
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            LedgerError::Database(format!("Failed to open database {}: {}", path.display(), e))
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerError::Database(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS wallets (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS proofs (
                height INTEGER PRIMARY KEY,
                merkle_root TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS resonance (
                identity TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| LedgerError::Database(format!("Failed to create tables: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn load_rows<T: serde::de::DeserializeOwned>(conn: &Connection, sql: &str) -> Result<Vec<T>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| LedgerError::Database(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut items = Vec::new();
        for row in rows {
            let json = row.map_err(|e| LedgerError::Database(format!("Failed to read row: {}", e)))?;
            items.push(serde_json::from_str(&json)?);
        }
        Ok(items)
    }

    fn metadata_value(conn: &Connection, key: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?)
    }
}

impl Persistence for Database {
    fn commit(&self, batch: &CommitBatch) -> Result<()> {
        let conn_guard = self.conn.lock().map_err(poisoned)?;
        let tx = conn_guard
            .unchecked_transaction()
            .map_err(|e| LedgerError::Database(format!("Failed to start transaction: {}", e)))?;

        for block in &batch.blocks {
            tx.execute(
                "INSERT INTO blocks (height, hash, previous_hash, timestamp, data) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    block.header.index as i64,
                    block.hash_str(),
                    hex::encode(block.header.previous_hash),
                    block.header.timestamp as i64,
                    serde_json::to_string(block)?,
                ],
            )
            .map_err(|e| LedgerError::Database(format!("Failed to save block {}: {}", block.header.index, e)))?;
        }

        for wallet in &batch.wallets {
            tx.execute(
                "INSERT OR REPLACE INTO wallets (id, data) VALUES (?1, ?2)",
                params![wallet.id, serde_json::to_string(wallet)?],
            )
            .map_err(|e| LedgerError::Database(format!("Failed to save wallet {}: {}", wallet.id, e)))?;
        }

        for proof in &batch.proofs {
            tx.execute(
                "INSERT INTO proofs (height, merkle_root, data) VALUES (?1, ?2, ?3)",
                params![proof.height as i64, proof.merkle_root, serde_json::to_string(proof)?],
            )
            .map_err(|e| LedgerError::Database(format!("Failed to save proof {}: {}", proof.height, e)))?;
        }

        for (identity, weight) in &batch.resonance {
            tx.execute(
                "INSERT OR REPLACE INTO resonance (identity, data) VALUES (?1, ?2)",
                params![identity, serde_json::to_string(weight)?],
            )?;
        }

        for event in &batch.events {
            tx.execute(
                "INSERT INTO events (event, timestamp, content_hash, data) VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.event,
                    event.timestamp as i64,
                    event.content_hash,
                    serde_json::to_string(event)?,
                ],
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![META_KEY, serde_json::to_string(&batch.meta)?],
        )?;
        if let Some(manifest) = &batch.manifest {
            tx.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![MANIFEST_KEY, serde_json::to_string(manifest)?],
            )?;
        }

        // Commit all changes atomically
        tx.commit()
            .map_err(|e| LedgerError::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!(
            blocks = batch.blocks.len(),
            wallets = batch.wallets.len(),
            proofs = batch.proofs.len(),
            events = batch.events.len(),
            "ledger batch committed"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredLedger>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let meta = match Self::metadata_value(&conn, META_KEY)? {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok(None),
        };

        let blocks = Self::load_rows(&conn, "SELECT data FROM blocks ORDER BY height ASC")?;
        let wallets = Self::load_rows(&conn, "SELECT data FROM wallets ORDER BY id ASC")?;
        let proofs = Self::load_rows(&conn, "SELECT data FROM proofs ORDER BY height ASC")?;

        let mut resonance = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT identity, data FROM resonance")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (identity, json) = row?;
            resonance.insert(identity, serde_json::from_str(&json)?);
        }

        Ok(Some(StoredLedger {
            blocks,
            wallets,
            proofs,
            resonance,
            meta,
        }))
    }

    fn load_events(&self) -> Result<Vec<EventRecord>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Self::load_rows(&conn, "SELECT data FROM events ORDER BY seq ASC")
    }

    fn load_manifest(&self) -> Result<Option<EconomyManifest>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        match Self::metadata_value(&conn, MANIFEST_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    committed: bool,
    blocks: Vec<Block>,
    wallets: BTreeMap<String, Wallet>,
    proofs: Vec<ImmutableProof>,
    resonance: BTreeMap<String, ResonanceWeight>,
    events: Vec<EventRecord>,
    meta: LedgerMeta,
    manifest: Option<EconomyManifest>,
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
/// Clones share the same storage, so a ledger can be reopened from it.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn commit(&self, batch: &CommitBatch) -> Result<()> {
        let mut st = self.state.lock().map_err(poisoned)?;

        let next_height = st.blocks.len() as u64;
        if let Some(block) = batch
            .blocks
            .iter()
            .enumerate()
            .find(|(i, b)| b.header.index != next_height + *i as u64)
        {
            return Err(LedgerError::Database(format!(
                "block {} is already stored",
                block.1.header.index
            )));
        }

        st.committed = true;
        st.blocks.extend(batch.blocks.iter().cloned());
        for wallet in &batch.wallets {
            st.wallets.insert(wallet.id.clone(), wallet.clone());
        }
        st.proofs.extend(batch.proofs.iter().cloned());
        for (identity, weight) in &batch.resonance {
            st.resonance.insert(identity.clone(), weight.clone());
        }
        st.events.extend(batch.events.iter().cloned());
        st.meta = batch.meta.clone();
        if let Some(manifest) = &batch.manifest {
            st.manifest = Some(manifest.clone());
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredLedger>> {
        let st = self.state.lock().map_err(poisoned)?;
        if !st.committed {
            return Ok(None);
        }
        Ok(Some(StoredLedger {
            blocks: st.blocks.clone(),
            wallets: st.wallets.values().cloned().collect(),
            proofs: st.proofs.clone(),
            resonance: st.resonance.clone(),
            meta: st.meta.clone(),
        }))
    }

    fn load_events(&self) -> Result<Vec<EventRecord>> {
        let st = self.state.lock().map_err(poisoned)?;
        Ok(st.events.clone())
    }

    fn load_manifest(&self) -> Result<Option<EconomyManifest>> {
        let st = self.state.lock().map_err(poisoned)?;
        Ok(st.manifest.clone())
    }
}
