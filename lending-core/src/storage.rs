//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `meta` - Owner, pool balance and next loan id
//! - `lenders` - Lender records (key: account id)
//! - `loans` - Loan records (key: loan id, big-endian)
//! - `events` - Append-only event journal (key: sequence, big-endian)
//!
//! Each committed mutation is written as one [`WriteBatch`] holding only the
//! records it touched and the events it appended.

use crate::{
    config::StorageConfig,
    loans::LoanRegistry,
    pool::{LenderRecord, PoolLedger},
    types::{AccountId, EventRecord, LoanId, LoanRecord},
    Error, Result,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompressionType, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Column family names
const CF_META: &str = "meta";
const CF_LENDERS: &str = "lenders";
const CF_LOANS: &str = "loans";
const CF_EVENTS: &str = "events";

const KEY_OWNER: &[u8] = b"owner";
const KEY_TOTAL_POOL: &[u8] = b"total_pool";
const KEY_NEXT_LOAN_ID: &[u8] = b"next_loan_id";

/// Ledger state recovered at startup
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    /// Owner fixed at creation
    pub owner: AccountId,
    /// Pool ledger
    pub pool: PoolLedger,
    /// Loan registry
    pub loans: LoanRegistry,
    /// Event journal, oldest first
    pub journal: Vec<EventRecord>,
}

/// Records written by one commit
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset {
    /// Ledger owner
    pub owner: AccountId,
    /// Pool balance after the commit
    pub total_pool: Decimal,
    /// Id the next request will receive
    pub next_loan_id: LoanId,
    /// Lender records touched
    pub lenders: Vec<(AccountId, LenderRecord)>,
    /// Loan records touched
    pub loans: Vec<LoanRecord>,
    /// Events appended
    pub events: Vec<EventRecord>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    path: PathBuf,
    sync_writes: bool,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("sync_writes", &self.sync_writes)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_LENDERS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_LOANS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self {
            db,
            path: path.clone(),
            sync_writes: config.sync_writes,
        })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Records are rewritten in place and read at startup
        opts.set_compression_type(DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Load the persisted ledger, if any commit was ever written
    pub fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let owner: AccountId = match self.db.get_cf(self.cf_handle(CF_META)?, KEY_OWNER)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };
        let total_pool: Decimal = self.get_meta(KEY_TOTAL_POOL)?;
        let next_loan_id: LoanId = self.get_meta(KEY_NEXT_LOAN_ID)?;

        let mut lenders: BTreeMap<AccountId, LenderRecord> = BTreeMap::new();
        for item in self
            .db
            .iterator_cf(self.cf_handle(CF_LENDERS)?, IteratorMode::Start)
        {
            let (key, value) = item?;
            let lender = String::from_utf8(key.to_vec())
                .map_err(|e| Error::Storage(format!("Invalid lender key: {}", e)))?;
            lenders.insert(AccountId::new(lender), bincode::deserialize(&value)?);
        }

        let loans: Vec<LoanRecord> = self.scan(CF_LOANS)?;
        let journal: Vec<EventRecord> = self.scan(CF_EVENTS)?;

        tracing::info!(
            lenders = lenders.len(),
            loans = loans.len(),
            events = journal.len(),
            "Loaded ledger state from {:?}",
            self.path
        );

        Ok(Some(LedgerSnapshot {
            owner,
            pool: PoolLedger::from_parts(total_pool, lenders),
            loans: LoanRegistry::from_parts(loans, next_loan_id),
            journal,
        }))
    }

    /// Write one commit atomically
    pub fn commit(&self, changes: &Changeset) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Metadata
        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, KEY_OWNER, bincode::serialize(&changes.owner)?);
        batch.put_cf(cf_meta, KEY_TOTAL_POOL, bincode::serialize(&changes.total_pool)?);
        batch.put_cf(
            cf_meta,
            KEY_NEXT_LOAN_ID,
            bincode::serialize(&changes.next_loan_id)?,
        );

        // 2. Touched records
        let cf_lenders = self.cf_handle(CF_LENDERS)?;
        for (lender, record) in &changes.lenders {
            batch.put_cf(cf_lenders, lender.as_str().as_bytes(), bincode::serialize(record)?);
        }

        let cf_loans = self.cf_handle(CF_LOANS)?;
        for loan in &changes.loans {
            batch.put_cf(cf_loans, loan.loan_id.get().to_be_bytes(), bincode::serialize(loan)?);
        }

        // 3. Journal
        let cf_events = self.cf_handle(CF_EVENTS)?;
        for record in &changes.events {
            batch.put_cf(cf_events, record.sequence.to_be_bytes(), bincode::serialize(record)?);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            lenders = changes.lenders.len(),
            loans = changes.loans.len(),
            events = changes.events.len(),
            "Changes committed"
        );
        Ok(())
    }

    fn get_meta<T: DeserializeOwned>(&self, key: &[u8]) -> Result<T> {
        let value = self
            .db
            .get_cf(self.cf_handle(CF_META)?, key)?
            .ok_or_else(|| {
                Error::Storage(format!(
                    "Missing metadata key {}",
                    String::from_utf8_lossy(key)
                ))
            })?;
        Ok(bincode::deserialize(&value)?)
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        self.db
            .iterator_cf(self.cf_handle(name)?, IteratorMode::Start)
            .map(|item| -> Result<T> {
                let (_, value) = item?;
                Ok(bincode::deserialize(&value)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedgerEvent;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_config() -> (StorageConfig, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            enabled: true,
            data_dir: temp_dir.path().join("lending"),
            sync_writes: false,
            ..StorageConfig::default()
        };
        (config, temp_dir)
    }

    fn event(sequence: u64, event: LedgerEvent) -> EventRecord {
        EventRecord {
            sequence,
            event_id: Uuid::now_v7(),
            recorded_at: Utc::now(),
            event,
        }
    }

    fn deposit_changes(lender: &AccountId, amount: Decimal, sequence: u64) -> Changeset {
        Changeset {
            owner: AccountId::new("owner"),
            total_pool: amount,
            next_loan_id: LoanId::FIRST,
            lenders: vec![(
                lender.clone(),
                LenderRecord {
                    deposited: amount,
                    withdrawn: Decimal::ZERO,
                },
            )],
            loans: Vec::new(),
            events: vec![event(
                sequence,
                LedgerEvent::DepositMade {
                    lender: lender.clone(),
                    amount,
                },
            )],
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_META).is_some());
        assert!(storage.db.cf_handle(CF_EVENTS).is_some());
    }

    #[test]
    fn test_empty_store_has_no_state() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_commit_and_load() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let lender = AccountId::new("lender1");

        storage
            .commit(&deposit_changes(&lender, Decimal::new(15, 1), 1))
            .unwrap();

        let mut loans = LoanRegistry::new();
        let loan_id = loans.create(AccountId::new("borrower1"), Decimal::new(5, 2), 500, Utc::now());
        let loan = loans.get(loan_id).unwrap().clone();
        storage
            .commit(&Changeset {
                owner: AccountId::new("owner"),
                total_pool: Decimal::new(15, 1),
                next_loan_id: loans.next_id(),
                lenders: Vec::new(),
                loans: vec![loan],
                events: vec![event(
                    2,
                    LedgerEvent::LoanRequested {
                        loan_id,
                        borrower: AccountId::new("borrower1"),
                        amount: Decimal::new(5, 2),
                    },
                )],
            })
            .unwrap();

        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.owner, AccountId::new("owner"));
        assert_eq!(loaded.pool.total_pool(), Decimal::new(15, 1));
        assert_eq!(loaded.pool.lender_info(&lender).deposited, Decimal::new(15, 1));
        assert_eq!(loaded.loans, loans);
        assert_eq!(
            loaded.journal.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_commit_overwrites_touched_records_only() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let first = AccountId::new("first");
        let second = AccountId::new("second");

        storage.commit(&deposit_changes(&first, Decimal::ONE, 1)).unwrap();
        let mut changes = deposit_changes(&second, Decimal::TWO, 2);
        changes.total_pool = Decimal::new(3, 0);
        storage.commit(&changes).unwrap();

        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.pool.lender_info(&first).deposited, Decimal::ONE);
        assert_eq!(loaded.pool.lender_info(&second).deposited, Decimal::TWO);
        assert_eq!(loaded.pool.total_pool(), Decimal::new(3, 0));
        assert_eq!(loaded.journal.len(), 2);
    }

    #[test]
    fn test_reopen_reads_committed_state() {
        let (config, _temp) = test_config();
        let lender = AccountId::new("lender1");
        {
            let storage = Storage::open(&config).unwrap();
            storage.commit(&deposit_changes(&lender, Decimal::ONE, 1)).unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.pool.total_pool(), Decimal::ONE);
        assert_eq!(loaded.journal.len(), 1);
    }
}
