//! Revision store for schema snapshots and applied migrations.
//!
//! Every committed schema is kept as its declarations, keyed by revision,
//! next to the record of the migration that produced it.

mod record;

pub use record::{current_timestamp, MigrationRecord, MigrationStatus};

use crate::catalog::{SchemaSnapshot, SchemaSource};
use crate::error::Error;
use sled::{Db, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Tree name for schema revisions.
const REVISION_TREE: &str = "typeshift:revisions";

/// Tree name for store metadata.
const META_TREE: &str = "typeshift:meta";

/// Tree name for migration records.
const MIGRATION_TREE: &str = "typeshift:migrations";

/// Key for the current revision in the meta tree.
const CURRENT_REVISION_KEY: &[u8] = b"current_revision";

fn decode_revision(bytes: &[u8]) -> Result<u64, Error> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::InvalidData(format!("revision key of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(buf))
}

/// sled-backed history of schema revisions.
pub struct RevisionStore {
    revisions: Tree,
    meta: Tree,
    migrations: Tree,
    current_revision: AtomicU64,
}

impl RevisionStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = sled::open(path)?;
        Self::open_db(&db)
    }

    /// Open or create a store inside an existing sled database.
    pub fn open_db(db: &Db) -> Result<Self, Error> {
        let revisions = db.open_tree(REVISION_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        let migrations = db.open_tree(MIGRATION_TREE)?;

        let current_revision = match meta.get(CURRENT_REVISION_KEY)? {
            Some(bytes) => decode_revision(&bytes)?,
            None => 0,
        };
        debug!(current_revision, "revision store opened");

        Ok(Self {
            revisions,
            meta,
            migrations,
            current_revision: AtomicU64::new(current_revision),
        })
    }

    /// The latest committed revision, 0 when nothing was committed.
    pub fn current_revision(&self) -> u64 {
        self.current_revision.load(Ordering::SeqCst)
    }

    /// The latest committed snapshot.
    pub fn current(&self) -> Result<Option<SchemaSnapshot>, Error> {
        match self.current_revision() {
            0 => Ok(None),
            revision => self.snapshot_at(revision),
        }
    }

    /// The snapshot committed at a revision.
    pub fn snapshot_at(&self, revision: u64) -> Result<Option<SchemaSnapshot>, Error> {
        match self.revisions.get(revision.to_be_bytes())? {
            Some(bytes) => {
                let mut source = SchemaSource::from_bytes(&bytes)?;
                source.revision = revision;
                Ok(Some(source.build()?))
            }
            None => Ok(None),
        }
    }

    /// Commit the successor of the current revision.
    ///
    /// The snapshot's revision must be exactly one past the current one.
    /// The current-revision marker is written last.
    pub fn commit(&self, snapshot: &SchemaSnapshot, record: &MigrationRecord) -> Result<u64, Error> {
        let expected = self.current_revision() + 1;
        for found in [snapshot.revision(), record.to_revision] {
            if found != expected {
                return Err(Error::RevisionConflict { expected, found });
            }
        }

        let key = expected.to_be_bytes();
        self.migrations.insert(key, record.to_bytes()?)?;
        self.revisions.insert(key, snapshot.to_source().to_bytes()?)?;
        self.meta.insert(CURRENT_REVISION_KEY, &key)?;
        self.current_revision.store(expected, Ordering::SeqCst);

        info!(
            revision = expected,
            migration = %record.id_hex(),
            fingerprint = %snapshot.fingerprint_hex(),
            "revision committed"
        );
        Ok(expected)
    }

    /// Every committed migration, oldest first.
    pub fn history(&self) -> Result<Vec<MigrationRecord>, Error> {
        let mut records = Vec::new();
        for result in self.migrations.iter() {
            let (_, value) = result?;
            records.push(MigrationRecord::from_bytes(&value)?);
        }
        Ok(records)
    }

    /// Every committed revision number, ascending.
    pub fn revisions(&self) -> Result<Vec<u64>, Error> {
        let mut revisions = Vec::new();
        for result in self.revisions.iter() {
            let (key, _) = result?;
            revisions.push(decode_revision(&key)?);
        }
        Ok(revisions)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.migrations.flush()?;
        self.revisions.flush()?;
        self.meta.flush()?;
        Ok(())
    }
}
