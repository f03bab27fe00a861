use crate::error::{GaggleError, Result};
use crate::replicator::state_machine::SharedState;
use openraft::storage::{Adaptor, LogState, RaftStorage};
use openraft::{
    Entry, EntryPayload, ErrorSubject, ErrorVerb, LogId, OptionalSend, RaftLogReader,
    RaftSnapshotBuilder, Snapshot, SnapshotMeta, StorageError, StoredMembership, Vote,
};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io::Cursor;
use std::ops::{Bound, RangeBounds};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub type NodeIdType = u64;

openraft::declare_raft_types!(
    pub TypeConfig:
        D = RoleEntry,
        R = (),
        Node = GaggleNode,
);

/// A committed log payload. Applied verbatim as the new role label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleEntry {
    pub payload: Vec<u8>,
}

impl RoleEntry {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

/// Engine-level node record. `addr` is the consensus address, which is also
/// the member id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GaggleNode {
    pub addr: String,
}

impl std::fmt::Display for GaggleNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Maps a member id onto the numeric id the engine keys nodes by (FNV-1a).
pub fn engine_node_id(member_id: &str) -> NodeIdType {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    member_id
        .bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}

const KEY_VOTE: &[u8] = b"vote";
const KEY_LAST_PURGED: &[u8] = b"last_purged";
const KEY_LAST_APPLIED: &[u8] = b"last_applied";
const KEY_MEMBERSHIP: &[u8] = b"membership";
const KEY_SNAPSHOT_IDX: &[u8] = b"snapshot_idx";
const KEY_STATE: &[u8] = b"role_state";
const KEY_CURRENT_SNAPSHOT: &[u8] = b"current_snapshot";

#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    meta: SnapshotMeta<NodeIdType, GaggleNode>,
    data: Vec<u8>,
}

fn io_error<E>(subject: ErrorSubject<NodeIdType>, verb: ErrorVerb, e: E) -> StorageError<NodeIdType>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    StorageError::from_io_error(subject, verb, std::io::Error::other(e))
}

#[derive(Clone)]
pub struct SledStorage {
    log_tree: sled::Tree,
    meta_tree: sled::Tree,
    state: SharedState,
    snapshot_idx: Arc<AtomicU64>,
}

impl SledStorage {
    /// Opens the store and restores the last persisted role state.
    ///
    /// A state record that fails to decode is returned as
    /// [`GaggleError::Decode`]; the node must not start on unknown state.
    pub fn new<P: AsRef<Path>>(path: P, state: SharedState) -> Result<Self> {
        let db = sled::open(path)?;
        let log_tree = db.open_tree("raft_log")?;
        let meta_tree = db.open_tree("raft_meta")?;

        let snapshot_idx = match meta_tree.get(KEY_SNAPSHOT_IDX)? {
            Some(v) => bincode::deserialize(&v).map_err(|e| GaggleError::Decode(e.to_string()))?,
            None => 0,
        };

        if let Some(data) = meta_tree.get(KEY_STATE)? {
            state.restore(&data)?;
            info!("Restored role state from local store");
        }

        Ok(Self {
            log_tree,
            meta_tree,
            state,
            snapshot_idx: Arc::new(AtomicU64::new(snapshot_idx)),
        })
    }

    fn log_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }

    fn read_meta<T: serde::de::DeserializeOwned>(
        &self,
        key: &[u8],
        subject: ErrorSubject<NodeIdType>,
    ) -> std::result::Result<Option<T>, StorageError<NodeIdType>> {
        let Some(raw) = self
            .meta_tree
            .get(key)
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Read, e))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| io_error(subject, ErrorVerb::Read, e))
    }

    fn write_meta<T: Serialize>(
        &self,
        key: &[u8],
        value: &T,
        subject: ErrorSubject<NodeIdType>,
    ) -> std::result::Result<(), StorageError<NodeIdType>> {
        let data =
            serde_json::to_vec(value).map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e))?;
        self.meta_tree
            .insert(key, data)
            .map_err(|e| io_error(subject, ErrorVerb::Write, e))?;
        Ok(())
    }

    fn last_applied(&self) -> std::result::Result<Option<LogId<NodeIdType>>, StorageError<NodeIdType>> {
        self.read_meta(KEY_LAST_APPLIED, ErrorSubject::StateMachine)
    }

    fn membership(
        &self,
    ) -> std::result::Result<StoredMembership<NodeIdType, GaggleNode>, StorageError<NodeIdType>> {
        Ok(self
            .read_meta(KEY_MEMBERSHIP, ErrorSubject::StateMachine)?
            .unwrap_or_default())
    }

    /// Writes the applied log id, membership and role state in one batch so a
    /// restart never sees one without the others.
    fn persist_applied(
        &self,
        last_applied: Option<LogId<NodeIdType>>,
        membership: &StoredMembership<NodeIdType, GaggleNode>,
    ) -> std::result::Result<(), StorageError<NodeIdType>> {
        let subject = ErrorSubject::StateMachine;
        let snapshot = self
            .state
            .snapshot()
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e.to_string()))?;

        let mut batch = sled::Batch::default();
        batch.insert(KEY_STATE, snapshot.data());
        if let Some(log_id) = last_applied {
            let data = serde_json::to_vec(&log_id)
                .map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e))?;
            batch.insert(KEY_LAST_APPLIED, data);
        }
        let data = serde_json::to_vec(membership)
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e))?;
        batch.insert(KEY_MEMBERSHIP, data);
        self.state.release(snapshot);

        self.meta_tree
            .apply_batch(batch)
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e))?;
        self.meta_tree
            .flush()
            .map_err(|e| io_error(subject, ErrorVerb::Write, e))?;
        Ok(())
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.state
    }
}

impl RaftLogReader<TypeConfig> for SledStorage {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> std::result::Result<Vec<Entry<TypeConfig>>, StorageError<NodeIdType>> {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => Some(e + 1),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => None,
        };

        let mut entries = Vec::new();
        for item in self.log_tree.range(Self::log_key(start)..) {
            let (key, value) = item.map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Read, e))?;

            let index = key
                .as_ref()
                .try_into()
                .map(u64::from_be_bytes)
                .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Read, e))?;
            if end.is_some_and(|e| index >= e) {
                break;
            }

            let entry: Entry<TypeConfig> = serde_json::from_slice(&value)
                .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Read, e))?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

impl RaftSnapshotBuilder<TypeConfig> for SledStorage {
    async fn build_snapshot(
        &mut self,
    ) -> std::result::Result<Snapshot<TypeConfig>, StorageError<NodeIdType>> {
        let subject = ErrorSubject::Snapshot(None);
        let snapshot = self
            .state
            .snapshot()
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Read, e.to_string()))?;
        let data = snapshot.data().to_vec();
        self.state.release(snapshot);

        let last_applied = self.last_applied()?;
        let last_membership = self.membership()?;

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::SeqCst) + 1;
        let idx_data = bincode::serialize(&snapshot_idx)
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e))?;
        self.meta_tree
            .insert(KEY_SNAPSHOT_IDX, idx_data)
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Write, e))?;

        let snapshot_id = format!(
            "{}-{}-{}",
            last_applied
                .map(|l| l.leader_id.to_string())
                .unwrap_or_default(),
            last_applied.map(|l| l.index).unwrap_or(0),
            snapshot_idx
        );

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership,
            snapshot_id,
        };

        self.write_meta(
            KEY_CURRENT_SNAPSHOT,
            &StoredSnapshot {
                meta: meta.clone(),
                data: data.clone(),
            },
            subject,
        )?;

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStorage<TypeConfig> for SledStorage {
    type LogReader = Self;
    type SnapshotBuilder = Self;

    async fn get_log_state(
        &mut self,
    ) -> std::result::Result<LogState<TypeConfig>, StorageError<NodeIdType>> {
        let last_purged: Option<LogId<NodeIdType>> =
            self.read_meta(KEY_LAST_PURGED, ErrorSubject::Logs)?;

        let last_entry = self
            .log_tree
            .last()
            .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Read, e))?;
        let last_log_id = match last_entry {
            Some((_, v)) => {
                let entry: Entry<TypeConfig> = serde_json::from_slice(&v)
                    .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Read, e))?;
                Some(entry.log_id)
            }
            None => last_purged,
        };

        Ok(LogState {
            last_purged_log_id: last_purged,
            last_log_id,
        })
    }

    async fn save_vote(
        &mut self,
        vote: &Vote<NodeIdType>,
    ) -> std::result::Result<(), StorageError<NodeIdType>> {
        self.write_meta(KEY_VOTE, vote, ErrorSubject::Vote)?;
        self.meta_tree
            .flush()
            .map_err(|e| io_error(ErrorSubject::Vote, ErrorVerb::Write, e))?;
        Ok(())
    }

    async fn read_vote(
        &mut self,
    ) -> std::result::Result<Option<Vote<NodeIdType>>, StorageError<NodeIdType>> {
        self.read_meta(KEY_VOTE, ErrorSubject::Vote)
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn append_to_log<I>(&mut self, entries: I) -> std::result::Result<(), StorageError<NodeIdType>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
    {
        for entry in entries {
            let key = Self::log_key(entry.log_id.index);
            let value = serde_json::to_vec(&entry)
                .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Write, e))?;
            self.log_tree
                .insert(key, value)
                .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Write, e))?;
        }
        self.log_tree
            .flush()
            .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Write, e))?;
        Ok(())
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId<NodeIdType>,
    ) -> std::result::Result<(), StorageError<NodeIdType>> {
        let keys: Vec<_> = self
            .log_tree
            .range(Self::log_key(log_id.index)..)
            .filter_map(|r| r.ok().map(|(k, _)| k))
            .collect();

        for key in keys {
            self.log_tree
                .remove(key)
                .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Delete, e))?;
        }
        Ok(())
    }

    async fn purge_logs_upto(
        &mut self,
        log_id: LogId<NodeIdType>,
    ) -> std::result::Result<(), StorageError<NodeIdType>> {
        self.write_meta(KEY_LAST_PURGED, &log_id, ErrorSubject::Logs)?;

        let keys: Vec<_> = self
            .log_tree
            .range(..=Self::log_key(log_id.index))
            .filter_map(|r| r.ok().map(|(k, _)| k))
            .collect();

        for key in keys {
            self.log_tree
                .remove(key)
                .map_err(|e| io_error(ErrorSubject::Logs, ErrorVerb::Delete, e))?;
        }
        Ok(())
    }

    async fn last_applied_state(
        &mut self,
    ) -> std::result::Result<
        (
            Option<LogId<NodeIdType>>,
            StoredMembership<NodeIdType, GaggleNode>,
        ),
        StorageError<NodeIdType>,
    > {
        Ok((self.last_applied()?, self.membership()?))
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<TypeConfig>],
    ) -> std::result::Result<Vec<()>, StorageError<NodeIdType>> {
        let mut membership = self.membership()?;
        let mut last_applied = None;
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            last_applied = Some(entry.log_id);

            match &entry.payload {
                EntryPayload::Blank => {}
                EntryPayload::Normal(role_entry) => {
                    self.state.apply(&role_entry.payload);
                }
                EntryPayload::Membership(mem) => {
                    membership = StoredMembership::new(Some(entry.log_id), mem.clone());
                }
            }
            results.push(());
        }

        self.persist_applied(last_applied, &membership)?;
        Ok(results)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> std::result::Result<Box<Cursor<Vec<u8>>>, StorageError<NodeIdType>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeIdType, GaggleNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> std::result::Result<(), StorageError<NodeIdType>> {
        let subject = ErrorSubject::Snapshot(Some(meta.signature()));
        let data = snapshot.into_inner();

        self.state
            .restore(&data)
            .map_err(|e| io_error(subject.clone(), ErrorVerb::Read, e.to_string()))?;

        self.persist_applied(meta.last_log_id, &meta.last_membership)?;
        self.write_meta(
            KEY_CURRENT_SNAPSHOT,
            &StoredSnapshot {
                meta: meta.clone(),
                data,
            },
            subject,
        )?;

        info!("Installed snapshot {}", meta.snapshot_id);
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> std::result::Result<Option<Snapshot<TypeConfig>>, StorageError<NodeIdType>> {
        let stored: Option<StoredSnapshot> =
            self.read_meta(KEY_CURRENT_SNAPSHOT, ErrorSubject::Snapshot(None))?;
        Ok(stored.map(|s| Snapshot {
            meta: s.meta,
            snapshot: Box::new(Cursor::new(s.data)),
        }))
    }
}

pub type SledAdaptorLogStore = Adaptor<TypeConfig, SledStorage>;
pub type SledAdaptorStateMachine = Adaptor<TypeConfig, SledStorage>;

pub fn create_storage<P: AsRef<Path>>(
    path: P,
    state: SharedState,
) -> Result<(SledAdaptorLogStore, SledAdaptorStateMachine)> {
    let storage = SledStorage::new(path, state)?;
    Ok(Adaptor::new(storage))
}
