//! redb-backed entry store
//!
//! Tables (all `&[u8] -> &[u8]`, keys built in `keys`):
//! - `bundles`:    timestamp ++ medallion -> raw bundle bytes
//! - `chains`:     medallion ++ chainStart -> ChainInfoProto (watermark)
//! - `claims`:     medallion ++ chainStart -> ClaimedChain
//! - `containers`: muid -> ContainerProto
//! - `entries`:    container ++ behavior ++ key ++ entryId -> EntryRecord
//! - `exits`:      container ++ entryId ++ movementId -> dest (empty for a removal)
//! - `pointees`:   pointee ++ entry row key -> ()

use crate::error::StoreError;
use crate::keys::{self, MUID_LEN};
use crate::store::EntryStore;
use prost::Message;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use strand_model::proto::{
    change_proto, ChainInfoProto, ChangeProto, ClaimedChain, ContainerProto, EntryRecord,
};
use strand_model::{
    AsOf, Behavior, BundleInfo, ChainKey, CodecError, Entry, EntryKey, Muid, ParsedBundle,
    StorageConfig, Timestamp,
};
use strand_sync::ChainTracker;
use tracing::{debug, trace};

pub const TABLE_BUNDLES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bundles");
pub const TABLE_CHAINS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("chains");
pub const TABLE_CLAIMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("claims");
pub const TABLE_CONTAINERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("containers");
pub const TABLE_ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");
pub const TABLE_EXITS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("exits");
pub const TABLE_POINTEES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pointees");

const EMPTY: &[u8] = &[];

type Table = ReadOnlyTable<&'static [u8], &'static [u8]>;
type Rows = Vec<(Vec<u8>, Vec<u8>)>;

/// Sort position of an ordered entry: its entry id timestamp, or the
/// destination of the movement that last placed it. Ties break on the id.
type Position = (Timestamp, Muid);

/// Where the movements of one entry leave it at a cutoff.
enum Placement {
    Original,
    Moved { dest: Timestamp, movement: Muid },
    Exited,
}

fn scan_prefix(table: &Table, prefix: &[u8]) -> Result<Rows, StoreError> {
    let end = keys::prefix_end(prefix);
    let range = match &end {
        Some(end) => table.range(prefix..end.as_slice())?,
        None => table.range(prefix..)?,
    };
    let mut rows = Vec::new();
    for item in range {
        let (k, v) = item?;
        rows.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(rows)
}

/// Entry id timestamp from the tail of an entry row key.
fn row_timestamp(row: &[u8]) -> Result<Timestamp, StoreError> {
    let start = row
        .len()
        .checked_sub(MUID_LEN)
        .ok_or_else(|| StoreError::Corrupt("short entry row".into()))?;
    keys::muid_timestamp(&row[start..])
}

fn decode_entry(bytes: &[u8]) -> Result<Entry, StoreError> {
    Ok(Entry::from_record(&EntryRecord::decode(bytes)?)?)
}

/// Link rule shared with the chain tracker, with distinct errors for a
/// broken link and a chain we have never seen the start of.
fn check_link(info: &BundleInfo, seen_through: Option<Timestamp>) -> Result<(), StoreError> {
    match seen_through {
        Some(seen) if info.prior_time == Some(seen) => Ok(()),
        Some(seen) => Err(StoreError::InvalidChainExtension {
            chain: info.chain(),
            seen_through: seen,
            timestamp: info.timestamp,
            prior_time: info.prior_time,
        }),
        None if info.is_chain_start() => Ok(()),
        None if info.timestamp == info.chain_start => Err(StoreError::InvalidChainExtension {
            chain: info.chain(),
            seen_through: 0,
            timestamp: info.timestamp,
            prior_time: info.prior_time,
        }),
        None => Err(StoreError::MissingPriorLink {
            chain: info.chain(),
            timestamp: info.timestamp,
            prior_time: info.prior_time,
        }),
    }
}

/// Entry store over a redb database, on disk or in memory.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        let db = match config {
            StorageConfig::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                match Database::create(path) {
                    Ok(db) => db,
                    Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                        return Err(StoreError::StoreLocked(path.clone()))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            StorageConfig::InMemory => {
                Database::builder().create_with_backend(InMemoryBackend::new())?
            }
        };

        // Create every table up front so readers never see a missing one.
        let txn = db.begin_write()?;
        for table in [
            TABLE_BUNDLES,
            TABLE_CHAINS,
            TABLE_CLAIMS,
            TABLE_CONTAINERS,
            TABLE_ENTRIES,
            TABLE_EXITS,
            TABLE_POINTEES,
        ] {
            txn.open_table(table)?;
        }
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(&StorageConfig::InMemory)
    }

    /// Apply a bundle, calling `before_commit` once it is known to be novel
    /// and valid. The transaction commits only if the hook succeeds.
    pub fn add_bundle_with(
        &self,
        bytes: &[u8],
        before_commit: &mut dyn FnMut(&BundleInfo) -> Result<(), StoreError>,
    ) -> Result<(BundleInfo, bool), StoreError> {
        let parsed = ParsedBundle::decode(bytes)?;
        let info = parsed.info.clone();
        let bundle = parsed.medallion_and_timestamp();

        let txn = self.db.begin_write()?;
        {
            let mut chains = txn.open_table(TABLE_CHAINS)?;
            let chain_key = keys::chain(info.chain());
            let seen_through = match chains.get(chain_key.as_slice())? {
                Some(row) => Some(ChainInfoProto::decode(row.value())?.timestamp),
                None => None,
            };
            if seen_through.is_some_and(|seen| info.timestamp <= seen) {
                debug!(bundle = %info, "bundle already applied");
                return Ok((info, false));
            }
            check_link(&info, seen_through)?;
            chains.insert(chain_key.as_slice(), info.to_proto().encode_to_vec().as_slice())?;
        }
        {
            let mut bundles = txn.open_table(TABLE_BUNDLES)?;
            let mut containers = txn.open_table(TABLE_CONTAINERS)?;
            let mut entries = txn.open_table(TABLE_ENTRIES)?;
            let mut exits = txn.open_table(TABLE_EXITS)?;
            let mut pointees = txn.open_table(TABLE_POINTEES)?;

            bundles.insert(keys::bundle(info.timestamp, info.medallion).as_slice(), bytes)?;

            for (offset, ChangeProto { kind }) in &parsed.proto.changes {
                let offset = i32::try_from(*offset)
                    .map_err(|_| StoreError::UnsupportedChange(format!("offset {}", offset)))?;
                let change_id = Muid::new(info.timestamp, info.medallion, offset);
                match kind {
                    Some(change_proto::Kind::Container(container)) => {
                        containers.insert(
                            keys::muid(&change_id).as_slice(),
                            container.encode_to_vec().as_slice(),
                        )?;
                    }
                    Some(change_proto::Kind::Entry(change)) => {
                        let entry = Entry::from_change(change, change_id, bundle)?;
                        let row = keys::entry_row(&entry.container, entry.behavior, &entry.key, &change_id);
                        entries.insert(row.as_slice(), entry.to_record()?.encode_to_vec().as_slice())?;
                        if let Some(pointee) = entry.pointee {
                            pointees.insert(keys::pointee_row(&pointee, &row).as_slice(), EMPTY)?;
                        }
                    }
                    Some(change_proto::Kind::Movement(movement)) => {
                        let entry_id = required_muid(movement.entry.as_ref(), "movement.entry", bundle)?;
                        let container =
                            required_muid(movement.container.as_ref(), "movement.container", bundle)?;
                        let row = keys::exit_row(&container, &entry_id, &change_id);
                        if movement.dest == 0 {
                            exits.insert(row.as_slice(), EMPTY)?;
                        } else {
                            exits.insert(row.as_slice(), keys::encode_i64(movement.dest).as_slice())?;
                        }
                    }
                    None => {
                        return Err(StoreError::UnsupportedChange(format!("empty change {}", change_id)))
                    }
                }
            }
        }
        before_commit(&info)?;
        txn.commit()?;
        trace!(bundle = %info, changes = parsed.proto.changes.len(), "applied bundle");
        Ok((info, true))
    }

    /// Record a claim, calling `before_commit` first. The claim is kept
    /// only if the hook succeeds.
    pub fn claim_chain_with(
        &self,
        chain: ChainKey,
        before_commit: &mut dyn FnMut() -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut claims = txn.open_table(TABLE_CLAIMS)?;
            let claim = ClaimedChain {
                medallion: chain.medallion,
                chain_start: chain.chain_start,
            };
            claims.insert(keys::chain(chain).as_slice(), claim.encode_to_vec().as_slice())?;
        }
        before_commit()?;
        txn.commit()?;
        debug!(chain = %chain, "claimed chain");
        Ok(())
    }

    fn reader(&self) -> Result<Reader, StoreError> {
        let txn = self.db.begin_read()?;
        Ok(Reader {
            bundles: txn.open_table(TABLE_BUNDLES)?,
            containers: txn.open_table(TABLE_CONTAINERS)?,
            entries: txn.open_table(TABLE_ENTRIES)?,
            exits: txn.open_table(TABLE_EXITS)?,
            pointees: txn.open_table(TABLE_POINTEES)?,
        })
    }
}

/// Tables of one read transaction, plus the query logic over them.
struct Reader {
    bundles: Table,
    containers: Table,
    entries: Table,
    exits: Table,
    pointees: Table,
}

impl Reader {
    /// Inclusive cutoff timestamp for a query.
    fn cutoff(&self, as_of: Option<AsOf>) -> Result<Timestamp, StoreError> {
        match as_of {
            None | Some(AsOf::CommitsBack(0)) => Ok(Timestamp::MAX),
            Some(AsOf::CommitsBack(n)) => {
                let mut available = 0u32;
                for item in self.bundles.iter()?.rev() {
                    let (k, _) = item?;
                    available += 1;
                    if available == n {
                        return Ok(keys::decode_i64(k.value())? - 1);
                    }
                }
                Err(StoreError::AsOfOutOfRange { requested: n, available })
            }
            Some(other) => Ok(other.absolute().unwrap_or(Timestamp::MAX)),
        }
    }

    fn behavior(&self, address: Muid) -> Result<Option<Behavior>, StoreError> {
        if address.is_magic() {
            return Ok(Behavior::from_code(address.offset));
        }
        let key = keys::muid(&address);
        let Some(bytes) = self.containers.get(key.as_slice())? else {
            return Ok(None);
        };
        let proto = ContainerProto::decode(bytes.value())?;
        Ok(Behavior::from_code(proto.behavior))
    }

    /// The latest movement of `entry_id` at or before `cutoff` decides
    /// whether it was removed or placed somewhere else.
    fn placement(&self, container: &Muid, entry_id: &Muid, cutoff: Timestamp) -> Result<Placement, StoreError> {
        let prefix = keys::exit_prefix(container, entry_id);
        for (row, dest) in scan_prefix(&self.exits, &prefix)?.into_iter().rev() {
            if row_timestamp(&row)? > cutoff {
                continue;
            }
            if dest.is_empty() {
                return Ok(Placement::Exited);
            }
            return Ok(Placement::Moved {
                dest: keys::decode_i64(&dest)?,
                movement: keys::decode_muid(&row[prefix.len()..])?,
            });
        }
        Ok(Placement::Original)
    }

    fn exited(&self, container: &Muid, entry_id: &Muid, cutoff: Timestamp) -> Result<bool, StoreError> {
        Ok(matches!(self.placement(container, entry_id, cutoff)?, Placement::Exited))
    }

    fn entry(&self, container: Muid, key: &EntryKey, cutoff: Timestamp) -> Result<Option<Entry>, StoreError> {
        let Some(behavior) = self.behavior(container)? else {
            return Ok(None);
        };
        let prefix = keys::slot_prefix(&container, behavior, key);
        for (row, value) in scan_prefix(&self.entries, &prefix)?.into_iter().rev() {
            if row_timestamp(&row)? > cutoff {
                continue;
            }
            let entry = decode_entry(&value)?;
            if self.exited(&container, &entry.entry_id, cutoff)? {
                continue;
            }
            return Ok((!entry.deleting).then_some(entry));
        }
        Ok(None)
    }

    /// Visible rows of a container in key then entry-id order, each with
    /// its sort position.
    fn visible(&self, container: Muid, cutoff: Timestamp) -> Result<Vec<(Entry, Position)>, StoreError> {
        let Some(behavior) = self.behavior(container)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (row, value) in scan_prefix(&self.entries, &keys::container_prefix(&container, behavior))? {
            if row_timestamp(&row)? > cutoff {
                continue;
            }
            let entry = decode_entry(&value)?;
            let position = match self.placement(&container, &entry.entry_id, cutoff)? {
                Placement::Exited => continue,
                Placement::Original => (entry.entry_id.timestamp, entry.entry_id),
                Placement::Moved { dest, movement } => (dest, movement),
            };
            out.push((entry, position));
        }
        Ok(out)
    }

    fn keyed(&self, container: Muid, cutoff: Timestamp) -> Result<BTreeMap<EntryKey, Entry>, StoreError> {
        let mut result = BTreeMap::new();
        for (entry, _) in self.visible(container, cutoff)? {
            if entry.deleting {
                result.remove(&entry.key);
            } else {
                result.insert(entry.key.clone(), entry);
            }
        }
        Ok(result)
    }

    fn ordered(&self, container: Muid, through: Option<i64>, cutoff: Timestamp) -> Result<Vec<Entry>, StoreError> {
        let mut placed: Vec<(Entry, Position)> = self
            .visible(container, cutoff)?
            .into_iter()
            .filter(|(e, _)| !e.deleting)
            .collect();
        placed.sort_by_key(|(_, position)| *position);
        let mut live: Vec<Entry> = placed.into_iter().map(|(e, _)| e).collect();
        match through {
            None => {}
            Some(n) if n >= 0 => live.truncate(usize::try_from(n).unwrap_or(usize::MAX).saturating_add(1)),
            Some(n) => {
                let keep = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
                let skip = live.len().saturating_sub(keep);
                live.drain(..skip);
            }
        }
        Ok(live)
    }

    /// Whether `entry` is still what its slot resolves to at `cutoff`.
    fn occupies_slot(&self, entry: &Entry, cutoff: Timestamp) -> Result<bool, StoreError> {
        if entry.deleting {
            return Ok(false);
        }
        if entry.behavior.is_ordered() {
            return Ok(!self.exited(&entry.container, &entry.entry_id, cutoff)?);
        }
        Ok(self
            .entry(entry.container, &entry.key, cutoff)?
            .is_some_and(|current| current.entry_id == entry.entry_id))
    }

    fn back_refs(&self, target: Muid, cutoff: Timestamp) -> Result<Vec<Entry>, StoreError> {
        let mut out = Vec::new();
        for (row, _) in scan_prefix(&self.pointees, &keys::muid(&target))? {
            let entry_row = &row[MUID_LEN..];
            if row_timestamp(entry_row)? > cutoff {
                continue;
            }
            let Some(bytes) = self.entries.get(entry_row)? else {
                return Err(StoreError::Corrupt("pointee without entry".into()));
            };
            let entry = decode_entry(bytes.value())?;
            if self.occupies_slot(&entry, cutoff)? {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

fn required_muid(
    proto: Option<&strand_model::proto::MuidProto>,
    field: &'static str,
    bundle: (i64, i64),
) -> Result<Muid, StoreError> {
    let proto = proto.ok_or(CodecError::MissingField(field))?;
    Ok(Muid::from_proto(proto, bundle))
}

impl EntryStore for RedbStore {
    fn add_bundle(&self, bytes: &[u8]) -> Result<(BundleInfo, bool), StoreError> {
        self.add_bundle_with(bytes, &mut |_: &BundleInfo| Ok(()))
    }

    fn get_entry(&self, container: Muid, key: &EntryKey, as_of: Option<AsOf>) -> Result<Option<Entry>, StoreError> {
        let reader = self.reader()?;
        let cutoff = reader.cutoff(as_of)?;
        reader.entry(container, key, cutoff)
    }

    fn get_keyed_entries(&self, container: Muid, as_of: Option<AsOf>) -> Result<BTreeMap<EntryKey, Entry>, StoreError> {
        let reader = self.reader()?;
        let cutoff = reader.cutoff(as_of)?;
        reader.keyed(container, cutoff)
    }

    fn get_ordered_entries(
        &self,
        container: Muid,
        through: Option<i64>,
        as_of: Option<AsOf>,
    ) -> Result<Vec<Entry>, StoreError> {
        let reader = self.reader()?;
        let cutoff = reader.cutoff(as_of)?;
        reader.ordered(container, through, cutoff)
    }

    fn get_back_refs(&self, target: Muid, as_of: Option<AsOf>) -> Result<Vec<Entry>, StoreError> {
        let reader = self.reader()?;
        let cutoff = reader.cutoff(as_of)?;
        reader.back_refs(target, cutoff)
    }

    fn get_container_bytes(&self, address: Muid) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLE_CONTAINERS)?;
        let key = keys::muid(&address);
        let bytes = table.get(key.as_slice())?;
        Ok(bytes.map(|v| v.value().to_vec()))
    }

    fn container_behavior(&self, address: Muid) -> Result<Option<Behavior>, StoreError> {
        self.reader()?.behavior(address)
    }

    fn claim_chain(&self, chain: ChainKey) -> Result<(), StoreError> {
        self.claim_chain_with(chain, &mut || Ok(()))
    }

    fn get_claimed_chains(&self) -> Result<Vec<ChainKey>, StoreError> {
        let txn = self.db.begin_read()?;
        let claims = txn.open_table(TABLE_CLAIMS)?;
        let mut out = Vec::new();
        for item in claims.iter()? {
            let (k, _) = item?;
            out.push(keys::decode_chain(k.value())?);
        }
        out.sort_by_key(|c| (c.chain_start, c.medallion));
        Ok(out)
    }

    fn get_seen_through(&self, chain: ChainKey) -> Result<Option<Timestamp>, StoreError> {
        let txn = self.db.begin_read()?;
        let chains = txn.open_table(TABLE_CHAINS)?;
        let key = keys::chain(chain);
        let row = chains.get(key.as_slice())?;
        match row {
            Some(v) => Ok(Some(ChainInfoProto::decode(v.value())?.timestamp)),
            None => Ok(None),
        }
    }

    fn get_chain_tracker(&self) -> Result<ChainTracker, StoreError> {
        let txn = self.db.begin_read()?;
        let chains = txn.open_table(TABLE_CHAINS)?;
        let mut tracker = ChainTracker::new();
        for item in chains.iter()? {
            let (_, v) = item?;
            tracker.mark_seen(&BundleInfo::from_proto(&ChainInfoProto::decode(v.value())?));
        }
        Ok(tracker)
    }

    fn get_commits(&self, visit: &mut dyn FnMut(&[u8], &BundleInfo)) -> Result<(), StoreError> {
        let txn = self.db.begin_read()?;
        let bundles = txn.open_table(TABLE_BUNDLES)?;
        for item in bundles.iter()? {
            let (_, v) = item?;
            let bytes = v.value();
            let parsed = ParsedBundle::decode(bytes)?;
            visit(bytes, &parsed.info);
        }
        Ok(())
    }
}
