//! `EntityRepository`: the public contract for EntityDB (spec.md §4.11).
//!
//! State is kept twice, deliberately: an in-memory working set (the
//! sharded tag index plus a per-entity record map) gives every read its
//! answer without touching disk, while the WAL gives every write crash
//! durability and `Checkpoint` folds the working set into the unified
//! file's data/index regions. `Recover` replays the WAL back into a
//! fresh working set on startup.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{info, instrument};

use entitydb_core::{
    limits::{DELETION_INDEX_ENTRY_SIZE, ENTITY_INDEX_ENTRY_SIZE, MAX_TAG_COUNT},
    Entity, EntityDbError, EntityId, Lifecycle, Result, StoredTag, Timestamp,
};
use entitydb_format::{DataRecord, DeletionIndexEntry, EntityIndexEntry, WalPayload, WalRecord};
use entitydb_index::TagIndex;
use entitydb_storage::{decode_record_content, run_checkpoint, CheckpointInput, EntityDbFile, RecoveryReport};

use crate::config::EntityDbConfig;
use crate::memory_guardian::{MemoryGuardian, MemoryPressure};
use crate::query::QueryFilter;
use crate::recursion_guard::RecursionGuard;
use crate::temporal::{content_as_of, diff_tags, ContentVersion, TagDiff};

struct EntityRecord {
    raw_tags: Vec<StoredTag>,
    content_versions: Vec<ContentVersion>,
    lifecycle: Lifecycle,
    created_at: Timestamp,
    updated_at: Timestamp,
    deletion: Option<DeletionIndexEntry>,
}

impl EntityRecord {
    fn current_tags(&self) -> Vec<String> {
        Entity::project_current_tags(&self.raw_tags)
    }

    fn current_content(&self) -> Vec<u8> {
        self.content_versions.last().map(|v| v.content.clone()).unwrap_or_default()
    }
}

/// Aggregate counters surfaced by `Stats` (spec.md's supplemented
/// observability features, SPEC_FULL.md §C).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub entity_count: u64,
    pub active_count: u64,
    pub soft_deleted_count: u64,
    pub wal_sequence: u64,
    pub checkpoint_sequence: u64,
}

pub struct EntityRepository {
    file: EntityDbFile,
    index: TagIndex,
    entities: RwLock<HashMap<String, EntityRecord>>,
    memory_guardian: MemoryGuardian,
    next_wal_sequence: std::sync::atomic::AtomicU64,
}

impl EntityRepository {
    pub fn create_new(config: &EntityDbConfig) -> Result<Self> {
        let file = EntityDbFile::create_new(&config.path, config.limits)?;
        let index = TagIndex::new(config.variant_cache_capacity);
        let budget = config.limits.max_record_bytes * 64;
        Ok(EntityRepository {
            memory_guardian: MemoryGuardian::new(budget, &config.limits),
            entities: RwLock::new(HashMap::new()),
            next_wal_sequence: std::sync::atomic::AtomicU64::new(1),
            index,
            file,
        })
    }

    /// Open an existing file: decode the last checkpoint's data/index
    /// regions into a base working set, then replay any WAL records
    /// appended since that checkpoint on top of it.
    pub fn recover(config: &EntityDbConfig) -> Result<(Self, RecoveryReport)> {
        let (file, wal_records, report) = EntityDbFile::open_existing(&config.path, config.limits)?;
        let index = TagIndex::new(config.variant_cache_capacity);
        let budget = config.limits.max_record_bytes * 64;

        let header = file.header_sync.read();
        let data_bytes = file.read_region(header.data)?;
        let entity_index_bytes = file.read_region(header.entity_index)?;
        let deletion_index_bytes = file.read_region(header.deletion_index)?;
        drop(header);
        let mut entities = decode_base_snapshot(&data_bytes, &entity_index_bytes, &deletion_index_bytes, &index)?;

        let mut max_sequence = file.header_sync.read().wal_sequence;
        for record in &wal_records {
            max_sequence = max_sequence.max(record.sequence);
            apply_replayed(&mut entities, &index, record);
        }

        let repo = EntityRepository {
            memory_guardian: MemoryGuardian::new(budget, &config.limits),
            entities: RwLock::new(entities),
            next_wal_sequence: std::sync::atomic::AtomicU64::new(max_sequence + 1),
            index,
            file,
        };
        info!(records_replayed = report.records_replayed, wal_truncated = report.wal_truncated, "recovery complete");
        Ok((repo, report))
    }

    fn next_sequence(&self) -> u64 {
        self.next_wal_sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    /// Report the working set's current content footprint to the memory
    /// guardian and evict the variant cache under soft/hard pressure
    /// (spec.md §5: "at 80%... triggers variant cache eviction").
    fn refresh_memory_pressure(&self, entities: &HashMap<String, EntityRecord>) {
        let estimate: u64 =
            entities.values().map(|r| r.content_versions.iter().map(|v| v.content.len() as u64).sum::<u64>()).sum();
        let pressure = self.memory_guardian.report_usage(estimate);
        if matches!(pressure, MemoryPressure::Soft | MemoryPressure::Hard) {
            self.index.evict_variant_cache();
        }
    }

    fn validate_tags_at(logical_tags: &[String], at: Timestamp) -> Result<Vec<StoredTag>> {
        if logical_tags.len() > MAX_TAG_COUNT {
            return Err(EntityDbError::corrupt_input(
                "tags",
                format!("tag count {} exceeds maximum {}", logical_tags.len(), MAX_TAG_COUNT),
            ));
        }
        logical_tags.iter().map(|t| StoredTag::new(at, t)).collect()
    }

    /// Mark an entity's tag set with `content:chunked:true` when its
    /// content will be autochunked at the next checkpoint, so the marker
    /// is visible to `Get`/`Query` without decoding the data section
    /// (spec.md §8 scenario 3).
    fn mark_if_chunked(&self, tags: &mut Vec<StoredTag>, content_len: u64, at: Timestamp) {
        if content_len >= self.file.limits.chunk_threshold_bytes {
            tags.push(StoredTag { timestamp: at, key: "content".to_string(), value: "chunked:true".to_string() });
        }
    }


    #[instrument(skip(self, content, logical_tags))]
    pub fn create(&self, id: &str, logical_tags: &[String], content: Vec<u8>) -> Result<()> {
        let _guard = RecursionGuard::enter()
            .ok_or_else(|| EntityDbError::corrupt_storage("recursive mutation detected in create"))?;
        if self.memory_guardian.should_refuse_writes() {
            return Err(EntityDbError::resource_exhausted("memory guardian refused write at hard threshold"));
        }
        let entity_id = EntityId::new(id)?;
        if content.len() as u64 > self.file.limits.max_record_bytes {
            return Err(EntityDbError::corrupt_input("content", "content exceeds max_record_bytes"));
        }
        let now = Timestamp::now();
        let mut tags = Self::validate_tags_at(logical_tags, now)?;
        self.mark_if_chunked(&mut tags, content.len() as u64, now);

        let mut entities = self.entities.write();
        if entities.contains_key(entity_id.as_str()) {
            return Err(EntityDbError::duplicate_id(entity_id.as_str()));
        }

        let sequence = self.next_sequence();
        let record = WalRecord {
            sequence,
            payload: WalPayload::Create { entity_id: entity_id.as_str().to_string(), tags: tags.clone(), content: content.clone() },
        };
        self.file.append_wal_record(&record)?;

        for tag in &tags {
            self.index.record_add(entity_id.as_str(), &tag.logical_tag(), tag.timestamp);
        }
        reconcile_tag_index(&self.index, entity_id.as_str(), &tags, now);
        entities.insert(
            entity_id.as_str().to_string(),
            EntityRecord {
                raw_tags: tags,
                content_versions: vec![ContentVersion { timestamp: now, content }],
                lifecycle: Lifecycle::Active,
                created_at: now,
                updated_at: now,
                deletion: None,
            },
        );
        self.refresh_memory_pressure(&entities);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Entity> {
        let entities = self.entities.read();
        let record = entities.get(id).ok_or_else(|| EntityDbError::not_found(id))?;
        if !record.lifecycle.is_current() {
            return Err(EntityDbError::not_found(id));
        }
        Ok(Entity {
            id: EntityId::new(id)?,
            tags: record.current_tags(),
            content: record.current_content(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Raw timeline access, bypassing current-state projection — used by
    /// the temporal query operations.
    pub fn get_temporal_raw(&self, id: &str) -> Result<Vec<StoredTag>> {
        let entities = self.entities.read();
        let record = entities.get(id).ok_or_else(|| EntityDbError::not_found(id))?;
        Ok(record.raw_tags.clone())
    }

    #[instrument(skip(self, content, logical_tags))]
    pub fn update(&self, id: &str, logical_tags: &[String], content: Vec<u8>) -> Result<()> {
        let _guard = RecursionGuard::enter()
            .ok_or_else(|| EntityDbError::corrupt_storage("recursive mutation detected in update"))?;
        if self.memory_guardian.should_refuse_writes() {
            return Err(EntityDbError::resource_exhausted("memory guardian refused write at hard threshold"));
        }
        if content.len() as u64 > self.file.limits.max_record_bytes {
            return Err(EntityDbError::corrupt_input("content", "content exceeds max_record_bytes"));
        }
        let now = Timestamp::now();
        let mut tags = Self::validate_tags_at(logical_tags, now)?;
        self.mark_if_chunked(&mut tags, content.len() as u64, now);

        let mut entities = self.entities.write();
        let record = entities.get_mut(id).ok_or_else(|| EntityDbError::not_found(id))?;
        if !record.lifecycle.is_current() {
            return Err(EntityDbError::not_found(id));
        }

        let sequence = self.next_sequence();
        let wal_record = WalRecord {
            sequence,
            payload: WalPayload::Update { entity_id: id.to_string(), tags: tags.clone(), content: content.clone() },
        };
        self.file.append_wal_record(&wal_record)?;

        for tag in &tags {
            self.index.record_add(id, &tag.logical_tag(), tag.timestamp);
        }
        record.raw_tags.extend(tags);
        reconcile_tag_index(&self.index, id, &record.raw_tags, now);
        record.content_versions.push(ContentVersion { timestamp: now, content });
        record.updated_at = now;
        self.refresh_memory_pressure(&entities);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn add_tag(&self, id: &str, logical_tag: &str) -> Result<()> {
        let _guard = RecursionGuard::enter()
            .ok_or_else(|| EntityDbError::corrupt_storage("recursive mutation detected in add_tag"))?;
        if self.memory_guardian.should_refuse_writes() {
            return Err(EntityDbError::resource_exhausted("memory guardian refused write at hard threshold"));
        }
        let now = Timestamp::now();
        let tag = StoredTag::new(now, logical_tag)?;

        let mut entities = self.entities.write();
        let record = entities.get_mut(id).ok_or_else(|| EntityDbError::not_found(id))?;
        if record.raw_tags.len() >= MAX_TAG_COUNT {
            return Err(EntityDbError::corrupt_input("tags", "entity already holds the maximum tag count"));
        }

        let sequence = self.next_sequence();
        let wal_record =
            WalRecord { sequence, payload: WalPayload::AddTag { entity_id: id.to_string(), tag: tag.clone() } };
        self.file.append_wal_record(&wal_record)?;

        self.index.record_add(id, logical_tag, now);
        record.raw_tags.push(tag);
        reconcile_tag_index(&self.index, id, &record.raw_tags, now);
        record.updated_at = now;
        self.refresh_memory_pressure(&entities);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        let _guard = RecursionGuard::enter()
            .ok_or_else(|| EntityDbError::corrupt_storage("recursive mutation detected in delete"))?;
        let mut entities = self.entities.write();
        let record = entities.get_mut(id).ok_or_else(|| EntityDbError::not_found(id))?;

        let now = Timestamp::now();
        let sequence = self.next_sequence();
        let wal_record = WalRecord {
            sequence,
            payload: WalPayload::Delete {
                entity_id: id.to_string(),
                lifecycle: Lifecycle::SoftDeleted.as_u8(),
                reason: reason.to_string(),
                actor: actor.to_string(),
            },
        };
        self.file.append_wal_record(&wal_record)?;

        record.lifecycle = Lifecycle::SoftDeleted;
        record.updated_at = now;
        record.deletion = Some(DeletionIndexEntry {
            entity_id: id.to_string(),
            lifecycle: Lifecycle::SoftDeleted,
            timestamp: now,
            deleted_by: actor.to_string(),
            reason: reason.to_string(),
            policy_tag: String::new(),
            flags: 0,
        });
        Ok(())
    }

    pub fn list_by_tag(&self, logical_tag: &str) -> Vec<String> {
        let entities = self.entities.read();
        let mut result: Vec<String> = self
            .index
            .list_by_tag(logical_tag)
            .into_iter()
            .filter(|id| entities.get(id).map(|r| r.lifecycle.is_current()).unwrap_or(false))
            .collect();
        result.sort();
        result
    }

    pub fn list_by_tags_all(&self, logical_tags: &[String]) -> Vec<String> {
        let entities = self.entities.read();
        let mut result: Vec<String> = self
            .index
            .list_by_tags_all(logical_tags)
            .into_iter()
            .filter(|id| entities.get(id).map(|r| r.lifecycle.is_current()).unwrap_or(false))
            .collect();
        result.sort();
        result
    }

    /// Distinct current values held under one tag namespace (spec.md §6:
    /// `TagValues(namespace)`), e.g. `tag_values("status")` returns
    /// `["active", "inactive"]` if those are the current values in use.
    /// Only each entity's current (newest-wins) tag set is considered, the
    /// same current-state scope as `list_by_tag`/`list_by_tags_all`
    /// (DESIGN.md's "union-vs-current-state" decision).
    pub fn tag_values(&self, namespace: &str) -> Vec<String> {
        let entities = self.entities.read();
        let mut values: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for record in entities.values() {
            if !record.lifecycle.is_current() {
                continue;
            }
            for logical_tag in record.current_tags() {
                if let Ok((key, value)) = entitydb_core::split_logical_tag(&logical_tag) {
                    if key == namespace {
                        values.insert(value);
                    }
                }
            }
        }
        values.into_iter().collect()
    }

    pub fn query(&self, filter: &QueryFilter) -> Vec<Entity> {
        let entities = self.entities.read();
        let mut matched: Vec<(String, &EntityRecord)> = entities
            .iter()
            .filter(|(id, r)| {
                r.lifecycle.is_current()
                    && filter.matches_id(id)
                    && filter.matches_tags(&r.current_tags())
                    && filter.matches_content(&r.current_content())
            })
            .map(|(id, r)| (id.clone(), r))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        let entities_out: Vec<Entity> = matched
            .into_iter()
            .map(|(id, r)| Entity {
                id: EntityId::new(id).expect("already-validated id"),
                tags: r.current_tags(),
                content: r.current_content(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();
        filter.paginate(entities_out)
    }

    pub fn get_as_of(&self, id: &str, at: Timestamp) -> Result<Entity> {
        let entities = self.entities.read();
        let record = entities.get(id).ok_or_else(|| EntityDbError::not_found(id))?;
        let tags = Entity::project_as_of(&record.raw_tags, at);
        let content = content_as_of(&record.content_versions, at).ok_or_else(|| {
            EntityDbError::not_found(format!("{} did not exist as of the requested timestamp", id))
        })?;
        Ok(Entity { id: EntityId::new(id)?, tags, content, created_at: record.created_at, updated_at: at })
    }

    pub fn get_history(&self, id: &str) -> Result<Vec<entitydb_index::TimelineEvent>> {
        if !self.entities.read().contains_key(id) {
            return Err(EntityDbError::not_found(id));
        }
        Ok(self.index.timeline_of(id))
    }

    pub fn get_diff(&self, id: &str, from: Timestamp, to: Timestamp) -> Result<TagDiff> {
        let entities = self.entities.read();
        let record = entities.get(id).ok_or_else(|| EntityDbError::not_found(id))?;
        Ok(diff_tags(&record.raw_tags, from, to))
    }

    pub fn get_changes_since(&self, since: Timestamp) -> Vec<(String, Timestamp)> {
        let entities = self.entities.read();
        let mut changes: Vec<(String, Timestamp)> = entities
            .iter()
            .filter(|(_, r)| r.updated_at > since)
            .map(|(id, r)| (id.clone(), r.updated_at))
            .collect();
        changes.sort_by_key(|(_, ts)| *ts);
        changes
    }

    pub fn stats(&self) -> Stats {
        let entities = self.entities.read();
        let header = self.file.header_sync.read();
        let active_count = entities.values().filter(|r| r.lifecycle.is_current()).count() as u64;
        let soft_deleted_count =
            entities.values().filter(|r| matches!(r.lifecycle, Lifecycle::SoftDeleted)).count() as u64;
        Stats {
            entity_count: entities.len() as u64,
            active_count,
            soft_deleted_count,
            wal_sequence: header.wal_sequence,
            checkpoint_sequence: header.checkpoint_sequence,
        }
    }

    /// Fold the current in-memory working set into the unified file's
    /// data/tag-dict/entity-index/deletion-index regions (spec.md §4.9).
    #[instrument(skip(self))]
    pub fn checkpoint(&self) -> Result<u64> {
        let mut entities = self.entities.write();
        let mut data_bytes = Vec::new();
        let mut entity_index_bytes = Vec::new();
        let mut deletion_index_bytes = Vec::new();
        let mut distinct_tags = std::collections::BTreeSet::new();
        let mut offset = 0u64;

        for (id, record) in entities.iter_mut() {
            let prepared = entitydb_storage::prepare_write(
                id,
                &record.raw_tags,
                &record.current_content(),
                self.file.limits.compress_threshold_bytes,
                self.file.limits.chunk_threshold_bytes,
            )?;
            let encoded = prepared.primary.encode();
            let entry = EntityIndexEntry {
                entity_id: id.clone(),
                data_offset: offset,
                data_length: encoded.len() as u64,
                timestamp: record.updated_at,
            };
            entity_index_bytes.extend_from_slice(&entry.encode()?);
            offset += encoded.len() as u64;
            data_bytes.extend_from_slice(&encoded);

            for (child_id, child_record) in &prepared.chunks {
                let child_encoded = child_record.encode();
                let child_entry = EntityIndexEntry {
                    entity_id: child_id.as_str().to_string(),
                    data_offset: offset,
                    data_length: child_encoded.len() as u64,
                    timestamp: record.updated_at,
                };
                entity_index_bytes.extend_from_slice(&child_entry.encode()?);
                offset += child_encoded.len() as u64;
                data_bytes.extend_from_slice(&child_encoded);
            }

            for tag in &record.raw_tags {
                distinct_tags.insert(tag.logical_tag());
            }
            if let Some(deletion) = &record.deletion {
                deletion_index_bytes.extend_from_slice(&deletion.encode()?);
            }

            // Only the folded-in current content survives a checkpoint;
            // older `Update` versions are reclaimed here (DESIGN.md: "Content
            // history across a checkpoint").
            if let Some(current) = record.content_versions.pop() {
                record.content_versions.clear();
                record.content_versions.push(current);
            }
        }

        let wal_sequence = self.file.header_sync.read().wal_sequence;
        let tag_dict_bytes = entitydb_format::tag_dict::encode(&distinct_tags.into_iter().collect::<Vec<_>>());
        let input = CheckpointInput {
            data_bytes,
            entity_index_bytes,
            tag_dict_bytes,
            deletion_index_bytes,
            entity_count: entities.len() as u64,
            wal_sequence,
        };
        self.refresh_memory_pressure(&entities);
        drop(entities);
        let handle = self.file.try_clone_handle()?;
        let report = run_checkpoint(&handle, &self.file.header_sync, &self.file.reader_pool, input)?;
        Ok(report.checkpoint_sequence)
    }
}

/// Remove from the shard index's current-state view every logical tag
/// that `raw_tags` shows has since been superseded by a newer value under
/// the same key, mirroring `Entity::project_current_tags`'s newest-wins
/// tie-break exactly so `ListByTag` never returns a stale match (spec.md
/// §4.6 "remove (used on hard update of a tag key)"). The timeline keeps
/// every `Add` untouched; this only ever appends `Remove` events.
fn reconcile_tag_index(index: &TagIndex, entity_id: &str, raw_tags: &[StoredTag], at: Timestamp) {
    let mut newest: HashMap<&str, &StoredTag> = HashMap::new();
    for tag in raw_tags {
        match newest.get(tag.key.as_str()) {
            Some(existing) if existing.timestamp >= tag.timestamp => {}
            _ => {
                newest.insert(&tag.key, tag);
            }
        }
    }
    let winners: std::collections::HashSet<String> = newest.values().map(|t| t.logical_tag()).collect();
    let mut seen = std::collections::HashSet::new();
    for tag in raw_tags {
        let logical = tag.logical_tag();
        if seen.insert(logical.clone()) && !winners.contains(&logical) {
            index.record_remove(entity_id, &logical, at);
        }
    }
}

/// Rebuild the working set as it stood at the last committed checkpoint
/// from the on-disk `entity_index`/`data`/`deletion_index` regions.
/// Chunk child records are gathered by their `chunk:parent`/`chunk:seq`
/// tags and reassembled into the parent's content (spec.md §4.4, §4.9).
fn decode_base_snapshot(
    data_bytes: &[u8],
    entity_index_bytes: &[u8],
    deletion_index_bytes: &[u8],
    index: &TagIndex,
) -> Result<HashMap<String, EntityRecord>> {
    let mut deletions: HashMap<String, DeletionIndexEntry> = HashMap::new();
    for chunk in deletion_index_bytes.chunks(DELETION_INDEX_ENTRY_SIZE) {
        if chunk.len() < DELETION_INDEX_ENTRY_SIZE {
            break;
        }
        let entry = DeletionIndexEntry::decode(chunk)?;
        deletions.insert(entry.entity_id.clone(), entry);
    }

    let mut entries: Vec<(EntityIndexEntry, DataRecord)> = Vec::new();
    for chunk in entity_index_bytes.chunks(ENTITY_INDEX_ENTRY_SIZE) {
        if chunk.len() < ENTITY_INDEX_ENTRY_SIZE {
            break;
        }
        let index_entry = EntityIndexEntry::decode(chunk)?;
        let start = index_entry.data_offset as usize;
        let end = start
            .checked_add(index_entry.data_length as usize)
            .ok_or_else(|| EntityDbError::corrupt_storage("entity index entry length overflows"))?;
        if end > data_bytes.len() {
            return Err(EntityDbError::corrupt_storage("entity index entry points outside data region"));
        }
        let record = DataRecord::decode(&data_bytes[start..end])?;
        entries.push((index_entry, record));
    }

    let mut children: HashMap<String, Vec<(usize, DataRecord)>> = HashMap::new();
    let mut top_level: Vec<(EntityIndexEntry, DataRecord)> = Vec::new();
    for (index_entry, record) in entries {
        let parent = record.tags.iter().find(|t| t.key == "chunk:parent").map(|t| t.value.clone());
        match parent {
            Some(parent_id) => {
                let seq = record
                    .tags
                    .iter()
                    .find(|t| t.key == "chunk:seq")
                    .and_then(|t| t.value.parse::<usize>().ok())
                    .unwrap_or(0);
                children.entry(parent_id).or_default().push((seq, record));
            }
            None => top_level.push((index_entry, record)),
        }
    }

    let mut entities = HashMap::new();
    for (index_entry, record) in top_level {
        let content = if record.is_chunked() {
            let mut pieces = children.remove(&record.entity_id).unwrap_or_default();
            pieces.sort_by_key(|(seq, _)| *seq);
            let mut buf = Vec::new();
            for (_, chunk_record) in &pieces {
                buf.extend_from_slice(&decode_record_content(chunk_record)?);
            }
            buf
        } else {
            decode_record_content(&record)?
        };

        for tag in &record.tags {
            index.record_add(&record.entity_id, &tag.logical_tag(), tag.timestamp);
        }
        reconcile_tag_index(index, &record.entity_id, &record.tags, index_entry.timestamp);

        let created_at = record.tags.iter().map(|t| t.timestamp).min().unwrap_or(index_entry.timestamp);
        let deletion = deletions.get(&record.entity_id).cloned();
        let lifecycle = deletion.as_ref().map(|d| d.lifecycle).unwrap_or(Lifecycle::Active);

        entities.insert(
            record.entity_id.clone(),
            EntityRecord {
                raw_tags: record.tags,
                content_versions: vec![ContentVersion { timestamp: index_entry.timestamp, content }],
                lifecycle,
                created_at,
                updated_at: index_entry.timestamp,
                deletion,
            },
        );
    }

    Ok(entities)
}

/// Apply one already-durable WAL record to a working set being rebuilt
/// during recovery. Unlike the live mutators this neither validates nor
/// re-appends to the WAL — the record is already on disk.
fn apply_replayed(entities: &mut HashMap<String, EntityRecord>, index: &TagIndex, record: &WalRecord) {
    match &record.payload {
        WalPayload::Create { entity_id, tags, content } => {
            for tag in tags {
                index.record_add(entity_id, &tag.logical_tag(), tag.timestamp);
            }
            let created_at = tags.iter().map(|t| t.timestamp).min().unwrap_or_else(Timestamp::now);
            let updated_at = tags.iter().map(|t| t.timestamp).max().unwrap_or(created_at);
            reconcile_tag_index(index, entity_id, tags, updated_at);
            entities.insert(
                entity_id.clone(),
                EntityRecord {
                    raw_tags: tags.clone(),
                    content_versions: vec![ContentVersion { timestamp: updated_at, content: content.clone() }],
                    lifecycle: Lifecycle::Active,
                    created_at,
                    updated_at,
                    deletion: None,
                },
            );
        }
        WalPayload::Update { entity_id, tags, content } => {
            if let Some(rec) = entities.get_mut(entity_id) {
                let updated_at = tags.iter().map(|t| t.timestamp).max().unwrap_or(rec.updated_at);
                for tag in tags {
                    index.record_add(entity_id, &tag.logical_tag(), tag.timestamp);
                }
                rec.raw_tags.extend(tags.clone());
                reconcile_tag_index(index, entity_id, &rec.raw_tags, updated_at);
                rec.content_versions.push(ContentVersion { timestamp: updated_at, content: content.clone() });
                rec.updated_at = updated_at;
            }
        }
        WalPayload::AddTag { entity_id, tag } => {
            if let Some(rec) = entities.get_mut(entity_id) {
                index.record_add(entity_id, &tag.logical_tag(), tag.timestamp);
                rec.raw_tags.push(tag.clone());
                reconcile_tag_index(index, entity_id, &rec.raw_tags, tag.timestamp);
                rec.updated_at = tag.timestamp;
            }
        }
        WalPayload::Delete { entity_id, lifecycle, reason, actor } => {
            if let Some(rec) = entities.get_mut(entity_id) {
                let lifecycle_enum = Lifecycle::from_u8(*lifecycle).unwrap_or(Lifecycle::SoftDeleted);
                let now = Timestamp::now();
                rec.lifecycle = lifecycle_enum;
                rec.updated_at = now;
                rec.deletion = Some(DeletionIndexEntry {
                    entity_id: entity_id.clone(),
                    lifecycle: lifecycle_enum,
                    timestamp: now,
                    deleted_by: actor.clone(),
                    reason: reason.clone(),
                    policy_tag: String::new(),
                    flags: 0,
                });
            }
        }
    }
}
