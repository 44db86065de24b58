//! Abstract table state.
//!
//! Each tracked table (a local whose value is a known table literal)
//! is a [`TableRecord`] holding per-key set/access facts plus two
//! whole-table markers for the imprecise cases. Records live in slot
//! storage owned by a [`TableSet`]; the name map is a reverse lookup
//! into the alias sets, and a record dies exactly when its last alias
//! (and last shadowed alias) goes away.
//!
//! Cloning a `TableSet` snapshots the whole state for scope entry. Slot
//! ids are preserved by clones and by [`TableSet::merge`], which is what
//! lets the warning policy compare a record against its pre-scope self.

use rustc_hash::{FxHashMap, FxHashSet};

use tablelint_ir::span::Span;
use tablelint_ir::string_interner::StringId;
use tablelint_ir::{Warning, WarningCode};

use super::checker::Checker;
use super::keys::FieldKey;

/// Slot index of a record within a [`TableSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(u32);

impl RecordId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One recorded field assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SetEntry {
    /// Name the table was reached through when the set happened.
    pub owner: StringId,
    pub key: FieldKey,
    /// Range of the key node (or of the value for synthesized keys).
    pub span: Span,
    /// The assigned value was literally `nil`.
    pub is_nil: bool,
}

/// Most recent read of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessEntry {
    pub span: Span,
}

/// A whole-table fact: some write (or read) may have touched any key at
/// this point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub span: Span,
}

impl Marker {
    pub fn at(span: Span) -> Self {
        Marker { span }
    }
}

/// Abstract state of one tracked table.
#[derive(Debug, Clone)]
pub struct TableRecord {
    /// Sets known to have executed on every path reaching this point.
    pub set_keys: FxHashMap<FieldKey, SetEntry>,
    /// Sets that executed on some, but not all, merged branches.
    pub maybe_set_keys: FxHashMap<FieldKey, SetEntry>,
    pub accessed_keys: FxHashMap<FieldKey, AccessEntry>,
    /// A variable-keyed or externally induced write may have set any key.
    pub set_all: Option<Marker>,
    /// A variable-keyed or externally induced read may have read any key.
    pub accessed_all: Option<Marker>,
    /// Names currently bound to this record.
    pub aliases: FxHashSet<StringId>,
    /// Bindings hidden by an inner redeclaration, by name; the count
    /// handles the same name being shadowed at several nesting depths.
    pub shadowed: FxHashMap<StringId, u32>,
    /// Scope-stack depth when the record was created; anything deeper
    /// that is a loop makes the record loop-external inside it.
    pub created_depth: usize,
}

impl TableRecord {
    pub fn new(created_depth: usize) -> Self {
        TableRecord {
            set_keys: FxHashMap::default(),
            maybe_set_keys: FxHashMap::default(),
            accessed_keys: FxHashMap::default(),
            set_all: None,
            accessed_all: None,
            aliases: FxHashSet::default(),
            shadowed: FxHashMap::default(),
            created_depth,
        }
    }

    /// Any definitely- or maybe-set entry with a non-nil value?
    pub fn has_non_nil_entries(&self) -> bool {
        self.set_keys
            .values()
            .chain(self.maybe_set_keys.values())
            .any(|e| !e.is_nil)
    }

    /// Count of non-nil numeric keys in the definite set: the length
    /// `table.insert` appends after.
    pub fn numeric_non_nil_count(&self) -> usize {
        self.set_keys
            .iter()
            .filter(|(k, e)| k.is_numeric() && !e.is_nil)
            .count()
    }

    /// Largest non-nil integer key in the definite set, 0 if none.
    pub fn max_integer_key(&self) -> i64 {
        self.set_keys
            .iter()
            .filter(|(_, e)| !e.is_nil)
            .filter_map(|(k, _)| k.as_integer())
            .max()
            .unwrap_or(0)
    }

    pub fn shadow_total(&self) -> u32 {
        self.shadowed.values().sum()
    }

    fn is_disposable(&self) -> bool {
        self.aliases.is_empty() && self.shadow_total() == 0
    }
}

/// The current tracked-tables map: record slots plus the name lookup.
///
/// Invariant: a name is in `current` iff it is in the alias set of
/// exactly the record it maps to.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    records: Vec<Option<TableRecord>>,
    current: FxHashMap<StringId, RecordId>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: StringId) -> Option<RecordId> {
        self.current.get(&name).copied()
    }

    pub fn record(&self, id: RecordId) -> Option<&TableRecord> {
        self.records.get(id.index()).and_then(|r| r.as_ref())
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut TableRecord> {
        self.records.get_mut(id.index()).and_then(|r| r.as_mut())
    }

    pub fn by_name(&self, name: StringId) -> Option<&TableRecord> {
        self.lookup(name).and_then(|id| self.record(id))
    }

    /// Create a fresh record aliased by `name`. The name must not be
    /// bound (shadow or end it first).
    pub fn create(&mut self, name: StringId, created_depth: usize) -> RecordId {
        debug_assert!(!self.current.contains_key(&name));
        let id = RecordId(self.records.len() as u32);
        let mut record = TableRecord::new(created_depth);
        record.aliases.insert(name);
        self.records.push(Some(record));
        self.current.insert(name, id);
        id
    }

    /// Bind `name` as an additional alias of a live record.
    pub fn add_alias(&mut self, id: RecordId, name: StringId) {
        if let Some(record) = self.record_mut(id) {
            record.aliases.insert(name);
            self.current.insert(name, id);
        }
    }

    /// Hide the binding of `name` behind an inner redeclaration; the
    /// record stays alive through its shadowed-alias count.
    pub fn shadow(&mut self, name: StringId) -> Option<RecordId> {
        let id = self.current.remove(&name)?;
        let record = self.record_mut(id).expect("bound name had no record");
        record.aliases.remove(&name);
        *record.shadowed.entry(name).or_insert(0) += 1;
        Some(id)
    }

    /// Undo one level of shadowing: `name` refers to `id` again.
    pub fn rebind(&mut self, name: StringId, id: RecordId) {
        let Some(record) = self.record_mut(id) else {
            // The record was wiped while the binding was hidden.
            return;
        };
        if let Some(count) = record.shadowed.get_mut(&name) {
            *count -= 1;
            if *count == 0 {
                record.shadowed.remove(&name);
            }
        }
        record.aliases.insert(name);
        self.current.insert(name, id);
    }

    /// Unbind one alias. Returns the record id and whether the record is
    /// now disposable (no aliases, no shadowed aliases).
    pub fn remove_alias(&mut self, name: StringId) -> Option<(RecordId, bool)> {
        let id = self.current.remove(&name)?;
        let record = self.record_mut(id).expect("bound name had no record");
        record.aliases.remove(&name);
        Some((id, record.is_disposable()))
    }

    /// Remove the record from its slot, unbinding any remaining aliases.
    pub fn take(&mut self, id: RecordId) -> Option<TableRecord> {
        let record = self.records.get_mut(id.index())?.take()?;
        for alias in &record.aliases {
            self.current.remove(alias);
        }
        Some(record)
    }

    /// Live record ids in creation order.
    pub fn live_ids(&self) -> Vec<RecordId> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_some())
            .map(|(i, _)| RecordId(i as u32))
            .collect()
    }

    /// Currently bound names, sorted for deterministic iteration.
    pub fn bound_names(&self) -> Vec<StringId> {
        let mut names: Vec<_> = self.current.keys().copied().collect();
        names.sort();
        names
    }

    /// Merge sibling-branch states at a join point.
    ///
    /// A table survives only if every participant still tracks it under
    /// the same alias set. Keys definitely set in all participants stay
    /// definite; everything else demotes to maybe-set. Markers and
    /// accesses take the latest fact. Records that predate the branch
    /// keep their slot id across the merge.
    pub fn merge(parts: &[TableSet]) -> TableSet {
        assert!(!parts.is_empty(), "merge requires at least one participant");
        let base_len = parts.iter().map(|p| p.records.len()).max().unwrap_or(0);
        let mut out = TableSet {
            records: vec![None; base_len],
            current: FxHashMap::default(),
        };
        let first = &parts[0];
        let mut covered: FxHashSet<StringId> = FxHashSet::default();

        for name in first.bound_names() {
            if covered.contains(&name) {
                continue;
            }
            let ids: Option<Vec<RecordId>> = parts.iter().map(|p| p.lookup(name)).collect();
            let Some(ids) = ids else {
                // Not tracked in every participant: the table is dropped
                // without warnings.
                covered.insert(name);
                continue;
            };
            let records: Vec<&TableRecord> = ids
                .iter()
                .zip(parts)
                .map(|(id, p)| p.record(*id).expect("bound name had no record"))
                .collect();
            for record in &records {
                covered.extend(record.aliases.iter().copied());
            }
            let aliases = &records[0].aliases;
            if !records[1..].iter().all(|r| &r.aliases == aliases) {
                // Divergent aliasing: give up on this table.
                continue;
            }

            let merged = merge_records(&records);
            let slot = if ids.windows(2).all(|w| w[0] == w[1]) {
                ids[0]
            } else {
                out.records.push(None);
                RecordId((out.records.len() - 1) as u32)
            };
            for alias in &merged.aliases {
                out.current.insert(*alias, slot);
            }
            out.records[slot.index()] = Some(merged);
        }

        // Records reachable only through shadowed aliases have no bound
        // name; carry them when alive in every participant. Their slots
        // cannot have been reused above: merged tables either keep their
        // own common slot or get a fresh one.
        for (index, record) in first.records.iter().enumerate() {
            let Some(record) = record else { continue };
            if !record.aliases.is_empty() || record.shadow_total() == 0 {
                continue;
            }
            if out.records[index].is_some() {
                continue;
            }
            let alive_everywhere = parts[1..]
                .iter()
                .all(|p| p.records.get(index).is_some_and(|r| r.is_some()));
            if alive_everywhere {
                out.records[index] = Some(record.clone());
            }
        }

        out
    }

    /// Fold the accesses (and only the accesses) of `other` into the
    /// matching records of `self`. Used for always-returning branches,
    /// whose state does not flow past the join but whose reads still
    /// count as observations.
    pub fn absorb_accesses(&mut self, other: &TableSet) {
        for name in self.bound_names() {
            let Some(source) = other.by_name(name) else {
                continue;
            };
            let source_accesses: Vec<(FieldKey, AccessEntry)> = source
                .accessed_keys
                .iter()
                .map(|(k, a)| (*k, *a))
                .collect();
            let source_all = source.accessed_all;
            let id = self.lookup(name).expect("bound name had no record");
            let record = self.record_mut(id).expect("bound name had no record");
            for (key, access) in source_accesses {
                upsert_latest_access(&mut record.accessed_keys, key, access);
            }
            record.accessed_all = latest_marker(record.accessed_all, source_all);
        }
    }
}

fn merge_records(records: &[&TableRecord]) -> TableRecord {
    let depth = records.iter().map(|r| r.created_depth).min().unwrap_or(0);
    let mut out = TableRecord::new(depth);
    out.aliases = records[0].aliases.clone();
    out.shadowed = records[0].shadowed.clone();

    // Keys set in every participant stay definite, with the latest node.
    for (key, _) in &records[0].set_keys {
        if records[1..].iter().all(|r| r.set_keys.contains_key(key)) {
            let latest = records
                .iter()
                .filter_map(|r| r.set_keys.get(key))
                .max_by_key(|e| (e.span.line, e.span.column))
                .expect("key present in all participants");
            out.set_keys.insert(*key, latest.clone());
        }
    }

    for record in records {
        for (key, entry) in record.set_keys.iter().chain(&record.maybe_set_keys) {
            if !out.set_keys.contains_key(key) {
                upsert_latest_set(&mut out.maybe_set_keys, *key, entry);
            }
        }
        for (key, access) in &record.accessed_keys {
            upsert_latest_access(&mut out.accessed_keys, *key, *access);
        }
        out.set_all = latest_marker(out.set_all, record.set_all);
        out.accessed_all = latest_marker(out.accessed_all, record.accessed_all);
    }

    out
}

fn upsert_latest_set(map: &mut FxHashMap<FieldKey, SetEntry>, key: FieldKey, entry: &SetEntry) {
    match map.get(&key) {
        Some(existing)
            if (existing.span.line, existing.span.column) >= (entry.span.line, entry.span.column) => {}
        _ => {
            map.insert(key, entry.clone());
        }
    }
}

fn upsert_latest_access(
    map: &mut FxHashMap<FieldKey, AccessEntry>,
    key: FieldKey,
    access: AccessEntry,
) {
    match map.get(&key) {
        Some(existing)
            if (existing.span.line, existing.span.column) >= (access.span.line, access.span.column) => {}
        _ => {
            map.insert(key, access);
        }
    }
}

fn latest_marker(a: Option<Marker>, b: Option<Marker>) -> Option<Marker> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if (y.span.line, y.span.column) > (x.span.line, x.span.column) {
                Some(y)
            } else {
                Some(x)
            }
        }
        (x, None) => x,
        (None, y) => y,
    }
}

// Warning-aware state transitions. These live on the checker because the
// unused-value policy consults the scope stack's saved snapshots and the
// external-reference sets.
impl<'a, 'i> Checker<'a, 'i> {
    /// Install a definite set, evicting (and possibly warning about) any
    /// previous value under the same key.
    pub(crate) fn install_set(
        &mut self,
        id: RecordId,
        owner: StringId,
        key: FieldKey,
        span: Span,
        is_nil: bool,
        in_init: bool,
    ) {
        if in_init && is_nil {
            // `x = nil` inside a constructor declares the field; it is
            // never a dead store.
            return;
        }
        let Some(record) = self.tables.record(id) else {
            return;
        };
        let evicted_definite = record.set_keys.get(&key).cloned();
        let evicted_maybe = record.maybe_set_keys.get(&key).cloned();

        if !in_init {
            if let Some(old) = &evicted_definite {
                self.warn_unused_set(id, old);
            }
        }
        if let Some(old) = &evicted_maybe {
            self.warn_unused_set(id, old);
        }

        let record = self.tables.record_mut(id).expect("record vanished");
        record.maybe_set_keys.remove(&key);
        // A fresh set begins a new unused-until-read lifetime.
        record.accessed_keys.remove(&key);
        record.set_keys.insert(
            key,
            SetEntry {
                owner,
                key,
                span,
                is_nil,
            },
        );
    }

    /// Record a read of a constant key without the undefined-read check.
    /// Built-in models use this for the slots they read themselves.
    pub(crate) fn note_field_access(&mut self, id: RecordId, key: FieldKey, span: Span) {
        if let Some(record) = self.tables.record_mut(id) {
            upsert_latest_access(&mut record.accessed_keys, key, AccessEntry { span });
        }
    }

    /// Decide whether evicting `entry` warrants an unused-value warning,
    /// and emit it if so.
    ///
    /// No warning when the value was observed (a recorded access or a
    /// whole-table read at or after the set's line), or when the same key
    /// was set at the same line in an enclosing branch or loop snapshot;
    /// an overwrite whose original belongs to an outer path is
    /// legitimate.
    pub(crate) fn warn_unused_set(&mut self, id: RecordId, entry: &SetEntry) {
        let Some(record) = self.tables.record(id) else {
            return;
        };
        if Self::set_entry_observed(record, entry) {
            return;
        }
        if self.set_in_enclosing_snapshot(id, entry) {
            return;
        }
        let warning = self.unused_set_warning(entry);
        self.warnings.push(warning);
    }

    /// Same policy as [`Self::warn_unused_set`], for a record already
    /// detached from the slot storage.
    pub(crate) fn warn_unused_set_in(
        &mut self,
        id: RecordId,
        record: &TableRecord,
        entry: &SetEntry,
    ) {
        if Self::set_entry_observed(record, entry) {
            return;
        }
        if self.set_in_enclosing_snapshot(id, entry) {
            return;
        }
        let warning = self.unused_set_warning(entry);
        self.warnings.push(warning);
    }

    fn set_entry_observed(record: &TableRecord, entry: &SetEntry) -> bool {
        if let Some(access) = record.accessed_keys.get(&entry.key) {
            // Equal lines are legal (several statements on one line) and
            // count as an observation.
            if access.span.line >= entry.span.line {
                return true;
            }
        }
        if let Some(marker) = &record.accessed_all {
            if marker.span.line >= entry.span.line {
                return true;
            }
        }
        false
    }

    /// True when a branch or loop scope's saved snapshot holds the same
    /// key of the same record set at the same line.
    fn set_in_enclosing_snapshot(&self, id: RecordId, entry: &SetEntry) -> bool {
        self.scopes.iter().rev().any(|scope| {
            if !scope.kind.is_branching() {
                return false;
            }
            let Some(saved) = &scope.saved else {
                return false;
            };
            saved
                .record(id)
                .and_then(|r| r.set_keys.get(&entry.key))
                .is_some_and(|e| e.span.line == entry.span.line)
        })
    }

    fn unused_set_warning(&self, entry: &SetEntry) -> Warning {
        Warning {
            code: WarningCode::UnusedFieldValue,
            name: self.interner.resolve(entry.owner),
            field: entry.key.repr(self.interner),
            set_is_nil: entry.is_nil,
            span: entry.span,
        }
    }

    pub(crate) fn undefined_read_warning(
        &self,
        name: StringId,
        field: Option<FieldKey>,
        span: Span,
    ) -> Warning {
        Warning {
            code: WarningCode::UndefinedFieldRead,
            name: self.interner.resolve(name),
            field: field
                .map(|k| k.repr(self.interner))
                .unwrap_or(tablelint_ir::FieldRepr::Unknown),
            set_is_nil: false,
            span,
        }
    }

    /// Remove `name` from its record; when the last alias goes, flush
    /// pending unused-value warnings and drop the record.
    pub(crate) fn end_variable(&mut self, name: StringId) {
        let Some((id, disposable)) = self.tables.remove_alias(name) else {
            return;
        };
        if disposable {
            self.dispose_record_as(id, Some(name));
        }
    }

    /// Flush and drop a record that has no remaining bindings.
    pub(crate) fn dispose_record(&mut self, id: RecordId) {
        self.dispose_record_as(id, None);
    }

    /// Flush and drop a record. `ended_name` is the alias whose removal
    /// triggered disposal; it still counts for the external check below.
    ///
    /// Records any nested closure may read are wiped silently instead of
    /// flushed: their field values stay observable after this function's
    /// text runs out.
    fn dispose_record_as(&mut self, id: RecordId, ended_name: Option<StringId>) {
        let Some(record) = self.tables.take(id) else {
            return;
        };
        let externally_accessed = ended_name
            .is_some_and(|name| self.external.accessed.contains(&name))
            || self.record_externally_accessed(&record);
        if externally_accessed {
            tracing::debug!(record = id.index(), "record escapes through closure; dropped");
            return;
        }
        self.flush_record(id, &record);
    }

    fn record_externally_accessed(&self, record: &TableRecord) -> bool {
        record
            .aliases
            .iter()
            .chain(record.shadowed.keys())
            .any(|name| self.external.accessed.contains(name))
    }

    /// Emit unused-value warnings for every surviving set of a dying
    /// record, in source order.
    fn flush_record(&mut self, id: RecordId, record: &TableRecord) {
        let mut entries: Vec<&SetEntry> = record
            .set_keys
            .values()
            .chain(record.maybe_set_keys.values())
            .collect();
        entries.sort_by_key(|e| (e.span.line, e.span.column));
        let entries: Vec<SetEntry> = entries.into_iter().cloned().collect();
        for entry in &entries {
            self.warn_unused_set_in(id, record, entry);
        }
    }

    /// Drop a record and all its aliases with no warnings.
    pub(crate) fn wipe_record(&mut self, id: RecordId) {
        self.tables.take(id);
    }
}
