//! String interning.
//!
//! Identifier and string-literal text is interned once by the frontend;
//! the analysis layer only ever compares and hashes `StringId`s and
//! resolves back to text when building warning records.
//!
//! The interner is interior-mutable so a single instance can be shared
//! behind `Arc` between the frontend and any number of analyses.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Handle to an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(u32);

impl StringId {
    /// Raw index, for serialization-free debugging only.
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Default)]
struct InternerState {
    ids: FxHashMap<String, StringId>,
    strings: Vec<String>,
}

/// Deduplicating string table shared across a whole analysis run.
pub struct StringInterner {
    state: RwLock<InternerState>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            state: RwLock::new(InternerState::default()),
        }
    }

    /// Intern `text`, returning the existing id if it was seen before.
    pub fn get_or_intern(&self, text: &str) -> StringId {
        if let Some(&id) = self.state.read().ids.get(text) {
            return id;
        }
        let mut state = self.state.write();
        // Re-check under the write lock; another thread may have won.
        if let Some(&id) = state.ids.get(text) {
            return id;
        }
        let id = StringId(state.strings.len() as u32);
        state.strings.push(text.to_owned());
        state.ids.insert(text.to_owned(), id);
        id
    }

    /// Look up an id without interning.
    pub fn get(&self, text: &str) -> Option<StringId> {
        self.state.read().ids.get(text).copied()
    }

    /// Resolve an id back to its text.
    ///
    /// Panics if `id` did not come from this interner.
    pub fn resolve(&self, id: StringId) -> String {
        self.state.read().strings[id.0 as usize].clone()
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.state.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringInterner")
            .field("strings", &self.len())
            .finish()
    }
}
