//! Interned identifiers.
//!
//! Function, variable, struct and field names are interned once into a
//! process-wide sharded table and handed out as `&'static str`. Two `Name`s
//! are equal iff they point at the same interned string.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

const NUM_SHARDS: usize = 16;

struct NameTable {
    shards: [RwLock<FxHashSet<&'static str>>; NUM_SHARDS],
}

impl NameTable {
    fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| RwLock::new(FxHashSet::default())),
        }
    }

    fn shard_for(text: &str) -> usize {
        let mut hasher = rustc_hash::FxHasher::default();
        text.hash(&mut hasher);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "truncation is fine for hash-based shard selection"
        )]
        let hash = hasher.finish() as usize;
        hash % NUM_SHARDS
    }

    fn intern(&self, text: &str) -> &'static str {
        let shard = &self.shards[Self::shard_for(text)];

        if let Some(&interned) = shard.read().get(text) {
            return interned;
        }

        let mut guard = shard.write();
        if let Some(&interned) = guard.get(text) {
            return interned;
        }
        let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
        guard.insert(leaked);
        leaked
    }
}

static NAMES: LazyLock<NameTable> = LazyLock::new(NameTable::new);

/// An interned identifier.
#[derive(Copy, Clone)]
pub struct Name(&'static str);

impl Name {
    /// Intern `text`, returning the shared handle.
    pub fn intern(text: &str) -> Self {
        Name(NAMES.intern(text))
    }

    /// The interned text.
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl PartialEq for Name {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(other.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::intern(text)
    }
}
