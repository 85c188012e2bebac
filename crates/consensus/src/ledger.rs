//! Ledger summaries: per-ledger `(id, size, root hash)` freshness claims.
//!
//! A summary is attached to every ViewChangeDone so that voters agree not only
//! on a primary but on the ledger state the new view starts from. Summaries are
//! compared structurally; the registry must therefore report ledgers in a
//! stable configured order.

use crate::{Error, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sovra_core::Hash256;
use sovra_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use std::fmt;

/// Upper bound on ledgers carried in one summary.
pub const MAX_LEDGERS_PER_SUMMARY: usize = 256;

/// Identifier of a registered ledger.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LedgerId(pub u32);

impl LedgerId {
    /// Creates a new ledger id.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Gets the ledger id value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ledger's contribution to a summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerInfo {
    /// Which ledger this entry describes.
    pub ledger_id: LedgerId,
    /// Number of transactions in the ledger.
    pub size: u64,
    /// Merkle root over the ledger contents.
    pub root_hash: Hash256,
}

impl LedgerInfo {
    /// Creates a new ledger info triple.
    pub fn new(ledger_id: LedgerId, size: u64, root_hash: Hash256) -> Self {
        Self {
            ledger_id,
            size,
            root_hash,
        }
    }
}

impl Serializable for LedgerInfo {
    fn size(&self) -> usize {
        4 + 8 + Serializable::size(&self.root_hash)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.ledger_id.value())?;
        writer.write_u64(self.size)?;
        writer.write_serializable(&self.root_hash)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            ledger_id: LedgerId::new(reader.read_u32()?),
            size: reader.read_u64()?,
            root_hash: <Hash256 as Serializable>::deserialize(reader)?,
        })
    }
}

/// Ordered sequence of [`LedgerInfo`], one entry per registered ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerSummary(Vec<LedgerInfo>);

impl LedgerSummary {
    /// Creates a summary from entries already in configured order.
    pub fn new(infos: Vec<LedgerInfo>) -> Self {
        Self(infos)
    }

    /// Gets the entries in order.
    pub fn infos(&self) -> &[LedgerInfo] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks whether this summary lags behind an accepted one.
    ///
    /// Entries are compared pairwise by position; the node is behind when any
    /// local size is strictly smaller than the accepted size. Being ahead is
    /// acceptable.
    pub fn is_behind(&self, accepted: &LedgerSummary) -> bool {
        self.0
            .iter()
            .zip(accepted.0.iter())
            .any(|(own, accepted)| own.size < accepted.size)
    }
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, info) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {}, {})", info.ledger_id, info.size, info.root_hash)?;
        }
        write!(f, "]")
    }
}

impl Serializable for LedgerSummary {
    fn size(&self) -> usize {
        helper::get_array_size(&self.0)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        helper::serialize_array(&self.0, writer)
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self(helper::deserialize_array(
            reader,
            MAX_LEDGERS_PER_SUMMARY,
        )?))
    }
}

impl FromIterator<LedgerInfo> for LedgerSummary {
    fn from_iter<T: IntoIterator<Item = LedgerInfo>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Read-only view onto the ledgers of the enclosing node.
///
/// The selector reads through on every call; summaries are never cached
/// because an election needs the freshest sizes at the moment a
/// ViewChangeDone is composed.
pub trait LedgerService {
    /// Current summary of every registered ledger, in configured order.
    fn ledger_summary(&self) -> LedgerSummary;

    /// Ids of the registered ledgers, in configured order.
    fn ledger_ids(&self) -> Vec<LedgerId>;
}

/// In-memory ledger registry, the standard [`LedgerService`] implementation.
///
/// Registration order is preserved and defines the summary order.
#[derive(Debug, Default)]
pub struct LedgerRegistry {
    ledgers: IndexMap<LedgerId, LedgerState>,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    size: u64,
    root_hash: Hash256,
}

impl LedgerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ledger with an empty state. Registering an id twice is an
    /// error; the configured order would become ambiguous.
    pub fn register_ledger(&mut self, ledger_id: LedgerId) -> Result<()> {
        if self.ledgers.contains_key(&ledger_id) {
            return Err(Error::InvalidConfig(format!(
                "ledger {ledger_id} is already registered"
            )));
        }
        self.ledgers.insert(ledger_id, LedgerState::default());
        Ok(())
    }

    /// Updates the recorded size and root hash of a registered ledger.
    pub fn set_ledger_state(
        &mut self,
        ledger_id: LedgerId,
        size: u64,
        root_hash: Hash256,
    ) -> Result<()> {
        match self.ledgers.get_mut(&ledger_id) {
            Some(state) => {
                state.size = size;
                state.root_hash = root_hash;
                Ok(())
            }
            None => Err(Error::InvalidConfig(format!(
                "ledger {ledger_id} is not registered"
            ))),
        }
    }

    /// Checks whether a ledger is registered.
    pub fn contains(&self, ledger_id: LedgerId) -> bool {
        self.ledgers.contains_key(&ledger_id)
    }

    /// Number of registered ledgers.
    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}

impl LedgerService for LedgerRegistry {
    fn ledger_summary(&self) -> LedgerSummary {
        self.ledgers
            .iter()
            .map(|(id, state)| LedgerInfo::new(*id, state.size, state.root_hash))
            .collect()
    }

    fn ledger_ids(&self) -> Vec<LedgerId> {
        self.ledgers.keys().copied().collect()
    }
}

impl LedgerService for RwLock<LedgerRegistry> {
    fn ledger_summary(&self) -> LedgerSummary {
        self.read().ledger_summary()
    }

    fn ledger_ids(&self) -> Vec<LedgerId> {
        self.read().ledger_ids()
    }
}
