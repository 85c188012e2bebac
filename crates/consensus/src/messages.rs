//! Consensus message types and their canonical encoding.
//!
//! Structurally equal messages must encode to identical bytes: digests and
//! the vote grouping of the primary selector both operate on encoded form.
//! Every type therefore implements [`Serializable`] with a fixed field order
//! in addition to the serde derives used for diagnostics and configuration.

use crate::{
    ledger::LedgerSummary, Error, InstanceId, NodeName, Result, SeqNumber, ThreePhaseKey,
    ViewNumber,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sovra_core::constants::MAX_NODE_NAME_LENGTH;
use sovra_core::Hash256;
use sovra_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};

/// Upper bound on the request payload carried by one PrePrepare.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Upper bound on ViewChangeDone messages embedded in one CurrentState.
pub const MAX_EMBEDDED_MESSAGES: usize = 1024;

/// SHA-256 over the canonical encoding of a value.
pub fn canonical_digest<T: Serializable>(value: &T) -> Hash256 {
    let bytes = value.to_array().unwrap_or_default();
    let hash = Sha256::digest(&bytes);
    Hash256::from_bytes(hash.as_slice()).unwrap_or_default()
}

/// Consensus message kind tags used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Sender completed the view change and proposes a primary
    ViewChangeDone = 0x00,
    /// Carrier of an accepted election result for late joiners
    CurrentState = 0x01,
    /// Ordering proposal from an instance primary
    PrePrepare = 0x02,
    /// Backup agreement with a PrePrepare
    Prepare = 0x03,
    /// Commitment to an agreed slot
    Commit = 0x04,
    /// Stable checkpoint over a slot range
    Checkpoint = 0x05,
}

impl MessageKind {
    /// Converts from a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::ViewChangeDone),
            0x01 => Some(Self::CurrentState),
            0x02 => Some(Self::PrePrepare),
            0x03 => Some(Self::Prepare),
            0x04 => Some(Self::Commit),
            0x05 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts to a wire byte.
    pub fn to_byte(&self) -> u8 {
        *self as u8
    }
}

/// A sender's signed statement that it completed the view change and proposes
/// `name` as primary, together with its ledger summary at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChangeDone {
    /// The sender's current view.
    pub view_no: ViewNumber,
    /// Node proposed as master primary of the view.
    pub name: NodeName,
    /// The sender's ledger summary, the freshness claim of the vote.
    pub ledger_summary: LedgerSummary,
}

impl ViewChangeDone {
    /// Creates a new ViewChangeDone message.
    pub fn new(view_no: ViewNumber, name: NodeName, ledger_summary: LedgerSummary) -> Self {
        Self {
            view_no,
            name,
            ledger_summary,
        }
    }

    /// Canonical digest of this message.
    pub fn digest(&self) -> Hash256 {
        canonical_digest(self)
    }
}

impl Serializable for ViewChangeDone {
    fn size(&self) -> usize {
        8 + helper::get_var_bytes_size(self.name.as_str().len())
            + Serializable::size(&self.ledger_summary)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.view_no.value())?;
        writer.write_var_string(self.name.as_str())?;
        writer.write_serializable(&self.ledger_summary)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            view_no: ViewNumber::new(reader.read_u64()?),
            name: NodeName::from(reader.read_var_string(MAX_NODE_NAME_LENGTH)?),
            ledger_summary: <LedgerSummary as Serializable>::deserialize(reader)?,
        })
    }
}

/// Carrier message letting a newly joined node learn the selected primary of
/// a view without taking part in the election.
///
/// The `primary` entries are canonically encoded [`ViewChangeDone`] messages
/// the sender considers accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentState {
    /// View the carried election result belongs to.
    pub view_no: ViewNumber,
    /// Serialized ViewChangeDone messages, at least one.
    pub primary: Vec<Vec<u8>>,
}

impl CurrentState {
    /// Creates a CurrentState carrying the given election results.
    pub fn new(view_no: ViewNumber, carried: &[ViewChangeDone]) -> Result<Self> {
        let primary = carried
            .iter()
            .map(|msg| msg.to_array().map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { view_no, primary })
    }

    /// Decodes the carried ViewChangeDone messages.
    ///
    /// All-or-nothing: a single malformed entry poisons the whole message,
    /// which the caller discards.
    pub fn view_change_dones(&self) -> Result<Vec<ViewChangeDone>> {
        self.primary
            .iter()
            .map(|bytes| {
                ViewChangeDone::from_array(bytes)
                    .map_err(|e| Error::InvalidMessage(format!("embedded ViewChangeDone: {e}")))
            })
            .collect()
    }
}

impl Serializable for CurrentState {
    fn size(&self) -> usize {
        8 + self
            .primary
            .iter()
            .fold(helper::get_var_size(self.primary.len() as u64), |acc, m| {
                acc + helper::get_var_bytes_size(m.len())
            })
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.view_no.value())?;
        writer.write_var_int(self.primary.len() as u64)?;
        for message in &self.primary {
            writer.write_var_bytes(message)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let view_no = ViewNumber::new(reader.read_u64()?);
        let count = reader.read_var_int(MAX_EMBEDDED_MESSAGES as u64)? as usize;
        let mut primary = Vec::with_capacity(count);
        for _ in 0..count {
            primary.push(reader.read_var_bytes(MAX_PAYLOAD_SIZE)?);
        }
        Ok(Self { view_no, primary })
    }
}

/// Ordering proposal from an instance primary for slot `(view_no, seq_no)`.
///
/// The request batch itself is opaque to the consensus core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepare {
    pub view_no: ViewNumber,
    pub seq_no: SeqNumber,
    /// Primary's clock when the proposal was composed, seconds since epoch.
    pub pp_time: u64,
    /// Opaque request batch.
    pub payload: Vec<u8>,
}

impl PrePrepare {
    /// Creates a new PrePrepare.
    pub fn new(view_no: ViewNumber, seq_no: SeqNumber, pp_time: u64, payload: Vec<u8>) -> Self {
        Self {
            view_no,
            seq_no,
            pp_time,
            payload,
        }
    }

    /// The 3PC key of this proposal.
    pub fn key(&self) -> ThreePhaseKey {
        ThreePhaseKey::new(self.view_no, self.seq_no)
    }

    /// Canonical digest of this message.
    pub fn digest(&self) -> Hash256 {
        canonical_digest(self)
    }
}

impl Serializable for PrePrepare {
    fn size(&self) -> usize {
        8 + 8 + 8 + helper::get_var_bytes_size(self.payload.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.view_no.value())?;
        writer.write_u64(self.seq_no.value())?;
        writer.write_u64(self.pp_time)?;
        writer.write_var_bytes(&self.payload)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            view_no: ViewNumber::new(reader.read_u64()?),
            seq_no: SeqNumber::new(reader.read_u64()?),
            pp_time: reader.read_u64()?,
            payload: reader.read_var_bytes(MAX_PAYLOAD_SIZE)?,
        })
    }
}

/// Backup agreement with the PrePrepare whose digest is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepare {
    pub view_no: ViewNumber,
    pub seq_no: SeqNumber,
    /// Digest of the matching PrePrepare.
    pub digest: Hash256,
}

impl Prepare {
    pub fn new(view_no: ViewNumber, seq_no: SeqNumber, digest: Hash256) -> Self {
        Self {
            view_no,
            seq_no,
            digest,
        }
    }

    /// The 3PC key of the slot being prepared.
    pub fn key(&self) -> ThreePhaseKey {
        ThreePhaseKey::new(self.view_no, self.seq_no)
    }
}

impl Serializable for Prepare {
    fn size(&self) -> usize {
        8 + 8 + Serializable::size(&self.digest)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.view_no.value())?;
        writer.write_u64(self.seq_no.value())?;
        writer.write_serializable(&self.digest)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            view_no: ViewNumber::new(reader.read_u64()?),
            seq_no: SeqNumber::new(reader.read_u64()?),
            digest: <Hash256 as Serializable>::deserialize(reader)?,
        })
    }
}

/// Commitment to an agreed slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub view_no: ViewNumber,
    pub seq_no: SeqNumber,
}

impl Commit {
    pub fn new(view_no: ViewNumber, seq_no: SeqNumber) -> Self {
        Self { view_no, seq_no }
    }

    /// The 3PC key of the slot being committed.
    pub fn key(&self) -> ThreePhaseKey {
        ThreePhaseKey::new(self.view_no, self.seq_no)
    }
}

impl Serializable for Commit {
    fn size(&self) -> usize {
        8 + 8
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.view_no.value())?;
        writer.write_u64(self.seq_no.value())?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            view_no: ViewNumber::new(reader.read_u64()?),
            seq_no: SeqNumber::new(reader.read_u64()?),
        })
    }
}

/// Stable checkpoint over the slot range `[seq_no_start, seq_no_end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub view_no: ViewNumber,
    pub seq_no_start: SeqNumber,
    pub seq_no_end: SeqNumber,
    /// Digest of the state at `seq_no_end`.
    pub digest: Hash256,
}

impl Checkpoint {
    pub fn new(
        view_no: ViewNumber,
        seq_no_start: SeqNumber,
        seq_no_end: SeqNumber,
        digest: Hash256,
    ) -> Self {
        Self {
            view_no,
            seq_no_start,
            seq_no_end,
            digest,
        }
    }
}

impl Serializable for Checkpoint {
    fn size(&self) -> usize {
        8 + 8 + 8 + Serializable::size(&self.digest)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u64(self.view_no.value())?;
        writer.write_u64(self.seq_no_start.value())?;
        writer.write_u64(self.seq_no_end.value())?;
        writer.write_serializable(&self.digest)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        Ok(Self {
            view_no: ViewNumber::new(reader.read_u64()?),
            seq_no_start: SeqNumber::new(reader.read_u64()?),
            seq_no_end: SeqNumber::new(reader.read_u64()?),
            digest: <Hash256 as Serializable>::deserialize(reader)?,
        })
    }
}

/// Notification that an instance ordered the slot `(view_no, seq_no)`.
///
/// Ordered messages never cross the wire; they travel from a replica's outbox
/// to the enclosing node for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordered {
    pub instance_id: InstanceId,
    pub view_no: ViewNumber,
    pub seq_no: SeqNumber,
    /// Digest of the ordered PrePrepare.
    pub digest: Hash256,
}

impl Ordered {
    pub fn new(
        instance_id: InstanceId,
        view_no: ViewNumber,
        seq_no: SeqNumber,
        digest: Hash256,
    ) -> Self {
        Self {
            instance_id,
            view_no,
            seq_no,
            digest,
        }
    }
}

/// A three-phase message routed to replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaMessage {
    PrePrepare(PrePrepare),
    Prepare(Prepare),
    Commit(Commit),
    Checkpoint(Checkpoint),
}

impl ReplicaMessage {
    /// The wire kind of the wrapped message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::PrePrepare(_) => MessageKind::PrePrepare,
            Self::Prepare(_) => MessageKind::Prepare,
            Self::Commit(_) => MessageKind::Commit,
            Self::Checkpoint(_) => MessageKind::Checkpoint,
        }
    }

    /// The view the wrapped message belongs to.
    pub fn view_no(&self) -> ViewNumber {
        match self {
            Self::PrePrepare(m) => m.view_no,
            Self::Prepare(m) => m.view_no,
            Self::Commit(m) => m.view_no,
            Self::Checkpoint(m) => m.view_no,
        }
    }
}

/// Top-level consensus message as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    ViewChangeDone(ViewChangeDone),
    CurrentState(CurrentState),
    ThreePhase(ReplicaMessage),
}

impl ConsensusMessage {
    /// The wire kind tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::ViewChangeDone(_) => MessageKind::ViewChangeDone,
            Self::CurrentState(_) => MessageKind::CurrentState,
            Self::ThreePhase(m) => m.kind(),
        }
    }

    /// The view this message belongs to.
    pub fn view_no(&self) -> ViewNumber {
        match self {
            Self::ViewChangeDone(m) => m.view_no,
            Self::CurrentState(m) => m.view_no,
            Self::ThreePhase(m) => m.view_no(),
        }
    }
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        1 + match self {
            Self::ViewChangeDone(m) => m.size(),
            Self::CurrentState(m) => m.size(),
            Self::ThreePhase(ReplicaMessage::PrePrepare(m)) => m.size(),
            Self::ThreePhase(ReplicaMessage::Prepare(m)) => m.size(),
            Self::ThreePhase(ReplicaMessage::Commit(m)) => m.size(),
            Self::ThreePhase(ReplicaMessage::Checkpoint(m)) => m.size(),
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.kind().to_byte())?;
        match self {
            Self::ViewChangeDone(m) => Serializable::serialize(m, writer),
            Self::CurrentState(m) => Serializable::serialize(m, writer),
            Self::ThreePhase(ReplicaMessage::PrePrepare(m)) => Serializable::serialize(m, writer),
            Self::ThreePhase(ReplicaMessage::Prepare(m)) => Serializable::serialize(m, writer),
            Self::ThreePhase(ReplicaMessage::Commit(m)) => Serializable::serialize(m, writer),
            Self::ThreePhase(ReplicaMessage::Checkpoint(m)) => Serializable::serialize(m, writer),
        }
    }

    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self> {
        let tag = reader.read_u8()?;
        let kind = MessageKind::from_byte(tag).ok_or_else(|| {
            sovra_io::IoError::invalid_data("message kind", format!("unknown tag {tag:#04x}"))
        })?;
        Ok(match kind {
            MessageKind::ViewChangeDone => {
                Self::ViewChangeDone(<ViewChangeDone as Serializable>::deserialize(reader)?)
            }
            MessageKind::CurrentState => Self::CurrentState(<CurrentState as Serializable>::deserialize(reader)?),
            MessageKind::PrePrepare => {
                Self::ThreePhase(ReplicaMessage::PrePrepare(<PrePrepare as Serializable>::deserialize(reader)?))
            }
            MessageKind::Prepare => {
                Self::ThreePhase(ReplicaMessage::Prepare(<Prepare as Serializable>::deserialize(reader)?))
            }
            MessageKind::Commit => {
                Self::ThreePhase(ReplicaMessage::Commit(<Commit as Serializable>::deserialize(reader)?))
            }
            MessageKind::Checkpoint => {
                Self::ThreePhase(ReplicaMessage::Checkpoint(<Checkpoint as Serializable>::deserialize(reader)?))
            }
        })
    }
}

/// Output of a replica, drained by the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaOutput {
    /// A slot was ordered; destined for the enclosing node.
    Ordered(Ordered),
    /// A protocol message destined for the transport.
    Consensus(ReplicaMessage),
}

impl ReplicaOutput {
    /// Checks whether this output is an Ordered notification.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Ordered(_))
    }
}
