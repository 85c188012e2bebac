//! BLS-BFT helper creation.
//!
//! Multi-signature computation itself is provided by an external crypto
//! collaborator; this module only locates the node's key material and builds
//! the per-replica helper handle. BLS is an optimization, not a precondition
//! for safety: a node without keys keeps ordering without it.

use crate::{Error, NodeName, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of a node's BLS public key inside its key directory.
pub const BLS_PUBLIC_KEY_FILE: &str = "bls_pk";

/// Pairing group parameters for the Charm backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsGroupParams {
    /// Name of the pairing group.
    pub group_name: String,
    /// Generator of G2, hex-encoded.
    pub generator: String,
}

impl BlsGroupParams {
    /// The hardcoded parameters every pool member shares.
    pub fn hardcoded() -> Self {
        Self {
            group_name: "MNT224".to_string(),
            generator: "3knsb6fBd9ZnzqNn6tn2BkzJNIcOXPNnd7tO2DJ0ZRPKE0TTZo".to_string(),
        }
    }
}

/// Which BLS backend supplies the crypto, with the parameters each needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlsProvider {
    /// The indy-crypto backend; group parameters are built into the library.
    Indy { keys_dir: PathBuf },
    /// The Charm backend with explicit group parameters.
    Charm {
        keys_dir: PathBuf,
        group_params: BlsGroupParams,
    },
}

impl BlsProvider {
    /// Directory holding one key subdirectory per node.
    pub fn keys_dir(&self) -> &Path {
        match self {
            Self::Indy { keys_dir } => keys_dir,
            Self::Charm { keys_dir, .. } => keys_dir,
        }
    }
}

/// A node's BLS public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsPublicKey(Vec<u8>);

impl BlsPublicKey {
    /// Wraps raw key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrows the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex rendering of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Builds one [`BlsBft`] helper per replica.
pub struct BlsBftFactory {
    provider: BlsProvider,
    node_name: NodeName,
}

impl BlsBftFactory {
    /// Creates a factory for the given backend and node.
    pub fn new(provider: BlsProvider, node_name: NodeName) -> Self {
        Self {
            provider,
            node_name,
        }
    }

    /// Creates the BLS-BFT helper for one replica.
    ///
    /// Fails with [`Error::MissingBlsKeys`] when the node has no key file;
    /// that failure is recoverable for the caller. A key file with unusable
    /// content is [`Error::BlsKeyStore`] and is not.
    pub fn create_bls_bft(&self, is_master: bool) -> Result<BlsBft> {
        let public_key = self.load_public_key()?;
        debug!(
            "{} created BLS-BFT helper ({}) with key {}",
            self.node_name,
            if is_master { "master" } else { "backup" },
            public_key,
        );
        Ok(BlsBft {
            node_name: self.node_name.clone(),
            is_master,
            public_key,
        })
    }

    fn load_public_key(&self) -> Result<BlsPublicKey> {
        let path = self
            .provider
            .keys_dir()
            .join(self.node_name.as_str())
            .join(BLS_PUBLIC_KEY_FILE);

        let content = std::fs::read_to_string(&path).map_err(|_| Error::MissingBlsKeys {
            node_name: self.node_name.to_string(),
        })?;

        let bytes = hex::decode(content.trim()).map_err(|e| {
            Error::BlsKeyStore(format!("invalid key material in {}: {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(Error::BlsKeyStore(format!("empty key in {}", path.display())));
        }
        Ok(BlsPublicKey::new(bytes))
    }
}

/// Per-replica BLS helper handle.
///
/// Master and backup helpers differ only in whether their signatures end up
/// in the multi-signature the master aggregates.
#[derive(Debug, Clone)]
pub struct BlsBft {
    node_name: NodeName,
    is_master: bool,
    public_key: BlsPublicKey,
}

impl BlsBft {
    /// The node this helper signs for.
    pub fn node_name(&self) -> &NodeName {
        &self.node_name
    }

    /// Whether this helper serves the master instance.
    pub fn is_master(&self) -> bool {
        self.is_master
    }

    /// The node's BLS public key.
    pub fn public_key(&self) -> &BlsPublicKey {
        &self.public_key
    }
}
