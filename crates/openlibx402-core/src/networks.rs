//! Registry of Solana networks recognized by the protocol.
//!
//! The wire `network` field is one of three fixed strings. Keeping the set
//! typed means a malformed network name is rejected at decode time rather
//! than at settlement time.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// A Solana cluster a payment can settle on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolanaNetwork {
    #[serde(rename = "solana-mainnet")]
    Mainnet,
    #[serde(rename = "solana-devnet")]
    Devnet,
    #[serde(rename = "solana-testnet")]
    Testnet,
}

impl SolanaNetwork {
    /// The canonical wire name of the network.
    pub fn as_str(&self) -> &'static str {
        match self {
            SolanaNetwork::Mainnet => "solana-mainnet",
            SolanaNetwork::Devnet => "solana-devnet",
            SolanaNetwork::Testnet => "solana-testnet",
        }
    }

    /// The public RPC endpoint used when no override is configured.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            SolanaNetwork::Mainnet => "https://api.mainnet-beta.solana.com",
            SolanaNetwork::Devnet => "https://api.devnet.solana.com",
            SolanaNetwork::Testnet => "https://api.testnet.solana.com",
        }
    }

    /// All networks the protocol knows about.
    pub fn variants() -> &'static [SolanaNetwork] {
        &[
            SolanaNetwork::Mainnet,
            SolanaNetwork::Devnet,
            SolanaNetwork::Testnet,
        ]
    }
}

impl Display for SolanaNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SolanaNetwork {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SolanaNetwork::variants()
            .iter()
            .find(|n| n.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownNetwork(s.to_string()))
    }
}

/// The network name is not one of the recognized clusters.
#[derive(Debug, thiserror::Error)]
#[error("Unknown network: {0}")]
pub struct UnknownNetwork(pub String);
