//! Static protocol metadata and the parameters a session is initialized with.

pub mod params;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use params::{Curve, ProtocolParams, Role};

/// The four protocols the routing core knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    DistributedKeyGen,
    KeyRefresh,
    Ed25519ThresholdSign,
    EcdsaTwoPartySign,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::DistributedKeyGen,
        ProtocolKind::KeyRefresh,
        ProtocolKind::Ed25519ThresholdSign,
        ProtocolKind::EcdsaTwoPartySign,
    ];

    pub const fn descriptor(self) -> ProtocolDescriptor {
        match self {
            ProtocolKind::DistributedKeyGen => ProtocolDescriptor {
                kind: self,
                total_rounds: 3,
                fan_out: FanOut::Broadcast,
                output: TerminalOutput::KeyShare,
            },
            ProtocolKind::KeyRefresh => ProtocolDescriptor {
                kind: self,
                total_rounds: 3,
                fan_out: FanOut::Broadcast,
                output: TerminalOutput::RefreshedKeyShare,
            },
            ProtocolKind::Ed25519ThresholdSign => ProtocolDescriptor {
                kind: self,
                total_rounds: 3,
                fan_out: FanOut::Broadcast,
                output: TerminalOutput::Signature,
            },
            ProtocolKind::EcdsaTwoPartySign => ProtocolDescriptor {
                kind: self,
                total_rounds: 5,
                fan_out: FanOut::Pairwise,
                output: TerminalOutput::Signature,
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProtocolKind::DistributedKeyGen => "keygen",
            ProtocolKind::KeyRefresh => "refresh",
            ProtocolKind::Ed25519ThresholdSign => "ed25519_sign",
            ProtocolKind::EcdsaTwoPartySign => "ecdsa_sign",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How messages of one round are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanOut {
    /// Every party addresses every other party in the active set each round.
    Broadcast,
    /// Two fixed roles hand a single payload back and forth, one step at a time.
    Pairwise,
}

/// What the terminal round hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalOutput {
    KeyShare,
    RefreshedKeyShare,
    /// Signature pair (R, S).
    Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    pub kind: ProtocolKind,
    /// Rounds for broadcast protocols, steps for pairwise ones.
    pub total_rounds: u32,
    pub fan_out: FanOut,
    pub output: TerminalOutput,
}

impl ProtocolDescriptor {
    /// Whether `role` is the one that runs `step` of a pairwise protocol.
    ///
    /// P1 drives the odd steps, P2 the even ones. Broadcast protocols have
    /// every party drive every round.
    pub fn drives(&self, role: Option<Role>, step: u32) -> bool {
        if step == 0 || step > self.total_rounds {
            return false;
        }
        match (self.fan_out, role) {
            (FanOut::Broadcast, _) => true,
            (FanOut::Pairwise, Some(Role::P1)) => step % 2 == 1,
            (FanOut::Pairwise, Some(Role::P2)) => step % 2 == 0,
            (FanOut::Pairwise, None) => false,
        }
    }

    /// The round a session should run after having completed `current`.
    ///
    /// `current` is 0 before the first round. Returns `None` once the role
    /// has no rounds left.
    pub fn next_round(&self, role: Option<Role>, current: u32) -> Option<u32> {
        (current + 1..=self.total_rounds).find(|&r| self.drives(role, r))
    }

    /// The last round this role runs; completing it completes the session.
    pub fn last_round(&self, role: Option<Role>) -> Option<u32> {
        (1..=self.total_rounds).rev().find(|&r| self.drives(role, r))
    }

    /// Whether `round` hands back final material instead of an outbound payload.
    ///
    /// In a pairwise protocol only the role that runs the protocol's last step
    /// finalizes. The other role's last step still emits a payload.
    pub fn finalizes(&self, role: Option<Role>, round: u32) -> bool {
        round == self.total_rounds && self.drives(role, round)
    }

    /// Whether `round` consumes an inbound batch. Only the opening move does not.
    pub fn requires_inbound(&self, round: u32) -> bool {
        round > 1
    }
}
