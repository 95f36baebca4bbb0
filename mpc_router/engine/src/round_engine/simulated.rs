//! In-process stand-in for the native round engine.
//!
//! It does no real cryptography. It speaks the same wire shapes as the native
//! engine, checks every inbound batch it is handed (sender set, addressee,
//! round), and derives its outputs with blake3 so that every honest party
//! ends up with the same public key or the same (R, S). A misrouted message
//! therefore shows up as an engine error or as diverging outputs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::EngineError;
use crate::protocol::{Curve, FanOut, ProtocolKind, ProtocolParams, Role};
use crate::round_engine::{EcdsaP1Prepared, EngineHandle, RoundEngine};
use crate::types::PartyId;

/// One addressed message inside a broadcast round's envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireMessage {
    pub from: u32,
    pub to: u32,
    pub round: u32,
    pub data: String,
    /// Extra nested field, shaped like the proof blobs real engines attach.
    pub proof: WireProof,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireProof {
    pub c: String,
    /// Carries delimiter characters on purpose; routing must not trip over them.
    pub tag: String,
}

/// Payload of one step of the two-party exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepMessage {
    pub step: u32,
    pub from: u32,
    pub body: BTreeMap<String, String>,
}

/// Key-share material produced by keygen and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimKeyShare {
    pub curve: Curve,
    pub party_id: PartyId,
    pub threshold: u16,
    pub parties: Vec<PartyId>,
    pub public_key: String,
    pub share: String,
    /// Bumped by every refresh.
    pub epoch: u32,
}

/// Two-party signing material: a keygen share plus what key preparation
/// adds for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEcdsaKey {
    pub key: SimKeyShare,
    pub role: Role,
    pub peer: PartyId,
    /// P1 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paillier: Option<String>,
    /// P1 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_x1: Option<String>,
    /// P2 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2_save: Option<String>,
}

/// Pedersen parameters P2 publishes before key preparation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimP2Params {
    pub pedersen: String,
    pub proof: String,
}

/// What P1's preparation sends to P2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SimPrepareMessage {
    pub from: u32,
    pub to: u32,
    pub e_x1: String,
    pub proof: String,
}

/// Signature pair (R, S).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSignature {
    pub r: String,
    pub s: String,
}

struct SimState {
    params: ProtocolParams,
    secret: [u8; 32],
    last_round: u32,
    key: Option<SimKeyShare>,
    /// Round-1 data from every party, this one included.
    commitments: BTreeMap<PartyId, String>,
    /// Round-2 data addressed to this party, plus its own contribution.
    contributions: BTreeMap<PartyId, String>,
    /// Values received from the peer during the two-party exchange.
    peer_values: BTreeMap<String, String>,
}

/// Simulated engine with fault injection and handle accounting for tests.
pub struct SimulatedEngine {
    states: Mutex<HashMap<u64, SimState>>,
    next_handle: AtomicU64,
    released: AtomicUsize,
    faults: Mutex<HashSet<(PartyId, u32)>>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        SimulatedEngine {
            states: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            released: AtomicUsize::new(0),
            faults: Mutex::new(HashSet::new()),
        }
    }

    /// Make `party`'s engine call for `round` fail once it is reached.
    pub fn fail_at(&self, party: PartyId, round: u32) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((party, round));
    }

    /// Handles initialized and not yet destroyed.
    pub fn live_handles(&self) -> usize {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Handles actually released by `destroy`. Repeated destroys do not count.
    pub fn released_handles(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn lock_states(&self) -> Result<MutexGuard<'_, HashMap<u64, SimState>>, EngineError> {
        self.states
            .lock()
            .map_err(|_| EngineError::new(EngineError::MEMORY, "engine state lock poisoned"))
    }

    fn check_fault(&self, party: PartyId, round: u32) -> Result<(), EngineError> {
        let faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if faults.contains(&(party, round)) {
            return Err(EngineError::crypto(format!(
                "injected fault for party {party} in round {round}"
            )));
        }
        Ok(())
    }

    fn with_state<T>(
        &self,
        handle: EngineHandle,
        f: impl FnOnce(&mut SimState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut states = self.lock_states()?;
        let state = states
            .get_mut(&handle.0)
            .ok_or_else(|| EngineError::invalid_param(format!("unknown {handle}")))?;
        f(state)
    }
}

impl RoundEngine for SimulatedEngine {
    fn init(&self, params: &ProtocolParams) -> Result<EngineHandle, EngineError> {
        let key = match params.kind {
            ProtocolKind::DistributedKeyGen => None,
            ProtocolKind::EcdsaTwoPartySign => Some(load_ecdsa_key(params)?),
            _ => Some(load_key(params)?),
        };

        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.lock_states()?.insert(
            id,
            SimState {
                params: params.clone(),
                secret,
                last_round: 0,
                key,
                commitments: BTreeMap::new(),
                contributions: BTreeMap::new(),
                peer_values: BTreeMap::new(),
            },
        );

        debug!(handle = id, kind = %params.kind, party = %params.party_id, "simulated engine init");
        Ok(EngineHandle(id))
    }

    fn advance(
        &self,
        handle: EngineHandle,
        round: u32,
        inbound: Option<&[u8]>,
    ) -> Result<Vec<u8>, EngineError> {
        self.with_state(handle, |state| {
            self.check_fault(state.params.party_id, round)?;
            state.step_to(round)?;
            let out = match state.params.kind.descriptor().fan_out {
                FanOut::Broadcast => state.broadcast_round(round, inbound)?,
                FanOut::Pairwise => state.pairwise_step(round, inbound)?,
            };
            state.last_round = round;
            Ok(out)
        })
    }

    fn finalize(&self, handle: EngineHandle, inbound: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.with_state(handle, |state| {
            let round = state.params.kind.descriptor().total_rounds;
            self.check_fault(state.params.party_id, round)?;
            state.step_to(round)?;
            let out = match state.params.kind.descriptor().fan_out {
                FanOut::Broadcast => state.broadcast_final(inbound)?,
                FanOut::Pairwise => state.pairwise_final(inbound)?,
            };
            state.last_round = round;
            Ok(out)
        })
    }

    fn destroy(&self, handle: EngineHandle) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        if states.remove(&handle.0).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
            debug!(handle = handle.0, "simulated engine destroy");
        }
    }

    fn ecdsa_p2_params(&self) -> Result<Vec<u8>, EngineError> {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let pedersen = hex::encode(seed);
        let params = SimP2Params {
            proof: digest(&[b"pedersen", pedersen.as_bytes()]),
            pedersen,
        };
        serde_json::to_vec(&params).map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
    }

    fn ecdsa_prepare_p1(&self, key: &[u8], peer: PartyId, p2_params: &[u8]) -> Result<EcdsaP1Prepared, EngineError> {
        let share = two_party_share(key, peer)?;
        let pedersen = read_p2_params(p2_params)?;

        let mut paillier = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut paillier);
        let e_x1 = digest(&[b"enc", &paillier, share.share.as_bytes()]);
        let message = SimPrepareMessage {
            from: share.party_id.0,
            to: peer.0,
            proof: digest(&[b"x1proof", e_x1.as_bytes(), pedersen.as_bytes()]),
            e_x1: e_x1.clone(),
        };
        let prepared = SimEcdsaKey {
            key: share,
            role: Role::P1,
            peer,
            paillier: Some(hex::encode(paillier)),
            e_x1: Some(e_x1),
            p2_save: None,
        };

        debug!(party = %prepared.key.party_id, %peer, "simulated ecdsa key prepared for P1");
        Ok(EcdsaP1Prepared {
            material: Zeroizing::new(to_json(&prepared)?),
            message: to_json(&message)?,
        })
    }

    fn ecdsa_prepare_p2(
        &self,
        key: &[u8],
        p1: PartyId,
        p1_message: &[u8],
        p2_params: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        let share = two_party_share(key, p1)?;
        let pedersen = read_p2_params(p2_params)?;
        let msg: SimPrepareMessage = serde_json::from_slice(p1_message)
            .map_err(|e| EngineError::invalid_param(format!("unreadable P1 message: {e}")))?;
        if msg.from != p1.0 || msg.to != share.party_id.0 {
            return Err(EngineError::crypto(format!(
                "P1 message runs {} -> {}, expected {p1} -> {}",
                msg.from, msg.to, share.party_id
            )));
        }
        if msg.proof != digest(&[b"x1proof", msg.e_x1.as_bytes(), pedersen.as_bytes()]) {
            return Err(EngineError::crypto("P1's encryption proof does not verify"));
        }

        let prepared = SimEcdsaKey {
            p2_save: Some(digest(&[b"p2save", msg.e_x1.as_bytes(), share.share.as_bytes()])),
            key: share,
            role: Role::P2,
            peer: p1,
            paillier: None,
            e_x1: None,
        };
        debug!(party = %prepared.key.party_id, %p1, "simulated ecdsa key prepared for P2");
        Ok(Zeroizing::new(to_json(&prepared)?))
    }
}

impl SimState {
    fn me(&self) -> PartyId {
        self.params.party_id
    }

    /// Rounds must arrive in the order this party drives them.
    fn step_to(&self, round: u32) -> Result<(), EngineError> {
        let descriptor = self.params.kind.descriptor();
        if descriptor.next_round(self.params.role, self.last_round) != Some(round) {
            return Err(EngineError::invalid_param(format!(
                "round {round} out of order after round {}",
                self.last_round
            )));
        }
        Ok(())
    }

    fn domain(&self) -> [u8; 2] {
        [self.params.kind as u8, self.params.curve.code() as u8]
    }

    fn broadcast_round(&mut self, round: u32, inbound: Option<&[u8]>) -> Result<Vec<u8>, EngineError> {
        let me = self.me();
        let data: Box<dyn Fn(PartyId) -> String> = match round {
            1 => {
                if inbound.is_some() {
                    return Err(EngineError::invalid_param("round 1 takes no inbound batch"));
                }
                let commitment = digest(&[b"commit", &self.domain(), &me.0.to_be_bytes(), &self.secret]);
                self.commitments.insert(me, commitment.clone());
                Box::new(move |_: PartyId| commitment.clone())
            }
            2 => {
                let batch = inbound.ok_or_else(|| EngineError::invalid_param("round 2 needs an inbound batch"))?;
                for msg in self.accept_batch(batch, 1)? {
                    self.commitments.insert(PartyId(msg.from), msg.data);
                }
                match self.params.kind {
                    ProtocolKind::Ed25519ThresholdSign => {
                        let message = self.params.message.clone().unwrap_or_default();
                        let partial = digest(&[b"partial", &self.secret, &message]);
                        self.contributions.insert(me, partial.clone());
                        Box::new(move |_: PartyId| partial.clone())
                    }
                    _ => {
                        let secret = self.secret;
                        Box::new(move |to: PartyId| digest(&[b"share", &secret, &to.0.to_be_bytes()]))
                    }
                }
            }
            _ => return Err(EngineError::invalid_param(format!("no broadcast round {round}"))),
        };

        let envelope: BTreeMap<String, WireMessage> = self
            .params
            .peers()
            .map(|to| {
                let payload = data(to);
                let msg = WireMessage {
                    from: me.0,
                    to: to.0,
                    round,
                    proof: WireProof {
                        c: digest(&[b"proof", payload.as_bytes()]),
                        tag: format!("}}{{\"{}\":[{}", to, me),
                    },
                    data: payload,
                };
                (to.to_string(), msg)
            })
            .collect();

        serde_json::to_vec(&envelope).map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
    }

    fn broadcast_final(&mut self, inbound: &[u8]) -> Result<Vec<u8>, EngineError> {
        let me = self.me();
        for msg in self.accept_batch(inbound, 2)? {
            self.contributions.insert(PartyId(msg.from), msg.data);
        }
        let commitments: Vec<u8> = self.commitments.values().flat_map(|c| c.bytes()).collect();
        let contributions: Vec<u8> = self
            .contributions
            .iter()
            .filter(|(p, _)| **p != me)
            .flat_map(|(_, c)| c.bytes())
            .collect();

        let out = match self.params.kind {
            ProtocolKind::DistributedKeyGen => serde_json::to_vec(&SimKeyShare {
                curve: self.params.curve,
                party_id: me,
                threshold: self.params.threshold,
                parties: self.params.party_set.clone(),
                public_key: digest(&[b"public", &self.domain(), &commitments]),
                share: digest(&[b"keyshare", &self.secret, &contributions]),
                epoch: 0,
            }),
            ProtocolKind::KeyRefresh => {
                let prior = self.key.as_ref().ok_or_else(|| EngineError::invalid_param("refresh lost its key"))?;
                serde_json::to_vec(&SimKeyShare {
                    share: digest(&[b"refresh", prior.share.as_bytes(), &self.secret, &contributions]),
                    epoch: prior.epoch + 1,
                    threshold: self.params.threshold,
                    ..prior.clone()
                })
            }
            ProtocolKind::Ed25519ThresholdSign => {
                let prior = self.key.as_ref().ok_or_else(|| EngineError::invalid_param("signing lost its key"))?;
                let message = self.params.message.clone().unwrap_or_default();
                let partials: Vec<u8> = self.contributions.values().flat_map(|c| c.bytes()).collect();
                let r = digest(&[b"R", &commitments, &message]);
                let s = digest(&[b"S", prior.public_key.as_bytes(), r.as_bytes(), &partials]);
                serde_json::to_vec(&SimSignature { r, s })
            }
            ProtocolKind::EcdsaTwoPartySign => {
                return Err(EngineError::invalid_param("two-party signing is not a broadcast protocol"));
            }
        };
        out.map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
    }

    /// Parse an aggregated batch and check it holds exactly one round-`round`
    /// message from every peer, each addressed to this party.
    fn accept_batch(&self, bytes: &[u8], round: u32) -> Result<Vec<WireMessage>, EngineError> {
        let me = self.me();
        let messages: Vec<WireMessage> = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::crypto(format!("malformed inbound batch: {e}")))?;

        let expected: HashSet<u32> = self.params.peers().map(|p| p.0).collect();
        let mut seen = HashSet::new();
        for msg in &messages {
            if msg.to != me.0 {
                return Err(EngineError::crypto(format!(
                    "message from {} is addressed to {}, not {me}",
                    msg.from, msg.to
                )));
            }
            if msg.round != round {
                return Err(EngineError::crypto(format!(
                    "message from {} belongs to round {}, expected {round}",
                    msg.from, msg.round
                )));
            }
            if !expected.contains(&msg.from) || !seen.insert(msg.from) {
                return Err(EngineError::crypto(format!("unexpected sender {}", msg.from)));
            }
            if msg.proof.c != digest(&[b"proof", msg.data.as_bytes()]) {
                return Err(EngineError::crypto(format!("proof from {} does not verify", msg.from)));
            }
        }
        if seen.len() != expected.len() {
            return Err(EngineError::crypto(format!(
                "expected {} messages, got {}",
                expected.len(),
                seen.len()
            )));
        }
        Ok(messages)
    }

    fn pairwise_step(&mut self, step: u32, inbound: Option<&[u8]>) -> Result<Vec<u8>, EngineError> {
        let me = self.me();
        let message = self.params.message.clone().unwrap_or_default();
        let k = self.secret;

        if step > 1 {
            let bytes = inbound.ok_or_else(|| EngineError::invalid_param(format!("step {step} needs the peer's payload")))?;
            self.accept_step(bytes, step - 1)?;
        } else if inbound.is_some() {
            return Err(EngineError::invalid_param("step 1 takes no inbound payload"));
        }

        let body: Vec<(&str, String)> = match (self.params.role, step) {
            (Some(Role::P1), 1) => vec![("commitment", digest(&[b"commit", &k]))],
            (Some(Role::P2), 2) => vec![
                ("schnorr_proof", digest(&[b"proof", &k])),
                ("r2", digest(&[b"R2", &k])),
            ],
            (Some(Role::P1), 3) => vec![
                ("p1_proof", digest(&[b"p1proof", &k])),
                ("witness", hex::encode(k)),
            ],
            (Some(Role::P2), 4) => {
                let commitment = self.peer_value("commitment")?;
                let witness = hex::decode(self.peer_value("witness")?)
                    .map_err(|_| EngineError::crypto("witness is not hex"))?;
                if digest(&[b"commit", &witness]) != commitment {
                    return Err(EngineError::crypto("commitment opening does not match"));
                }
                let public_key = self.key.as_ref().map(|key| key.public_key.clone()).unwrap_or_default();
                vec![
                    ("ek", digest(&[b"ek", &k, &message, public_key.as_bytes()])),
                    ("affine_proof", digest(&[b"affine", &k, &witness])),
                ]
            }
            _ => {
                return Err(EngineError::invalid_param(format!("role {:?} does not run step {step}", self.params.role)));
            }
        };

        let msg = StepMessage {
            step,
            from: me.0,
            body: body.into_iter().map(|(name, v)| (name.to_string(), v)).collect(),
        };
        serde_json::to_vec(&msg).map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
    }

    fn pairwise_final(&mut self, inbound: &[u8]) -> Result<Vec<u8>, EngineError> {
        if self.params.role != Some(Role::P1) {
            return Err(EngineError::invalid_param("only P1 produces the signature"));
        }
        let total = self.params.kind.descriptor().total_rounds;
        self.accept_step(inbound, total - 1)?;

        let message = self.params.message.clone().unwrap_or_default();
        let r2 = self.peer_value("r2")?;
        let ek = self.peer_value("ek")?;
        let r = digest(&[b"r", &self.secret, r2.as_bytes()]);
        let s = digest(&[b"s", ek.as_bytes(), &message]);
        serde_json::to_vec(&SimSignature { r, s }).map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
    }

    fn accept_step(&mut self, bytes: &[u8], step: u32) -> Result<(), EngineError> {
        let msg: StepMessage = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::crypto(format!("malformed step payload: {e}")))?;
        let peer = self.params.peer().ok_or_else(|| EngineError::invalid_param("no peer"))?;
        if msg.step != step || msg.from != peer.0 {
            return Err(EngineError::crypto(format!(
                "expected step {step} from {peer}, got step {} from {}",
                msg.step, msg.from
            )));
        }
        self.peer_values.extend(msg.body);
        Ok(())
    }

    fn peer_value(&self, name: &str) -> Result<String, EngineError> {
        self.peer_values
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::crypto(format!("peer never sent {name}")))
    }
}

fn prior_material(params: &ProtocolParams) -> Result<&[u8], EngineError> {
    params
        .prior_key_material
        .as_deref()
        .map(Vec::as_slice)
        .ok_or_else(|| EngineError::invalid_param("missing key material"))
}

fn parse_share(raw: &[u8]) -> Result<SimKeyShare, EngineError> {
    serde_json::from_slice(raw).map_err(|e| EngineError::invalid_param(format!("unreadable key material: {e}")))
}

/// Parse and check the key material a refresh or threshold signing run starts from.
fn load_key(params: &ProtocolParams) -> Result<SimKeyShare, EngineError> {
    let key = parse_share(prior_material(params)?)?;
    check_key(&key, params)?;
    Ok(key)
}

/// Two-party signing only starts from prepared material, never a bare share.
fn load_ecdsa_key(params: &ProtocolParams) -> Result<SimKeyShare, EngineError> {
    let prepared: SimEcdsaKey = serde_json::from_slice(prior_material(params)?)
        .map_err(|_| EngineError::invalid_param("key material is not prepared for two-party signing"))?;

    if Some(prepared.role) != params.role {
        return Err(EngineError::invalid_param(format!(
            "key material was prepared for {:?}, session plays {:?}",
            prepared.role, params.role
        )));
    }
    if Some(prepared.peer) != params.peer() {
        return Err(EngineError::invalid_param(format!("key material was prepared with party {}", prepared.peer)));
    }
    let complete = match prepared.role {
        Role::P1 => prepared.paillier.is_some() && prepared.e_x1.is_some(),
        Role::P2 => prepared.p2_save.is_some(),
    };
    if !complete {
        return Err(EngineError::invalid_param(format!("key material lacks {:?} preparation data", prepared.role)));
    }
    check_key(&prepared.key, params)?;
    Ok(prepared.key)
}

fn check_key(key: &SimKeyShare, params: &ProtocolParams) -> Result<(), EngineError> {
    if key.curve != params.curve {
        return Err(EngineError::invalid_param(format!(
            "key material is on {:?}, protocol needs {:?}",
            key.curve, params.curve
        )));
    }
    if key.party_id != params.party_id {
        return Err(EngineError::invalid_param("key material belongs to another party"));
    }
    if let Some(stranger) = params.party_set.iter().find(|p| !key.parties.contains(p)) {
        return Err(EngineError::invalid_param(format!("party {stranger} holds no share of this key")));
    }
    if params.kind == ProtocolKind::Ed25519ThresholdSign && params.party_set.len() < usize::from(key.threshold) {
        return Err(EngineError::invalid_param("not enough signers for the key's threshold"));
    }
    Ok(())
}

/// A secp256k1 share that `peer` also holds, ready for key preparation.
fn two_party_share(raw: &[u8], peer: PartyId) -> Result<SimKeyShare, EngineError> {
    let share = parse_share(raw)?;
    if share.curve != Curve::Secp256k1 {
        return Err(EngineError::invalid_param(format!("two-party ECDSA needs a secp256k1 key, not {:?}", share.curve)));
    }
    if peer == share.party_id || !share.parties.contains(&peer) {
        return Err(EngineError::invalid_param(format!("party {peer} holds no share of this key")));
    }
    Ok(share)
}

fn read_p2_params(raw: &[u8]) -> Result<String, EngineError> {
    let params: SimP2Params = serde_json::from_slice(raw)
        .map_err(|e| EngineError::invalid_param(format!("unreadable P2 parameters: {e}")))?;
    if params.proof != digest(&[b"pedersen", params.pedersen.as_bytes()]) {
        return Err(EngineError::crypto("P2 parameter proof does not verify"));
    }
    Ok(params.pedersen)
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(value).map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().to_hex().to_string()
}
