//! Binding to the native threshold-crypto library (`libmpc`).
//!
//! Every buffer the library hands out is released through `mpc_string_free`
//! exactly once, by [`EngineString`]'s drop. Engine handles are raw pointers
//! owned by this module and never leave it.

use std::collections::{BTreeMap, HashMap};
use std::ffi::{CStr, c_char, c_int, c_longlong, c_void};
use std::ptr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::EngineError;
use crate::protocol::{ProtocolKind, ProtocolParams, Role};
use crate::round_engine::{EcdsaP1Prepared, EngineHandle, RoundEngine, ffi_party_id};
use crate::types::PartyId;

#[link(name = "mpc")]
unsafe extern "C" {
    fn go_keygen_init(curve: c_longlong, party_id: c_longlong, threshold: c_longlong, total: c_longlong, handle: *mut *mut c_void) -> c_int;
    fn go_keygen_round1(handle: *mut c_void, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_keygen_round2(handle: *mut c_void, input: *const c_char, in_len: c_int, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_keygen_round3(handle: *mut c_void, input: *const c_char, in_len: c_int, key: *mut *mut c_char, key_len: *mut c_int) -> c_int;
    fn go_keygen_destroy(handle: *mut c_void);

    fn go_refresh_init(curve: c_longlong, party_id: c_longlong, threshold: c_longlong, devotes: *const c_int, devote_count: c_int, key: *const c_char, key_len: c_int, handle: *mut *mut c_void) -> c_int;
    fn go_refresh_round1(handle: *mut c_void, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_refresh_round2(handle: *mut c_void, input: *const c_char, in_len: c_int, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_refresh_round3(handle: *mut c_void, input: *const c_char, in_len: c_int, key: *mut *mut c_char, key_len: *mut c_int) -> c_int;
    fn go_refresh_destroy(handle: *mut c_void);

    fn go_ed25519_sign_init(party_id: c_int, threshold: c_int, parts: *const c_int, part_count: c_int, key: *const c_char, key_len: c_int, msg: *const c_char, msg_len: c_int, handle: *mut *mut c_void) -> c_int;
    fn go_ed25519_sign_round1(handle: *mut c_void, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_ed25519_sign_round2(handle: *mut c_void, input: *const c_char, in_len: c_int, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_ed25519_sign_round3(handle: *mut c_void, input: *const c_char, in_len: c_int, sig_r: *mut *mut c_char, sig_s: *mut *mut c_char) -> c_int;
    fn go_ed25519_sign_destroy(handle: *mut c_void);

    fn go_ecdsa_keygen_generate_p2_params(out: *mut *mut c_char, out_len: *mut c_int) -> c_int;
    fn go_ecdsa_keygen_p1(key: *const c_char, key_len: c_int, peer_id: c_int, p2_params: *const c_char, p2_params_len: c_int, out: *mut *mut c_char, out_len: *mut c_int, message: *mut *mut c_char, message_len: *mut c_int) -> c_int;
    fn go_ecdsa_keygen_p2(key: *const c_char, key_len: c_int, p1_id: c_int, p1_message: *const c_char, p1_message_len: c_int, p2_params: *const c_char, p2_params_len: c_int, out: *mut *mut c_char, out_len: *mut c_int) -> c_int;

    fn go_ecdsa_sign_init_p1_complex(party_id: c_int, peer_id: c_int, key: *const c_char, key_len: c_int, msg: *const c_char, msg_len: c_int, handle: *mut *mut c_void) -> c_int;
    fn go_ecdsa_sign_init_p2_complex(party_id: c_int, peer_id: c_int, key: *const c_char, key_len: c_int, msg: *const c_char, msg_len: c_int, handle: *mut *mut c_void) -> c_int;
    fn go_ecdsa_sign_step1(handle: *mut c_void, commit: *mut *mut c_char, commit_len: *mut c_int) -> c_int;
    fn go_ecdsa_sign_p2_step1(handle: *mut c_void, commit: *const c_char, commit_len: c_int, proof: *mut *mut c_char, proof_len: *mut c_int, r2: *mut *mut c_char, r2_len: *mut c_int) -> c_int;
    fn go_ecdsa_sign_p1_step2(handle: *mut c_void, proof: *const c_char, proof_len: c_int, r2: *const c_char, r2_len: c_int, p1_proof: *mut *mut c_char, p1_proof_len: *mut c_int, cmt_d: *mut *mut c_char, cmt_d_len: *mut c_int) -> c_int;
    fn go_ecdsa_sign_p2_step2(handle: *mut c_void, cmt_d: *const c_char, cmt_d_len: c_int, p1_proof: *const c_char, p1_proof_len: c_int, ek: *mut *mut c_char, ek_len: *mut c_int, affine: *mut *mut c_char, affine_len: *mut c_int) -> c_int;
    fn go_ecdsa_sign_p1_step3(handle: *mut c_void, ek: *const c_char, ek_len: c_int, affine: *const c_char, affine_len: c_int, r: *mut *mut c_char, r_len: *mut c_int, s: *mut *mut c_char, s_len: *mut c_int) -> c_int;
    fn go_ecdsa_sign_destroy(handle: *mut c_void);

    fn mpc_string_free(s: *mut c_char);
    fn mpc_get_error_string(code: c_int) -> *mut c_char;
}

/// A buffer allocated by the library. Freed on drop, once.
struct EngineString {
    ptr: *mut c_char,
    /// `None` for NUL-terminated outputs that come without a length.
    len: Option<c_int>,
}

impl EngineString {
    fn empty() -> Self {
        EngineString { ptr: ptr::null_mut(), len: Some(0) }
    }

    fn unsized_empty() -> Self {
        EngineString { ptr: ptr::null_mut(), len: None }
    }

    fn to_vec(&self) -> Result<Vec<u8>, EngineError> {
        if self.ptr.is_null() {
            return Err(EngineError::new(EngineError::MEMORY, "engine returned a null buffer"));
        }
        match self.len {
            Some(len) => {
                let len = usize::try_from(len)
                    .map_err(|_| EngineError::new(EngineError::MEMORY, "engine returned a negative length"))?;
                // SAFETY: the library promises `len` readable bytes at `ptr`.
                Ok(unsafe { std::slice::from_raw_parts(self.ptr as *const u8, len) }.to_vec())
            }
            // SAFETY: unsized outputs are NUL-terminated C strings.
            None => Ok(unsafe { CStr::from_ptr(self.ptr) }.to_bytes().to_vec()),
        }
    }

    fn to_string_lossless(&self) -> Result<String, EngineError> {
        String::from_utf8(self.to_vec()?).map_err(|_| EngineError::crypto("engine output is not UTF-8"))
    }
}

impl Drop for EngineString {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: allocated by the library, freed only here.
            unsafe { mpc_string_free(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// Raw library handle. Only touched under the engine's session lock.
struct RawHandle(*mut c_void);

// SAFETY: the library's handles are session ids, not thread-affine state.
unsafe impl Send for RawHandle {}

struct NativeSession {
    kind: ProtocolKind,
    role: Option<Role>,
    raw: RawHandle,
}

/// [`RoundEngine`] backed by `libmpc`.
#[derive(Default)]
pub struct NativeEngine {
    sessions: Mutex<HashMap<u64, NativeSession>>,
    next_handle: AtomicU64,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn raw(&self, handle: EngineHandle) -> Result<(ProtocolKind, Option<Role>, *mut c_void), EngineError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| EngineError::new(EngineError::MEMORY, "native session lock poisoned"))?;
        let session = sessions
            .get(&handle.0)
            .ok_or_else(|| EngineError::invalid_param(format!("unknown {handle}")))?;
        Ok((session.kind, session.role, session.raw.0))
    }
}

impl RoundEngine for NativeEngine {
    fn init(&self, params: &ProtocolParams) -> Result<EngineHandle, EngineError> {
        let mut raw: *mut c_void = ptr::null_mut();
        let party = ffi_party_id(params.party_id)?;
        let key = params.prior_key_material.as_deref().map(Vec::as_slice).unwrap_or_default();
        let message = params.message.as_deref().unwrap_or_default();
        let ids = params.party_set.iter().copied().map(ffi_party_id).collect::<Result<Vec<c_int>, _>>()?;

        let rc = match params.kind {
            ProtocolKind::DistributedKeyGen => {
                // The library numbers keygen parties 1..=n.
                let contiguous = params.party_set.iter().enumerate().all(|(i, p)| p.0 as usize == i + 1);
                if !contiguous {
                    return Err(EngineError::invalid_param("native keygen needs parties numbered 1..=n"));
                }
                // SAFETY: `raw` outlives the call.
                unsafe {
                    go_keygen_init(
                        params.curve.code().into(),
                        party.into(),
                        params.threshold.into(),
                        ids.len() as c_longlong,
                        &mut raw,
                    )
                }
            }
            // SAFETY: every pointer/length pair below borrows a live slice.
            ProtocolKind::KeyRefresh => unsafe {
                go_refresh_init(
                    params.curve.code().into(),
                    party.into(),
                    params.threshold.into(),
                    ids.as_ptr(),
                    len(&ids)?,
                    key.as_ptr() as *const c_char,
                    len(key)?,
                    &mut raw,
                )
            },
            ProtocolKind::Ed25519ThresholdSign => unsafe {
                go_ed25519_sign_init(
                    party,
                    params.threshold.into(),
                    ids.as_ptr(),
                    len(&ids)?,
                    key.as_ptr() as *const c_char,
                    len(key)?,
                    message.as_ptr() as *const c_char,
                    len(message)?,
                    &mut raw,
                )
            },
            ProtocolKind::EcdsaTwoPartySign => {
                let peer = params.peer().ok_or_else(|| EngineError::invalid_param("two-party signing needs a peer"))?;
                let peer = ffi_party_id(peer)?;
                let init = match params.role {
                    Some(Role::P1) => go_ecdsa_sign_init_p1_complex,
                    Some(Role::P2) => go_ecdsa_sign_init_p2_complex,
                    None => return Err(EngineError::invalid_param("two-party signing needs a role")),
                };
                unsafe {
                    init(
                        party,
                        peer,
                        key.as_ptr() as *const c_char,
                        len(key)?,
                        message.as_ptr() as *const c_char,
                        len(message)?,
                        &mut raw,
                    )
                }
            }
        };
        check(rc)?;

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions
            .lock()
            .map_err(|_| EngineError::new(EngineError::MEMORY, "native session lock poisoned"))?
            .insert(id, NativeSession { kind: params.kind, role: params.role, raw: RawHandle(raw) });
        debug!(handle = id, kind = %params.kind, "native engine init");
        Ok(EngineHandle(id))
    }

    fn advance(&self, handle: EngineHandle, round: u32, inbound: Option<&[u8]>) -> Result<Vec<u8>, EngineError> {
        let (kind, role, raw) = self.raw(handle)?;
        let input = inbound.unwrap_or_default();
        let mut out = EngineString::empty();
        let mut len_out: c_int = 0;

        // SAFETY: `raw` is a live handle from init; out-pointers outlive each call.
        let rc = match (kind, round) {
            (ProtocolKind::DistributedKeyGen, 1) => unsafe { go_keygen_round1(raw, &mut out.ptr, &mut len_out) },
            (ProtocolKind::DistributedKeyGen, 2) => unsafe {
                go_keygen_round2(raw, input.as_ptr() as *const c_char, len(input)?, &mut out.ptr, &mut len_out)
            },
            (ProtocolKind::KeyRefresh, 1) => unsafe { go_refresh_round1(raw, &mut out.ptr, &mut len_out) },
            (ProtocolKind::KeyRefresh, 2) => unsafe {
                go_refresh_round2(raw, input.as_ptr() as *const c_char, len(input)?, &mut out.ptr, &mut len_out)
            },
            (ProtocolKind::Ed25519ThresholdSign, 1) => unsafe { go_ed25519_sign_round1(raw, &mut out.ptr, &mut len_out) },
            (ProtocolKind::Ed25519ThresholdSign, 2) => unsafe {
                go_ed25519_sign_round2(raw, input.as_ptr() as *const c_char, len(input)?, &mut out.ptr, &mut len_out)
            },
            (ProtocolKind::EcdsaTwoPartySign, step) => return ecdsa_step(raw, role, step, input),
            _ => return Err(EngineError::invalid_param(format!("{kind} has no round {round}"))),
        };
        check(rc)?;
        out.len = Some(len_out);
        out.to_vec()
    }

    fn finalize(&self, handle: EngineHandle, inbound: &[u8]) -> Result<Vec<u8>, EngineError> {
        let (kind, role, raw) = self.raw(handle)?;
        let mut key = EngineString::empty();
        let mut key_len: c_int = 0;

        // SAFETY: as in `advance`.
        let rc = match kind {
            ProtocolKind::DistributedKeyGen => unsafe {
                go_keygen_round3(raw, inbound.as_ptr() as *const c_char, len(inbound)?, &mut key.ptr, &mut key_len)
            },
            ProtocolKind::KeyRefresh => unsafe {
                go_refresh_round3(raw, inbound.as_ptr() as *const c_char, len(inbound)?, &mut key.ptr, &mut key_len)
            },
            ProtocolKind::Ed25519ThresholdSign => {
                let mut r = EngineString::unsized_empty();
                let mut s = EngineString::unsized_empty();
                check(unsafe {
                    go_ed25519_sign_round3(raw, inbound.as_ptr() as *const c_char, len(inbound)?, &mut r.ptr, &mut s.ptr)
                })?;
                return bundle(&[("r", &r), ("s", &s)]);
            }
            ProtocolKind::EcdsaTwoPartySign => {
                let total = kind.descriptor().total_rounds;
                return ecdsa_step(raw, role, total, inbound);
            }
        };
        check(rc)?;
        key.len = Some(key_len);
        key.to_vec()
    }

    fn destroy(&self, handle: EngineHandle) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let Some(session) = sessions.remove(&handle.0) else {
            return;
        };
        // SAFETY: removed from the map first, so this handle is released only once.
        unsafe {
            match session.kind {
                ProtocolKind::DistributedKeyGen => go_keygen_destroy(session.raw.0),
                ProtocolKind::KeyRefresh => go_refresh_destroy(session.raw.0),
                ProtocolKind::Ed25519ThresholdSign => go_ed25519_sign_destroy(session.raw.0),
                ProtocolKind::EcdsaTwoPartySign => go_ecdsa_sign_destroy(session.raw.0),
            }
        }
        debug!(handle = handle.0, "native engine destroy");
    }

    fn ecdsa_p2_params(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = EngineString::empty();
        let mut out_len: c_int = 0;
        // SAFETY: out-pointers outlive the call.
        check(unsafe { go_ecdsa_keygen_generate_p2_params(&mut out.ptr, &mut out_len) })?;
        out.len = Some(out_len);
        out.to_vec()
    }

    fn ecdsa_prepare_p1(&self, key: &[u8], peer: PartyId, p2_params: &[u8]) -> Result<EcdsaP1Prepared, EngineError> {
        let mut out = EngineString::empty();
        let mut message = EngineString::empty();
        let (mut out_len, mut message_len): (c_int, c_int) = (0, 0);
        // SAFETY: inputs borrow live slices; out-pointers outlive the call.
        check(unsafe {
            go_ecdsa_keygen_p1(
                key.as_ptr() as *const c_char,
                len(key)?,
                ffi_party_id(peer)?,
                p2_params.as_ptr() as *const c_char,
                len(p2_params)?,
                &mut out.ptr,
                &mut out_len,
                &mut message.ptr,
                &mut message_len,
            )
        })?;
        (out.len, message.len) = (Some(out_len), Some(message_len));
        debug!(%peer, "native ecdsa key prepared for P1");
        Ok(EcdsaP1Prepared {
            material: Zeroizing::new(out.to_vec()?),
            message: message.to_vec()?,
        })
    }

    fn ecdsa_prepare_p2(
        &self,
        key: &[u8],
        p1: PartyId,
        p1_message: &[u8],
        p2_params: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        let mut out = EngineString::empty();
        let mut out_len: c_int = 0;
        // SAFETY: as in `ecdsa_prepare_p1`.
        check(unsafe {
            go_ecdsa_keygen_p2(
                key.as_ptr() as *const c_char,
                len(key)?,
                ffi_party_id(p1)?,
                p1_message.as_ptr() as *const c_char,
                len(p1_message)?,
                p2_params.as_ptr() as *const c_char,
                len(p2_params)?,
                &mut out.ptr,
                &mut out_len,
            )
        })?;
        out.len = Some(out_len);
        debug!(%p1, "native ecdsa key prepared for P2");
        Ok(Zeroizing::new(out.to_vec()?))
    }
}

/// One step of the two-party exchange. Steps with two outputs travel as a
/// JSON object of named strings and are unpacked again on the other side.
fn ecdsa_step(raw: *mut c_void, role: Option<Role>, step: u32, input: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut a = EngineString::empty();
    let mut b = EngineString::empty();
    let (mut a_len, mut b_len): (c_int, c_int) = (0, 0);

    // SAFETY: `raw` is a live ecdsa handle; inputs borrow owned strings for the call.
    match (role, step) {
        (Some(Role::P1), 1) => {
            check(unsafe { go_ecdsa_sign_step1(raw, &mut a.ptr, &mut a_len) })?;
            a.len = Some(a_len);
            a.to_vec()
        }
        (Some(Role::P2), 2) => {
            check(unsafe {
                go_ecdsa_sign_p2_step1(raw, input.as_ptr() as *const c_char, len(input)?, &mut a.ptr, &mut a_len, &mut b.ptr, &mut b_len)
            })?;
            (a.len, b.len) = (Some(a_len), Some(b_len));
            bundle(&[("proof", &a), ("r2", &b)])
        }
        (Some(Role::P1), 3) => {
            let fields = unbundle(input)?;
            let (proof, r2) = (field(&fields, "proof")?, field(&fields, "r2")?);
            check(unsafe {
                go_ecdsa_sign_p1_step2(
                    raw,
                    proof.as_ptr() as *const c_char,
                    len(proof.as_bytes())?,
                    r2.as_ptr() as *const c_char,
                    len(r2.as_bytes())?,
                    &mut a.ptr,
                    &mut a_len,
                    &mut b.ptr,
                    &mut b_len,
                )
            })?;
            (a.len, b.len) = (Some(a_len), Some(b_len));
            bundle(&[("p1_proof", &a), ("cmt_d", &b)])
        }
        (Some(Role::P2), 4) => {
            let fields = unbundle(input)?;
            let (cmt_d, p1_proof) = (field(&fields, "cmt_d")?, field(&fields, "p1_proof")?);
            check(unsafe {
                go_ecdsa_sign_p2_step2(
                    raw,
                    cmt_d.as_ptr() as *const c_char,
                    len(cmt_d.as_bytes())?,
                    p1_proof.as_ptr() as *const c_char,
                    len(p1_proof.as_bytes())?,
                    &mut a.ptr,
                    &mut a_len,
                    &mut b.ptr,
                    &mut b_len,
                )
            })?;
            (a.len, b.len) = (Some(a_len), Some(b_len));
            bundle(&[("ek", &a), ("affine_proof", &b)])
        }
        (Some(Role::P1), 5) => {
            let fields = unbundle(input)?;
            let (ek, affine) = (field(&fields, "ek")?, field(&fields, "affine_proof")?);
            check(unsafe {
                go_ecdsa_sign_p1_step3(
                    raw,
                    ek.as_ptr() as *const c_char,
                    len(ek.as_bytes())?,
                    affine.as_ptr() as *const c_char,
                    len(affine.as_bytes())?,
                    &mut a.ptr,
                    &mut a_len,
                    &mut b.ptr,
                    &mut b_len,
                )
            })?;
            (a.len, b.len) = (Some(a_len), Some(b_len));
            bundle(&[("r", &a), ("s", &b)])
        }
        _ => Err(EngineError::invalid_param(format!("role {role:?} does not run step {step}"))),
    }
}

fn bundle(parts: &[(&str, &EngineString)]) -> Result<Vec<u8>, EngineError> {
    let mut map = BTreeMap::new();
    for (name, value) in parts {
        map.insert(*name, value.to_string_lossless()?);
    }
    serde_json::to_vec(&map).map_err(|e| EngineError::new(EngineError::MEMORY, e.to_string()))
}

fn unbundle(input: &[u8]) -> Result<HashMap<String, String>, EngineError> {
    serde_json::from_slice(input).map_err(|e| EngineError::crypto(format!("malformed step payload: {e}")))
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, EngineError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| EngineError::crypto(format!("step payload has no {name}")))
}

fn len<T>(slice: &[T]) -> Result<c_int, EngineError> {
    c_int::try_from(slice.len()).map_err(|_| EngineError::invalid_param("buffer too large for the engine"))
}

/// Turn a library status code into an error, with the library's own wording.
fn check(rc: c_int) -> Result<(), EngineError> {
    if rc == 0 {
        return Ok(());
    }
    // SAFETY: returns a fresh allocation that `EngineString` frees.
    let text = EngineString { ptr: unsafe { mpc_get_error_string(rc) }, len: None };
    let message = text.to_string_lossless().unwrap_or_else(|_| "unknown error".to_string());
    warn!(code = rc, %message, "native engine call failed");
    Err(EngineError::new(rc, message))
}
