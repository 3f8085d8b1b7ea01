//! Script support for kernel verification: legacy sighash, P2PK/P2PKH
//! signature checks, and sigop counting.
//!
//! The full interpreter lives outside this subsystem; stake kernels only ever
//! spend the simple pay-to-pubkey shapes, so anything else fails verification.

pub mod sighash;

use std::sync::OnceLock;

use blackd_primitives::hash::hash160;
use blackd_primitives::transaction::Transaction;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};

use crate::sighash::{legacy_signature_hash, SIGHASH_ALL};

static SECP256K1_VERIFY: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();

fn secp256k1_verify() -> &'static Secp256k1<VerifyOnly> {
    SECP256K1_VERIFY.get_or_init(Secp256k1::verification_only)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    UnsupportedScript,
    UnsupportedSighashType,
    MalformedScriptSig,
    MalformedSignature,
    MalformedPubkey,
    PubkeyMismatch,
    BadSignature,
    MissingInput,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::UnsupportedScript => write!(f, "unsupported script form"),
            ScriptError::UnsupportedSighashType => write!(f, "unsupported sighash type"),
            ScriptError::MalformedScriptSig => write!(f, "scriptSig is not push-only"),
            ScriptError::MalformedSignature => write!(f, "signature is not valid DER"),
            ScriptError::MalformedPubkey => write!(f, "pubkey does not parse"),
            ScriptError::PubkeyMismatch => write!(f, "pubkey does not match script hash"),
            ScriptError::BadSignature => write!(f, "signature verification failed"),
            ScriptError::MissingInput => write!(f, "input index out of range"),
        }
    }
}

impl std::error::Error for ScriptError {}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_1NEGATE: u8 = 0x4f;

enum ScriptShape<'a> {
    P2Pk(&'a [u8]),
    P2Pkh(&'a [u8]),
}

fn classify(script_pubkey: &[u8]) -> Option<ScriptShape<'_>> {
    match script_pubkey {
        // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            Some(ScriptShape::P2Pkh(hash))
        }
        // <33|65 byte pubkey> OP_CHECKSIG
        [0x21, key @ .., OP_CHECKSIG] if key.len() == 33 => Some(ScriptShape::P2Pk(key)),
        [0x41, key @ .., OP_CHECKSIG] if key.len() == 65 => Some(ScriptShape::P2Pk(key)),
        _ => None,
    }
}

/// Verify the signature on `tx.vin[input_index]` against the spent output's
/// `script_pubkey`. Only SIGHASH_ALL over P2PK/P2PKH is accepted.
pub fn verify_input_signature(
    script_pubkey: &[u8],
    tx: &Transaction,
    input_index: usize,
) -> Result<(), ScriptError> {
    let input = tx.vin.get(input_index).ok_or(ScriptError::MissingInput)?;
    let shape = classify(script_pubkey).ok_or(ScriptError::UnsupportedScript)?;
    let stack = parse_push_only(&input.script_sig).ok_or(ScriptError::MalformedScriptSig)?;

    let (sig_bytes, pubkey_bytes): (&[u8], &[u8]) = match (&shape, stack.as_slice()) {
        (ScriptShape::P2Pk(key), [sig]) => (sig.as_slice(), key),
        (ScriptShape::P2Pkh(hash), [sig, pubkey]) => {
            if hash160(pubkey).as_slice() != *hash {
                return Err(ScriptError::PubkeyMismatch);
            }
            (sig.as_slice(), pubkey.as_slice())
        }
        _ => return Err(ScriptError::MalformedScriptSig),
    };

    let (der, hash_type) = sig_bytes
        .split_last()
        .map(|(last, rest)| (rest, *last))
        .ok_or(ScriptError::MalformedSignature)?;
    if u32::from(hash_type) != SIGHASH_ALL {
        return Err(ScriptError::UnsupportedSighashType);
    }

    let mut signature = Signature::from_der(der).map_err(|_| ScriptError::MalformedSignature)?;
    // Historic chains carry high-S signatures; accept them.
    signature.normalize_s();
    let pubkey = PublicKey::from_slice(pubkey_bytes).map_err(|_| ScriptError::MalformedPubkey)?;

    let digest = legacy_signature_hash(tx, input_index, script_pubkey, SIGHASH_ALL)
        .ok_or(ScriptError::MissingInput)?;
    let message = Message::from_digest_slice(&digest).map_err(|_| ScriptError::BadSignature)?;

    secp256k1_verify()
        .verify_ecdsa(&message, &signature, &pubkey)
        .map_err(|_| ScriptError::BadSignature)
}

fn parse_push_only(script: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut cursor = 0usize;
    let mut stack = Vec::new();
    while cursor < script.len() {
        let opcode = *script.get(cursor)?;
        cursor += 1;
        match opcode {
            0x01..=0x4b => {
                let len = opcode as usize;
                if cursor + len > script.len() {
                    return None;
                }
                stack.push(script[cursor..cursor + len].to_vec());
                cursor += len;
            }
            OP_PUSHDATA1 => {
                let len = *script.get(cursor)? as usize;
                cursor += 1;
                if cursor + len > script.len() {
                    return None;
                }
                stack.push(script[cursor..cursor + len].to_vec());
                cursor += len;
            }
            OP_0 => stack.push(Vec::new()),
            OP_1NEGATE => stack.push(vec![0x81]),
            OP_1..=OP_16 => stack.push(vec![opcode - OP_1 + 1]),
            _ => return None,
        }
    }
    Some(stack)
}

/// Count legacy (pre-witness) sigops in a script. `accurate` decodes the
/// multisig key count from the preceding OP_N, the historic rule otherwise
/// charges the 20-key maximum.
pub fn legacy_sigop_count(script: &[u8], accurate: bool) -> u32 {
    let mut cursor = 0usize;
    let mut last_opcode = 0u8;
    let mut count = 0u32;
    while cursor < script.len() {
        let opcode = script[cursor];
        cursor += 1;
        match opcode {
            0x01..=0x4b => cursor = cursor.saturating_add(opcode as usize),
            OP_PUSHDATA1 => {
                let len = script.get(cursor).copied().unwrap_or(0) as usize;
                cursor = cursor.saturating_add(1 + len);
            }
            OP_PUSHDATA2 => {
                let lo = script.get(cursor).copied().unwrap_or(0) as usize;
                let hi = script.get(cursor + 1).copied().unwrap_or(0) as usize;
                cursor = cursor.saturating_add(2 + ((hi << 8) | lo));
            }
            OP_PUSHDATA4 => {
                let mut len = 0usize;
                for offset in 0..4 {
                    len |= (script.get(cursor + offset).copied().unwrap_or(0) as usize)
                        << (8 * offset);
                }
                cursor = cursor.saturating_add(4 + len);
            }
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count = count.saturating_add(1),
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let add = if accurate && (OP_1..=OP_16).contains(&last_opcode) {
                    (last_opcode - OP_1 + 1) as u32
                } else {
                    20
                };
                count = count.saturating_add(add);
            }
            _ => {}
        }
        last_opcode = opcode;
    }
    count
}

/// Build the canonical P2PKH script for a pubkey hash.
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build a P2PK script for a serialized pubkey.
pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    script.push(pubkey.len() as u8);
    script.extend_from_slice(pubkey);
    script.push(OP_CHECKSIG);
    script
}
