//! End-to-end coinstake validation against in-memory chain and UTXO views.

use blackd_chainstate::coins::{Coin, MemoryUtxoView};
use blackd_chainstate::index::{BlockIndexEntry, ChainView, MemoryChainView};
use blackd_chainstate::validation::BlockValidationResult;
use blackd_consensus::params::{consensus_params, Network};
use blackd_pos::check_proof_of_stake;
use blackd_primitives::hash::hash160;
use blackd_primitives::outpoint::OutPoint;
use blackd_primitives::transaction::{Transaction, TxIn, TxOut};
use blackd_script::sighash::{legacy_signature_hash, SIGHASH_ALL};
use blackd_script::p2pkh_script;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

const EASY_BITS: u32 = 0x1f00ffff;

fn entry(height: i32) -> BlockIndexEntry {
    BlockIndexEntry {
        hash: [height as u8; 32],
        prev_hash: [(height - 1).max(0) as u8; 32],
        height,
        time: 1_700_000_000 + height as u32 * 16,
        bits: EASY_BITS,
        stake_modifier: [0x05; 32],
        median_time_past: 1_700_000_000,
    }
}

fn chain_to(height: i32) -> MemoryChainView {
    MemoryChainView::new((0..=height).map(entry).collect(), EASY_BITS, EASY_BITS)
}

fn secret_key(last_byte: u8) -> SecretKey {
    let mut bytes = [0u8; 32];
    bytes[31] = last_byte;
    SecretKey::from_slice(&bytes).expect("secret key")
}

fn push(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(data.len() as u8);
    out.extend_from_slice(data);
    out
}

fn signed_coinstake(prevout: &OutPoint, script_pubkey: &[u8], secret: &SecretKey) -> Transaction {
    let mut tx = Transaction::new();
    tx.time = 1_700_001_600;
    tx.vin.push(TxIn::new(prevout.clone()));
    tx.vout.push(TxOut::empty());
    tx.vout.push(TxOut {
        value: 1_000_000_100,
        script_pubkey: script_pubkey.to_vec(),
    });

    let secp = Secp256k1::signing_only();
    let pubkey = PublicKey::from_secret_key(&secp, secret).serialize();
    let digest = legacy_signature_hash(&tx, 0, script_pubkey, SIGHASH_ALL).expect("sighash");
    let message = Message::from_digest_slice(&digest).expect("message");
    let mut sig = secp.sign_ecdsa(&message, secret).serialize_der().to_vec();
    sig.push(SIGHASH_ALL as u8);

    let mut script_sig = push(&sig);
    script_sig.extend_from_slice(&push(&pubkey));
    tx.vin[0].script_sig = script_sig;
    tx
}

#[test]
fn valid_coinstake_is_accepted() {
    let params = consensus_params(Network::Regtest);
    let chain = chain_to(50);
    let prev = chain.tip().expect("tip");

    let secret = secret_key(9);
    let secp = Secp256k1::signing_only();
    let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize();
    let script_pubkey = p2pkh_script(&hash160(&pubkey));

    let prevout = OutPoint::new([0x77; 32], 0);
    let view = MemoryUtxoView::new();
    view.add(
        prevout.clone(),
        Coin {
            value: 1_000_000_000,
            script_pubkey: script_pubkey.clone(),
            height: 2,
            is_coinbase: false,
            is_coinstake: true,
            time: 1_700_000_000,
        },
    );

    let tx = signed_coinstake(&prevout, &script_pubkey, &secret);
    check_proof_of_stake(&prev, &tx, EASY_BITS, &chain, &view, &params, tx.time)
        .expect("coinstake valid");
}

#[test]
fn kernel_failure_is_soft() {
    let params = consensus_params(Network::Regtest);
    let chain = chain_to(50);
    let prev = chain.tip().expect("tip");

    let secret = secret_key(10);
    let secp = Secp256k1::signing_only();
    let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize();
    let script_pubkey = p2pkh_script(&hash160(&pubkey));

    let prevout = OutPoint::new([0x78; 32], 0);
    let view = MemoryUtxoView::new();
    view.add(
        prevout.clone(),
        Coin {
            value: 1,
            script_pubkey: script_pubkey.clone(),
            height: 2,
            is_coinbase: false,
            is_coinstake: true,
            time: 1_700_000_000,
        },
    );

    let tx = signed_coinstake(&prevout, &script_pubkey, &secret);
    // Near-impossible target: the kernel check fails, which during sync is a
    // deferral, not a ban.
    let err = check_proof_of_stake(&prev, &tx, 0x03000001, &chain, &view, &params, tx.time)
        .expect_err("kernel fails");
    assert_eq!(err.reject_reason, "stake-check-kernel-failed");
    assert_eq!(err.result, BlockValidationResult::HeaderSync);
    assert!(err.is_transient());
}

#[test]
fn missing_origin_block_is_reported() {
    let params = consensus_params(Network::Regtest);
    // A chain whose history below height 30 is unavailable.
    let entries: Vec<BlockIndexEntry> = (30..=50).map(entry).collect();
    let chain = MemoryChainView::new(entries, EASY_BITS, EASY_BITS);
    let prev = chain.tip().expect("tip");

    let secret = secret_key(11);
    let secp = Secp256k1::signing_only();
    let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize();
    let script_pubkey = p2pkh_script(&hash160(&pubkey));

    let prevout = OutPoint::new([0x79; 32], 0);
    let view = MemoryUtxoView::new();
    view.add(
        prevout.clone(),
        Coin {
            value: 1_000_000_000,
            script_pubkey: script_pubkey.clone(),
            height: 2,
            is_coinbase: false,
            is_coinstake: true,
            time: 1_700_000_000,
        },
    );

    let tx = signed_coinstake(&prevout, &script_pubkey, &secret);
    let err = check_proof_of_stake(&prev, &tx, EASY_BITS, &chain, &view, &params, tx.time)
        .expect_err("origin block missing");
    assert_eq!(err.reject_reason, "stake-prevout-not-loaded");
}
