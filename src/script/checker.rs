use std::sync::OnceLock;

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1, VerifyOnly};
use bitcoin::sighash::SighashCache;
use bitcoin::{Amount, Script, Sequence, Transaction};

use super::SigVersion;
use super::{
    LOCKTIME_THRESHOLD, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK,
    SEQUENCE_LOCKTIME_TYPE_FLAG,
};
use crate::tx::{bip143_signature_hash, Bip143Hashes};

static SECP256K1: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();

fn with_secp256k1_verification_ctx<R>(f: impl FnOnce(&Secp256k1<VerifyOnly>) -> R) -> R {
    f(SECP256K1.get_or_init(Secp256k1::verification_only))
}

/// Transaction-dependent checks the interpreter delegates.
///
/// Every method defaults to failing, so a checker only implements what its
/// context can answer.
pub trait SignatureChecker {
    /// Verifies `sig` (DER plus hash-type byte) by `pubkey` over `script_code`.
    fn check_ecdsa_signature(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &Script,
        _sig_version: SigVersion,
    ) -> bool {
        false
    }

    /// Absolute lock-time check behind OP_CHECKLOCKTIMEVERIFY.
    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }

    /// Relative lock-time check behind OP_CHECKSEQUENCEVERIFY.
    fn check_sequence(&self, _sequence: i64) -> bool {
        false
    }
}

/// Checker with no transaction; every check fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSignatureChecker;

impl SignatureChecker for NullSignatureChecker {}

/// Checks signatures and lock-times against one input of a transaction.
#[derive(Debug)]
pub struct TransactionSignatureChecker<'tx> {
    tx: &'tx Transaction,
    input_index: usize,
    amount: Amount,
    sighash_cache: SighashCache<&'tx Transaction>,
    bip143: OnceLock<Bip143Hashes>,
}

impl<'tx> TransactionSignatureChecker<'tx> {
    pub fn new(tx: &'tx Transaction, input_index: usize, amount: Amount) -> Self {
        Self {
            tx,
            input_index,
            amount,
            sighash_cache: SighashCache::new(tx),
            bip143: OnceLock::new(),
        }
    }

    pub fn tx(&self) -> &'tx Transaction {
        self.tx
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    fn signature_hash(
        &self,
        script_code: &Script,
        hash_type: u32,
        sig_version: SigVersion,
    ) -> Option<Message> {
        let digest = match sig_version {
            SigVersion::Base => self
                .sighash_cache
                .legacy_signature_hash(self.input_index, script_code, hash_type)
                .ok()?
                .to_byte_array(),
            SigVersion::WitnessV0 => {
                let hashes = self.bip143.get_or_init(|| Bip143Hashes::new(self.tx));
                bip143_signature_hash(
                    self.tx,
                    hashes,
                    self.input_index,
                    script_code,
                    self.amount,
                    hash_type,
                )
                .ok()?
                .to_byte_array()
            }
        };
        Some(Message::from_digest(digest))
    }

    fn input_sequence(&self) -> Option<Sequence> {
        self.tx.input.get(self.input_index).map(|input| input.sequence)
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_ecdsa_signature(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &Script,
        sig_version: SigVersion,
    ) -> bool {
        let Some((&hash_type, der)) = sig.split_last() else {
            return false;
        };
        let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
            return false;
        };
        let Ok(mut signature) = ecdsa::Signature::from_der_lax(der) else {
            return false;
        };
        signature.normalize_s();
        let Some(message) = self.signature_hash(script_code, u32::from(hash_type), sig_version)
        else {
            return false;
        };
        with_secp256k1_verification_ctx(|secp| {
            secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
        })
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx_lock_time = i64::from(self.tx.lock_time.to_consensus_u32());
        if (tx_lock_time < LOCKTIME_THRESHOLD) != (lock_time < LOCKTIME_THRESHOLD) {
            return false;
        }
        if lock_time > tx_lock_time {
            return false;
        }
        // A final input would let the transaction skip its lock-time.
        matches!(self.input_sequence(), Some(sequence) if sequence != Sequence::MAX)
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        let Some(tx_sequence) = self.input_sequence() else {
            return false;
        };
        let tx_sequence = i64::from(tx_sequence.to_consensus_u32());
        // BIP68 reads the version as unsigned.
        if (self.tx.version.0 as u32) < 2 {
            return false;
        }
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }
        let mask = SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK;
        let tx_masked = tx_sequence & mask;
        let masked = sequence & mask;
        let same_type =
            (tx_masked < SEQUENCE_LOCKTIME_TYPE_FLAG) == (masked < SEQUENCE_LOCKTIME_TYPE_FLAG);
        same_type && masked <= tx_masked
    }
}
