//! Transaction parsing and the per-transaction data signature hashing needs.

use bitcoin::{
    consensus,
    hashes::{sha256, sha256d, Hash, HashEngine},
    Amount, Script, Transaction,
};

use crate::Error;

const SIGHASH_ANYONECANPAY: u32 = 0x80;
const SIGHASH_OUTPUT_MASK: u32 = 0x1f;
const SIGHASH_NONE: u32 = 0x02;
const SIGHASH_SINGLE: u32 = 0x03;

/// Holds the parsed transaction being verified.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    tx: Transaction,
}

impl TransactionContext {
    /// Parses a transaction from wire bytes, rejecting trailing data.
    pub fn parse(tx_bytes: &[u8]) -> Result<Self, Error> {
        let (tx, consumed): (Transaction, usize) =
            consensus::deserialize_partial(tx_bytes).map_err(|_| Error::ERR_TX_DESERIALIZE)?;
        if consumed != tx_bytes.len() {
            return Err(Error::ERR_TX_SIZE_MISMATCH);
        }
        Ok(Self { tx })
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    /// Ensures `input_index` points to an existing transaction input.
    pub fn ensure_input_index(&self, input_index: usize) -> Result<(), Error> {
        if input_index >= self.tx.input.len() {
            Err(Error::ERR_TX_INDEX)
        } else {
            Ok(())
        }
    }
}

/// The three transaction-wide BIP143 digests, mirroring the segwit half of
/// Core's `PrecomputedTransactionData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bip143Hashes {
    pub hash_prevouts: sha256d::Hash,
    pub hash_sequence: sha256d::Hash,
    pub hash_outputs: sha256d::Hash,
}

impl Bip143Hashes {
    pub fn new(tx: &Transaction) -> Self {
        Self {
            hash_prevouts: double_sha(hash_serialized(
                tx.input.iter().map(|input| &input.previous_output),
            )),
            hash_sequence: double_sha(hash_serialized(
                tx.input.iter().map(|input| &input.sequence),
            )),
            hash_outputs: double_sha(hash_serialized(tx.output.iter())),
        }
    }
}

/// BIP143 signature hash for input `input_index`.
///
/// `hash_type` is committed exactly as given, so undefined types hash the same
/// way Core hashes them.
pub fn bip143_signature_hash(
    tx: &Transaction,
    hashes: &Bip143Hashes,
    input_index: usize,
    script_code: &Script,
    amount: Amount,
    hash_type: u32,
) -> Result<sha256d::Hash, Error> {
    let input = tx.input.get(input_index).ok_or(Error::ERR_TX_INDEX)?;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let base_type = hash_type & SIGHASH_OUTPUT_MASK;
    let zero = sha256d::Hash::all_zeros();

    let hash_prevouts = if anyone_can_pay { zero } else { hashes.hash_prevouts };
    let hash_sequence = if anyone_can_pay
        || base_type == SIGHASH_SINGLE
        || base_type == SIGHASH_NONE
    {
        zero
    } else {
        hashes.hash_sequence
    };
    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        hashes.hash_outputs
    } else if base_type == SIGHASH_SINGLE {
        match tx.output.get(input_index) {
            Some(output) => sha256d::Hash::hash(&consensus::serialize(output)),
            None => zero,
        }
    } else {
        zero
    };

    let mut engine = sha256d::Hash::engine();
    engine.input(&consensus::serialize(&tx.version));
    engine.input(hash_prevouts.as_byte_array());
    engine.input(hash_sequence.as_byte_array());
    engine.input(&consensus::serialize(&input.previous_output));
    engine.input(&consensus::serialize(&script_code.to_owned()));
    engine.input(&amount.to_sat().to_le_bytes());
    engine.input(&consensus::serialize(&input.sequence));
    engine.input(hash_outputs.as_byte_array());
    engine.input(&consensus::serialize(&tx.lock_time));
    engine.input(&hash_type.to_le_bytes());
    Ok(sha256d::Hash::from_engine(engine))
}

fn double_sha(hash: sha256::Hash) -> sha256d::Hash {
    sha256d::Hash::hash(&hash.to_byte_array())
}

fn hash_serialized<'a, I, T>(items: I) -> sha256::Hash
where
    I: IntoIterator<Item = &'a T>,
    T: consensus::Encodable + 'a,
{
    let mut engine = sha256::Hash::engine();
    for item in items {
        engine.input(&consensus::serialize(item));
    }
    sha256::Hash::from_engine(engine)
}
