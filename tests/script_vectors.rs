
use bitcoin::{
    absolute::LockTime, blockdata::script::Builder, consensus as btc_consensus, hex::FromHex,
    transaction::Version, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use script_asm::parse_script;
use script_consensus::{verify_with_flags_detailed, ScriptError, ScriptFailure, ScriptFlags};
use serde_json::Value;

const SCRIPT_TEST_VECTORS: &str = include_str!("data/script_tests.json");

#[test]
fn bitcoin_core_script_vectors() {
    let tests: Vec<Value> =
        serde_json::from_str(SCRIPT_TEST_VECTORS).expect("script_tests.json deserializes");

    let mut checked = 0usize;
    for (index, test) in tests.iter().enumerate() {
        let Some(arr) = test.as_array() else { continue };
        // Single-string rows are comments.
        if arr.len() == 1 {
            continue;
        }

        let mut position = 0;
        let mut witness = Witness::new();
        let mut amount = 0;
        if let Some(Value::Array(entry)) = arr.first() {
            (witness, amount) = parse_witness_and_amount(entry)
                .unwrap_or_else(|err| panic!("malformed witness entry #{index}: {err}"));
            position += 1;
        }

        let field = |offset: usize| {
            arr[position + offset]
                .as_str()
                .unwrap_or_else(|| panic!("entry #{index}: field {offset} is not a string"))
        };
        let script_sig_str = field(0);
        let script_pubkey_str = field(1);
        let flags_str = field(2);
        let expected_str = field(3);

        let script_sig = parse_script(script_sig_str)
            .unwrap_or_else(|err| {
                panic!("entry #{index}: bad scriptSig `{script_sig_str}`: {err}")
            });
        let script_pubkey = parse_script(script_pubkey_str)
            .unwrap_or_else(|err| {
                panic!("entry #{index}: bad scriptPubKey `{script_pubkey_str}`: {err}")
            });
        let flags: ScriptFlags = flags_str
            .parse()
            .unwrap_or_else(|err| panic!("entry #{index}: {err}"));
        let expected = parse_expected_error(expected_str)
            .unwrap_or_else(|| panic!("entry #{index}: unknown expected error `{expected_str}`"));

        let result = run_vector_case(script_sig, script_pubkey, witness, amount, flags);
        match (expected, result) {
            (None, Ok(())) => {}
            (None, Err(failure)) => panic!(
                "vector #{index} expected OK but failed with {:?}: `{script_sig_str}` `{script_pubkey_str}` flags={flags_str}",
                failure.script_error
            ),
            (Some(err), Ok(())) => panic!(
                "vector #{index} expected {err:?} but succeeded: `{script_sig_str}` `{script_pubkey_str}` flags={flags_str}"
            ),
            (Some(err), Err(failure)) => assert_eq!(
                failure.script_error, err,
                "vector #{index} mismatch: `{script_sig_str}` `{script_pubkey_str}` flags={flags_str}"
            ),
        }
        checked += 1;
    }

    assert!(checked > 250, "only {checked} vectors were evaluated");
}

/// Spends the single output of a crediting transaction whose scriptSig is
/// `0 0`, the way Core's script tests lay out their transactions.
fn run_vector_case(
    script_sig: ScriptBuf,
    script_pubkey: ScriptBuf,
    witness: Witness,
    amount: u64,
    flags: ScriptFlags,
) -> Result<(), ScriptFailure> {
    let credit_tx = Transaction {
        version: Version(1),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: Builder::new().push_int(0).push_int(0).into_script(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: script_pubkey.clone(),
        }],
    };
    let tx = Transaction {
        version: Version(1),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: credit_tx.compute_txid(),
                vout: 0,
            },
            script_sig,
            sequence: Sequence::MAX,
            witness,
        }],
        output: vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: ScriptBuf::new(),
        }],
    };

    let tx_bytes = btc_consensus::serialize(&tx);
    verify_with_flags_detailed(script_pubkey.as_bytes(), amount, &tx_bytes, 0, flags.bits())
}

/// `[hex..., amount]` where the amount is in BTC.
fn parse_witness_and_amount(entry: &[Value]) -> Result<(Witness, u64), String> {
    let (amount, items) = entry
        .split_last()
        .ok_or_else(|| "witness entry missing amount".to_string())?;
    let mut stack = Vec::with_capacity(items.len());
    for item in items {
        let hex = item
            .as_str()
            .ok_or_else(|| "witness stack entries must be strings".to_string())?;
        stack.push(Vec::from_hex(hex).map_err(|err| format!("invalid witness hex: {err}"))?);
    }
    let btc = amount
        .as_f64()
        .ok_or_else(|| "amount must be a number".to_string())?;
    Ok((Witness::from_slice(&stack), (btc * 100_000_000.0).round() as u64))
}

fn parse_expected_error(raw: &str) -> Option<Option<ScriptError>> {
    use ScriptError::*;
    let err = match raw {
        "OK" => return Some(None),
        "UNKNOWN_ERROR" => Unknown,
        "EVAL_FALSE" => EvalFalse,
        "OP_RETURN" => OpReturn,
        "SCRIPT_SIZE" => ScriptSize,
        "PUSH_SIZE" => PushSize,
        "OP_COUNT" => OpCount,
        "STACK_SIZE" => StackSize,
        "SIG_COUNT" => SigCount,
        "PUBKEY_COUNT" => PubkeyCount,
        "VERIFY" => Verify,
        "EQUALVERIFY" => EqualVerify,
        "CHECKSIGVERIFY" => CheckSigVerify,
        "CHECKMULTISIGVERIFY" => CheckMultiSigVerify,
        "NUMEQUALVERIFY" => NumEqualVerify,
        "DISCOURAGE_UPGRADABLE_NOPS" => DiscourageUpgradableNops,
        "DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM" => DiscourageUpgradableWitnessProgram,
        "DISABLED_OPCODE" => DisabledOpcode,
        "BAD_OPCODE" => BadOpcode,
        "INVALID_STACK_OPERATION" => InvalidStackOperation,
        "INVALID_ALTSTACK_OPERATION" => InvalidAltstackOperation,
        "UNBALANCED_CONDITIONAL" => UnbalancedConditional,
        "NEGATIVE_LOCKTIME" => NegativeLockTime,
        "UNSATISFIED_LOCKTIME" => UnsatisfiedLockTime,
        "SIG_HASHTYPE" => SigHashType,
        "SIG_DER" => SigDer,
        "MINIMALDATA" => MinimalData,
        "SIG_PUSHONLY" => SigPushOnly,
        "SIG_HIGH_S" => SigHighS,
        "SIG_NULLDUMMY" => SigNullDummy,
        "PUBKEYTYPE" => PubkeyType,
        "CLEANSTACK" => CleanStack,
        "MINIMALIF" => MinimalIf,
        "NULLFAIL" => NullFail,
        "WITNESS_PROGRAM_WRONG_LENGTH" => WitnessProgramWrongLength,
        "WITNESS_PROGRAM_WITNESS_EMPTY" => WitnessProgramWitnessEmpty,
        "WITNESS_PROGRAM_MISMATCH" => WitnessProgramMismatch,
        "WITNESS_MALLEATED" => WitnessMalleated,
        "WITNESS_MALLEATED_P2SH" => WitnessMalleatedP2SH,
        "WITNESS_UNEXPECTED" => WitnessUnexpected,
        "WITNESS_PUBKEYTYPE" => WitnessPubkeyType,
        "OP_CODESEPARATOR" => OpCodeSeparator,
        "SIG_FINDANDDELETE" => SigFindAndDelete,
        _ => return None,
    };
    Some(Some(err))
}
