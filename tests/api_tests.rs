//! Tests for the public PegEngine API

use peg_settlement::*;
use peg_settlement::script::{build_redemption_script, p2pkh_script, parse_script, Instruction};
use peg_settlement::transaction::{deserialize_transaction, txid_hex};

fn coinbase_paying(signer: &Signer, value: Integer) -> UnspentOutput {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout: OutPoint { hash: [0; 32], index: 0xffffffff },
            script_sig: vec![0x01, 0x01],
            sequence: 0xffffffff,
        }],
        outputs: vec![TransactionOutput {
            value,
            script_pubkey: p2pkh_script(&signer.pubkey_hash()),
        }],
        lock_time: 0,
    };
    UnspentOutput::from_transaction(&coinbase, 0).unwrap()
}

#[test]
fn test_engine_new() {
    let engine = PegEngine::new(Network::Regtest);
    assert_eq!(engine.network(), Network::Regtest);
}

#[test]
fn test_redemption_script_layout() {
    let engine = PegEngine::new(Network::Regtest);
    let payload = [0xaa; 20];
    let key_hash = [0xbb; 20];
    let script = engine.build_redemption_script(&payload, &key_hash).unwrap();

    let mut expected = vec![0x14];
    expected.extend_from_slice(&payload);
    expected.extend_from_slice(&[0x75, 0x76, 0xa9, 0x14]);
    expected.extend_from_slice(&key_hash);
    expected.extend_from_slice(&[0x88, 0xac]);
    assert_eq!(script.as_bytes(), expected.as_slice());
    assert_eq!(script.payload(), &payload);
    assert_eq!(script.recipient_key_hash(), &key_hash);
}

#[test]
fn test_redemption_script_is_deterministic() {
    let engine = PegEngine::new(Network::Testnet);
    let a = engine.build_redemption_script(b"peg", &[3; 20]).unwrap();
    let b = engine.build_redemption_script(b"peg", &[3; 20]).unwrap();
    assert_eq!(a, b);
    assert_eq!(engine.script_address(&a), engine.script_address(&b));
}

#[test]
fn test_script_address_prefix_per_network() {
    let script = build_redemption_script(&[0; 20], &[1; 20]).unwrap();
    assert!(PegEngine::new(Network::Mainnet).script_address(&script).starts_with('3'));
    assert!(PegEngine::new(Network::Testnet).script_address(&script).starts_with('2'));
    assert!(PegEngine::new(Network::Regtest).script_address(&script).starts_with('2'));
}

#[test]
fn test_funding_and_claim_round_trip() {
    let engine = PegEngine::new(Network::Regtest);
    let payer = Signer::from_secret_bytes(&[0x11; 32]).unwrap();
    let recipient = Signer::from_secret_bytes(&[0x12; 32]).unwrap();
    let destination = Signer::from_secret_bytes(&[0x13; 32]).unwrap();

    let source = coinbase_paying(&payer, 5_000_000_000);
    let script = engine.build_redemption_script(&[0; 20], &recipient.pubkey_hash()).unwrap();
    let address = engine.script_address(&script);

    let funding = engine
        .build_funding_tx(&source, &address, 100_000_000, FUNDING_FEE, &payer)
        .unwrap();
    let outputs = &funding.transaction().outputs;
    assert_eq!(outputs[0].value + outputs[1].value + FUNDING_FEE, source.value);
    assert!(engine.verify_input(funding.transaction(), 0, &source.script_pubkey).unwrap());

    let funded = funding.output(0).unwrap();
    let claim = engine
        .build_claim_tx(
            &funded,
            &script,
            &destination.p2pkh_address_string(Network::Regtest),
            100_000_000,
            CLAIM_FEE,
            &recipient,
        )
        .unwrap();

    assert_eq!(claim.transaction().outputs[0].value, 99_999_064);
    assert!(engine.verify_input(claim.transaction(), 0, &funded.script_pubkey).unwrap());

    // Wire form survives a decode and keeps its id
    let decoded = deserialize_transaction(&claim.to_bytes()).unwrap();
    assert_eq!(txid_hex(&decoded), claim.txid_hex());

    let pushes = parse_script(&decoded.inputs[0].script_sig).unwrap();
    assert_eq!(pushes.len(), 3);
    assert_eq!(pushes[2], Instruction::Push(script.as_bytes().to_vec()));
}

#[test]
fn test_funding_rejects_address_of_other_network() {
    let engine = PegEngine::new(Network::Regtest);
    let payer = Signer::from_secret_bytes(&[0x11; 32]).unwrap();
    let source = coinbase_paying(&payer, 5_000_000_000);
    let script = engine.build_redemption_script(&[0; 20], &[9; 20]).unwrap();
    let mainnet_address = script.address_string(Network::Mainnet);

    let result = engine.build_funding_tx(&source, &mainnet_address, 1_000, 100, &payer);
    assert!(matches!(result, Err(PegError::WrongNetwork(_))));
}

#[test]
fn test_claim_rejects_garbage_destination() {
    let engine = PegEngine::new(Network::Regtest);
    let recipient = Signer::from_secret_bytes(&[0x12; 32]).unwrap();
    let script = engine.build_redemption_script(&[0; 20], &recipient.pubkey_hash()).unwrap();
    let payer = Signer::from_secret_bytes(&[0x11; 32]).unwrap();
    let funded = coinbase_paying(&payer, 1_000);

    let result = engine.build_claim_tx(&funded, &script, "not-an-address", 1_000, 10, &recipient);
    assert!(matches!(result, Err(PegError::InvalidAddress(_))));
}
