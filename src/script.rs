//! Script construction and the script execution engine
//!
//! Builds the data-carrying redemption script and the standard P2PKH / P2SH
//! locking scripts, and evaluates scripts with a stack machine that covers the
//! opcodes those scripts (and their unlocking scripts) use.

use crate::types::*;
use crate::constants::*;
use crate::error::{Result, PegError};
use crate::network::{Address, Network};
use crate::transaction::signature_hash;
use sha2::{Sha256, Digest};
use ripemd::Ripemd160;
use secp256k1::{Secp256k1, PublicKey, ecdsa::Signature, Message, Context, Verification};

/// Evaluate P2SH (BIP16) redeem scripts
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;

/// Hash160(x) = RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha256_hash = Sha256::digest(data);
    let ripemd160_hash = Ripemd160::digest(&sha256_hash);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd160_hash);
    out
}

/// Append a minimally-encoded data push.
///
/// Empty data and the single bytes 0x01..=0x10 and 0x81 become OP_0,
/// OP_1..OP_16 and OP_1NEGATE; everything else is length-prefixed.
pub fn push_data(script: &mut ByteString, data: &[u8]) {
    let small = match data {
        [] => Some(OP_0),
        [n @ 1..=16] => Some(OP_1 - 1 + *n),
        [0x81] => Some(OP_1NEGATE),
        _ => None,
    };
    if let Some(opcode) = small {
        script.push(opcode);
        return;
    }

    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// Bytes a push instruction places on the stack, small-number opcodes included
pub fn pushed_bytes(instruction: &Instruction) -> Option<ByteString> {
    match instruction {
        Instruction::Push(data) => Some(data.clone()),
        Instruction::Op(OP_1NEGATE) => Some(vec![0x81]),
        Instruction::Op(op @ OP_1..=OP_16) => Some(vec![*op - (OP_1 - 1)]),
        Instruction::Op(_) => None,
    }
}

/// One parsed script element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Data pushed by OP_0, a direct push or OP_PUSHDATA1/2/4
    Push(ByteString),
    Op(u8),
}

/// Split a serialized script into pushes and opcodes
pub fn parse_script(script: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;

        let len = match opcode {
            OP_0 => {
                instructions.push(Instruction::Push(vec![]));
                continue;
            }
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => {
                let n = *script.get(pos).ok_or_else(truncated)? as usize;
                pos += 1;
                n
            }
            OP_PUSHDATA2 => {
                let b = script.get(pos..pos + 2).ok_or_else(truncated)?;
                pos += 2;
                u16::from_le_bytes([b[0], b[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let b = script.get(pos..pos + 4).ok_or_else(truncated)?;
                pos += 4;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            _ => {
                instructions.push(Instruction::Op(opcode));
                continue;
            }
        };

        let data = script.get(pos..pos + len).ok_or_else(truncated)?;
        pos += len;
        instructions.push(Instruction::Push(data.to_vec()));
    }

    Ok(instructions)
}

fn truncated() -> PegError {
    PegError::ScriptExecution("Push past end of script".to_string())
}

/// True if the script consists of data pushes only
pub fn is_push_only(script: &[u8]) -> bool {
    match parse_script(script) {
        Ok(instructions) => instructions.iter().all(|i| pushed_bytes(i).is_some()),
        Err(_) => false,
    }
}

/// P2PKH locking script: OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script(pubkey_hash: &Hash160) -> ByteString {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    push_data(&mut script, pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// P2SH locking script: OP_HASH160 <20-byte hash> OP_EQUAL
pub fn p2sh_script(script_hash: &Hash160) -> ByteString {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    push_data(&mut script, script_hash);
    script.push(OP_EQUAL);
    script
}

/// The pubkey hash a P2PKH locking script pays to
pub fn extract_p2pkh_hash(script: &[u8]) -> Option<Hash160> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        Some(hash)
    } else {
        None
    }
}

/// The script hash a P2SH locking script commits to
pub fn extract_p2sh_hash(script: &[u8]) -> Option<Hash160> {
    if is_p2sh(script) {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[2..22]);
        Some(hash)
    } else {
        None
    }
}

/// Exact P2SH template match (BIP16)
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL
}

/// `<payload> OP_DROP OP_DUP OP_HASH160 <recipient key hash> OP_EQUALVERIFY OP_CHECKSIG`
///
/// The payload is pushed and dropped straight away, so it never takes part in
/// validation: spending needs exactly what a P2PKH spend to the recipient needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionScript {
    bytes: ByteString,
    payload: ByteString,
    recipient_key_hash: Hash160,
}

/// Build the data-carrying redemption script.
///
/// Fails with `InvalidKeyHashLength` unless `recipient_key_hash` is a 20-byte
/// hash160 digest, and with `PayloadTooLarge` if the payload cannot be pushed.
pub fn build_redemption_script(payload: &[u8], recipient_key_hash: &[u8]) -> Result<RedemptionScript> {
    if recipient_key_hash.len() != 20 {
        return Err(PegError::InvalidKeyHashLength(recipient_key_hash.len()));
    }
    if payload.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(PegError::PayloadTooLarge(payload.len()));
    }

    let mut key_hash = [0u8; 20];
    key_hash.copy_from_slice(recipient_key_hash);

    let mut bytes = Vec::with_capacity(payload.len() + 30);
    push_data(&mut bytes, payload);
    bytes.push(OP_DROP);
    bytes.push(OP_DUP);
    bytes.push(OP_HASH160);
    push_data(&mut bytes, &key_hash);
    bytes.push(OP_EQUALVERIFY);
    bytes.push(OP_CHECKSIG);

    Ok(RedemptionScript {
        bytes,
        payload: payload.to_vec(),
        recipient_key_hash: key_hash,
    })
}

impl RedemptionScript {
    /// Recover payload and recipient key hash from serialized script bytes.
    ///
    /// Lets an observer check an address by regenerating the script it hides.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let instructions = parse_script(bytes)?;
        match instructions.as_slice() {
            [first,
             Instruction::Op(OP_DROP),
             Instruction::Op(OP_DUP),
             Instruction::Op(OP_HASH160),
             Instruction::Push(key_hash),
             Instruction::Op(OP_EQUALVERIFY),
             Instruction::Op(OP_CHECKSIG)] => {
                let payload = pushed_bytes(first).ok_or_else(not_a_redemption_script)?;
                let script = build_redemption_script(&payload, key_hash)?;
                // Reject non-minimal pushes: the hash must match what we would build.
                if script.bytes != bytes {
                    return Err(PegError::ScriptExecution(
                        "Non-canonical redemption script encoding".to_string()
                    ));
                }
                Ok(script)
            }
            _ => Err(not_a_redemption_script()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn recipient_key_hash(&self) -> &Hash160 {
        &self.recipient_key_hash
    }

    /// Hash160 of the serialized script: the P2SH commitment
    pub fn script_hash(&self) -> Hash160 {
        hash160(&self.bytes)
    }

    /// OP_HASH160 <script hash> OP_EQUAL
    pub fn p2sh_script_pubkey(&self) -> ByteString {
        p2sh_script(&self.script_hash())
    }

    pub fn address(&self) -> Address {
        Address::P2sh(self.script_hash())
    }

    /// Base58Check script-hash address for `network`
    pub fn address_string(&self, network: Network) -> String {
        self.address().encode(network)
    }
}

fn not_a_redemption_script() -> PegError {
    PegError::ScriptExecution("Script is not a data-carrying redemption script".to_string())
}

/// Signature verification seam used by OP_CHECKSIG.
///
/// `script_code` is the script currently executing: the redeem script for a
/// P2SH spend, the locking script otherwise.
pub trait SignatureChecker {
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool;
}

/// Checker that rejects every signature, for evaluating scripts outside a transaction
pub struct NullSignatureChecker;

impl SignatureChecker for NullSignatureChecker {
    fn check_sig(&self, _signature: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> bool {
        false
    }
}

/// Checks signatures against the legacy sighash of one transaction input
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Self {
        TransactionSignatureChecker { tx, input_index }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool {
        // Last byte is the sighash type
        let Some((&sighash_type, der)) = signature.split_last() else {
            return false;
        };
        let sighash = match signature_hash(self.tx, self.input_index, script_code, sighash_type as u32) {
            Ok(hash) => hash,
            Err(_) => return false,
        };
        let secp = Secp256k1::verification_only();
        verify_signature(&secp, pubkey, der, &sighash)
    }
}

/// Verify ECDSA signature using secp256k1
fn verify_signature<C: Context + Verification>(
    secp: &Secp256k1<C>,
    pubkey_bytes: &[u8],
    signature_bytes: &[u8],
    digest: &Hash,
) -> bool {
    let pubkey = match PublicKey::from_slice(pubkey_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    // Strict DER (BIP66)
    let mut signature = match Signature::from_der(signature_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    signature.normalize_s();

    let message = match Message::from_digest_slice(digest) {
        Ok(m) => m,
        Err(_) => return false,
    };

    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// CastToBool: any non-zero byte, except negative zero
pub fn cast_to_bool(item: &[u8]) -> bool {
    for (i, byte) in item.iter().enumerate() {
        if *byte != 0 {
            return !(i == item.len() - 1 && *byte == 0x80);
        }
    }
    false
}

/// Minimal script-number encoding of a small non-negative integer
fn encode_num(n: usize) -> ByteString {
    let mut out = Vec::new();
    let mut v = n;
    while v > 0 {
        out.push((v & 0xff) as u8);
        v >>= 8;
    }
    if let Some(last) = out.last() {
        if last & 0x80 != 0 {
            out.push(0);
        }
    }
    out
}

/// Run `script` against `stack`, returning false on the first failing opcode.
///
/// Unlike [`eval_script`] no final-stack condition is applied, so this is the
/// primitive used to chain scriptSig, scriptPubKey and redeem script.
pub fn execute_script(
    script: &[u8],
    stack: &mut Vec<ByteString>,
    checker: &dyn SignatureChecker,
) -> Result<bool> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(PegError::ScriptExecution("Script size limit exceeded".to_string()));
    }

    let mut op_count = 0;

    for instruction in parse_script(script)? {
        match instruction {
            Instruction::Push(data) => {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(PegError::ScriptExecution("Push size limit exceeded".to_string()));
                }
                stack.push(data);
            }
            Instruction::Op(opcode) => {
                if opcode > OP_16 {
                    op_count += 1;
                    if op_count > MAX_SCRIPT_OPS {
                        return Err(PegError::ScriptExecution("Operation limit exceeded".to_string()));
                    }
                }
                if !execute_opcode(opcode, stack, script, checker)? {
                    return Ok(false);
                }
            }
        }

        if stack.len() > MAX_STACK_SIZE {
            return Err(PegError::ScriptExecution("Stack overflow".to_string()));
        }
    }

    Ok(true)
}

/// EvalScript: 𝒮𝒞 × 𝒮𝒯 → {true, false}
///
/// 1. Execute every instruction of the script against the stack
/// 2. Return false as soon as an opcode fails
/// 3. Return |S| = 1 ∧ CastToBool(S[0])
pub fn eval_script(
    script: &[u8],
    stack: &mut Vec<ByteString>,
    checker: &dyn SignatureChecker,
) -> Result<bool> {
    if !execute_script(script, stack, checker)? {
        return Ok(false);
    }
    Ok(stack.len() == 1 && cast_to_bool(&stack[0]))
}

/// VerifyScript: 𝒮𝒞 × 𝒮𝒞 × ℕ → {true, false}
///
/// For scriptSig ss, scriptPubKey spk and flags f:
/// 1. Execute ss on an empty stack
/// 2. Execute spk on a copy of the resulting stack; its top must be true
/// 3. If f has P2SH and spk is P2SH: ss must be push-only; pop the last
///    element pushed by ss as the redeem script and execute it on the rest
/// 4. Return the final stack's top is true
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    flags: u32,
    checker: &dyn SignatureChecker,
) -> Result<bool> {
    let mut stack = Vec::new();

    if !execute_script(script_sig, &mut stack, checker)? {
        return Ok(false);
    }
    let stack_copy = stack.clone();

    if !execute_script(script_pubkey, &mut stack, checker)? {
        return Ok(false);
    }
    match stack.last() {
        Some(top) if cast_to_bool(top) => {}
        _ => return Ok(false),
    }

    if flags & SCRIPT_VERIFY_P2SH != 0 && is_p2sh(script_pubkey) {
        if !is_push_only(script_sig) {
            return Ok(false);
        }

        let mut stack = stack_copy;
        let redeem_script = match stack.pop() {
            Some(script) => script,
            None => return Ok(false),
        };

        if !execute_script(&redeem_script, &mut stack, checker)? {
            return Ok(false);
        }
        return Ok(stack.last().map(|top| cast_to_bool(top)).unwrap_or(false));
    }

    Ok(true)
}

/// Verify input `input_index` of `tx` against the locking script it spends
pub fn verify_input(tx: &Transaction, input_index: usize, prev_script_pubkey: &[u8]) -> Result<bool> {
    let input = tx.inputs.get(input_index).ok_or(PegError::InputOutOfRange {
        index: input_index,
        count: tx.inputs.len(),
    })?;
    let checker = TransactionSignatureChecker::new(tx, input_index);
    verify_script(&input.script_sig, prev_script_pubkey, SCRIPT_VERIFY_P2SH, &checker)
}

/// Execute a single opcode
fn execute_opcode(
    opcode: u8,
    stack: &mut Vec<ByteString>,
    script_code: &[u8],
    checker: &dyn SignatureChecker,
) -> Result<bool> {
    match opcode {
        OP_1NEGATE => {
            stack.push(vec![0x81]);
            Ok(true)
        }

        // OP_1 to OP_16 - push numbers 1-16
        OP_1..=OP_16 => {
            stack.push(vec![opcode - (OP_1 - 1)]);
            Ok(true)
        }

        OP_NOP => Ok(true),

        OP_DUP => {
            if let Some(item) = stack.last().cloned() {
                stack.push(item);
                Ok(true)
            } else {
                Ok(false)
            }
        }

        OP_DROP => Ok(stack.pop().is_some()),

        OP_DEPTH => {
            let depth = encode_num(stack.len());
            stack.push(depth);
            Ok(true)
        }

        OP_SIZE => {
            if let Some(item) = stack.last() {
                let size = encode_num(item.len());
                stack.push(size);
                Ok(true)
            } else {
                Ok(false)
            }
        }

        OP_RETURN => Ok(false),

        OP_EQUAL | OP_EQUALVERIFY => {
            let (a, b) = match (stack.pop(), stack.pop()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Ok(false),
            };
            if opcode == OP_EQUALVERIFY {
                return Ok(a == b);
            }
            stack.push(if a == b { vec![1] } else { vec![] });
            Ok(true)
        }

        // RIPEMD160(SHA256(x))
        OP_HASH160 => match stack.pop() {
            Some(item) => {
                stack.push(hash160(&item).to_vec());
                Ok(true)
            }
            None => Ok(false),
        },

        OP_CHECKSIG => {
            let (pubkey_bytes, signature_bytes) = match (stack.pop(), stack.pop()) {
                (Some(pk), Some(sig)) => (pk, sig),
                _ => return Ok(false),
            };

            let valid = !signature_bytes.is_empty()
                && checker.check_sig(&signature_bytes, &pubkey_bytes, script_code);
            stack.push(if valid { vec![1] } else { vec![] });
            Ok(true)
        }

        // Unknown opcode
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAll;

    impl SignatureChecker for AcceptAll {
        fn check_sig(&self, _signature: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> bool {
            true
        }
    }

    fn run(script: &[u8]) -> (bool, Vec<ByteString>) {
        let mut stack = Vec::new();
        let result = eval_script(script, &mut stack, &NullSignatureChecker).unwrap();
        (result, stack)
    }

    #[test]
    fn test_eval_script_simple() {
        let (result, stack) = run(&[OP_1]);
        assert!(result);
        assert_eq!(stack, vec![vec![1]]);
    }

    #[test]
    fn test_eval_script_overflow() {
        let script = vec![OP_1; MAX_STACK_SIZE + 1];
        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, &NullSignatureChecker).is_err());
    }

    #[test]
    fn test_operation_count_limit() {
        let mut script = vec![OP_1];
        script.extend(std::iter::repeat(OP_DUP).take(MAX_SCRIPT_OPS + 1));
        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, &NullSignatureChecker).is_err());
    }

    #[test]
    fn test_push_data_encodings() {
        let mut script = Vec::new();
        push_data(&mut script, &[0xab; 75]);
        assert_eq!(script[0], 75);

        let mut script = Vec::new();
        push_data(&mut script, &[0xab; 76]);
        assert_eq!(&script[0..2], &[OP_PUSHDATA1, 76]);

        let mut script = Vec::new();
        push_data(&mut script, &[0xab; 256]);
        assert_eq!(&script[0..3], &[OP_PUSHDATA2, 0x00, 0x01]);
    }

    #[test]
    fn test_parse_script_pushdata_variants() {
        let mut script = Vec::new();
        push_data(&mut script, &[1, 2, 3]);
        push_data(&mut script, &[9; 80]);
        script.push(OP_0);
        script.push(OP_DROP);

        let parsed = parse_script(&script).unwrap();
        assert_eq!(parsed, vec![
            Instruction::Push(vec![1, 2, 3]),
            Instruction::Push(vec![9; 80]),
            Instruction::Push(vec![]),
            Instruction::Op(OP_DROP),
        ]);
    }

    #[test]
    fn test_parse_script_truncated_push() {
        assert!(parse_script(&[0x05, 1, 2]).is_err());
        assert!(parse_script(&[OP_PUSHDATA1]).is_err());
    }

    #[test]
    fn test_op_drop_discards_payload() {
        let mut script = Vec::new();
        push_data(&mut script, b"payload");
        script.push(OP_DROP);
        script.push(OP_1);
        let (result, stack) = run(&script);
        assert!(result);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_op_drop_empty_stack() {
        assert!(!run(&[OP_DROP]).0);
    }

    #[test]
    fn test_op_hash160() {
        let (result, stack) = run(&[OP_1, OP_HASH160]);
        assert!(result);
        assert_eq!(stack[0], hash160(&[1]).to_vec());
    }

    #[test]
    fn test_op_equal_false_is_empty() {
        let (result, stack) = run(&[OP_1, 0x52, OP_EQUAL]);
        assert!(!result);
        assert_eq!(stack, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_op_equalverify_mismatch() {
        assert!(!run(&[OP_1, 0x52, OP_EQUALVERIFY]).0);
    }

    #[test]
    fn test_op_checksig_null_checker() {
        let (result, stack) = run(&[OP_1, OP_1, OP_CHECKSIG]);
        assert!(!result);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_op_checksig_empty_signature_fails() {
        let mut stack = Vec::new();
        let result = eval_script(&[OP_0, OP_1, OP_CHECKSIG], &mut stack, &AcceptAll).unwrap();
        assert!(!result);
    }

    #[test]
    fn test_op_size_and_depth() {
        let (_, stack) = run(&[0x02, 0xaa, 0xbb, OP_SIZE, OP_DEPTH]);
        assert_eq!(stack[1], vec![2]);
        assert_eq!(stack[2], vec![2]);
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(!run(&[0xff]).0);
    }

    #[test]
    fn test_opcodes_outside_redemption_templates_fail() {
        // VERIFY, 2DROP, 2DUP, NIP, OVER, SWAP, SHA256, HASH256, CHECKSIGVERIFY
        for opcode in [0x69u8, 0x6d, 0x6e, 0x77, 0x78, 0x7c, 0xa8, 0xaa, 0xad] {
            let mut stack = Vec::new();
            let executed = execute_script(&[OP_1, OP_1, opcode], &mut stack, &NullSignatureChecker).unwrap();
            assert!(!executed, "opcode {:#04x}", opcode);
        }
    }

    #[test]
    fn test_cast_to_bool() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0, 0]));
        assert!(!cast_to_bool(&[0, 0x80]));
        assert!(cast_to_bool(&[0x80, 0]));
        assert!(cast_to_bool(&[1]));
    }

    #[test]
    fn test_redemption_script_layout() {
        let payload = [0u8; 20];
        let key_hash = [0x11u8; 20];
        let script = build_redemption_script(&payload, &key_hash).unwrap();
        let bytes = script.as_bytes();

        assert_eq!(bytes.len(), 21 + 3 + 21 + 2);
        assert_eq!(bytes[0], 20);
        assert_eq!(&bytes[21..24], &[OP_DROP, OP_DUP, OP_HASH160]);
        assert_eq!(bytes[24], 20);
        assert_eq!(&bytes[25..45], &key_hash);
        assert_eq!(&bytes[45..], &[OP_EQUALVERIFY, OP_CHECKSIG]);
    }

    #[test]
    fn test_redemption_script_empty_payload() {
        let script = build_redemption_script(&[], &[0x22; 20]).unwrap();
        assert_eq!(script.as_bytes()[0], OP_0);
        assert_eq!(RedemptionScript::parse(script.as_bytes()).unwrap(), script);
    }

    #[test]
    fn test_redemption_script_invalid_key_hash() {
        for len in [0usize, 1, 19, 21, 32] {
            let key_hash = vec![0u8; len];
            assert!(matches!(
                build_redemption_script(b"data", &key_hash),
                Err(PegError::InvalidKeyHashLength(n)) if n == len
            ));
        }
    }

    #[test]
    fn test_redemption_script_payload_too_large() {
        let payload = vec![0u8; MAX_SCRIPT_ELEMENT_SIZE + 1];
        assert!(matches!(
            build_redemption_script(&payload, &[0; 20]),
            Err(PegError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_redemption_script_parse_roundtrip() {
        let script = build_redemption_script(b"stacks-principal", &[0x33; 20]).unwrap();
        let parsed = RedemptionScript::parse(script.as_bytes()).unwrap();
        assert_eq!(parsed.payload(), b"stacks-principal");
        assert_eq!(parsed.recipient_key_hash(), &[0x33; 20]);
    }

    #[test]
    fn test_redemption_script_parse_rejects_p2pkh() {
        assert!(RedemptionScript::parse(&p2pkh_script(&[0x44; 20])).is_err());
    }

    #[test]
    fn test_redemption_script_parse_rejects_non_minimal_push() {
        let canonical = build_redemption_script(&[7; 3], &[0x55; 20]).unwrap();
        let mut non_minimal = vec![OP_PUSHDATA1, 3, 7, 7, 7];
        non_minimal.extend_from_slice(&canonical.as_bytes()[4..]);
        assert!(RedemptionScript::parse(&non_minimal).is_err());
    }

    #[test]
    fn test_p2sh_script_pubkey_matches_hash() {
        let script = build_redemption_script(&[1; 20], &[2; 20]).unwrap();
        let spk = script.p2sh_script_pubkey();
        assert!(is_p2sh(&spk));
        assert_eq!(extract_p2sh_hash(&spk), Some(hash160(script.as_bytes())));
    }

    #[test]
    fn test_extract_p2pkh_hash() {
        let spk = p2pkh_script(&[9; 20]);
        assert_eq!(spk.len(), 25);
        assert_eq!(extract_p2pkh_hash(&spk), Some([9; 20]));
        assert_eq!(extract_p2pkh_hash(&p2sh_script(&[9; 20])), None);
    }

    #[test]
    fn test_verify_script_p2sh_requires_push_only_script_sig() {
        let redeem = vec![OP_1];
        let spk = p2sh_script(&hash160(&redeem));

        let mut script_sig = Vec::new();
        push_data(&mut script_sig, &redeem);
        assert!(verify_script(&script_sig, &spk, SCRIPT_VERIFY_P2SH, &NullSignatureChecker).unwrap());

        let mut non_push = vec![OP_NOP];
        push_data(&mut non_push, &redeem);
        assert!(!verify_script(&non_push, &spk, SCRIPT_VERIFY_P2SH, &NullSignatureChecker).unwrap());
    }

    #[test]
    fn test_verify_script_p2sh_runs_redeem_script() {
        // Redeem script that always fails: hash matches, evaluation must not
        let redeem = vec![OP_RETURN];
        let spk = p2sh_script(&hash160(&redeem));
        let mut script_sig = Vec::new();
        push_data(&mut script_sig, &redeem);

        assert!(!verify_script(&script_sig, &spk, SCRIPT_VERIFY_P2SH, &NullSignatureChecker).unwrap());
        // Without the flag only the hash is checked
        assert!(verify_script(&script_sig, &spk, 0, &NullSignatureChecker).unwrap());
    }

    #[test]
    fn test_redemption_script_evaluates_with_valid_signature() {
        let pubkey = vec![0x02; 33];
        let script = build_redemption_script(&[0; 20], &hash160(&pubkey)).unwrap();

        let mut script_sig = Vec::new();
        push_data(&mut script_sig, &[0x30, 0x01]);
        push_data(&mut script_sig, &pubkey);
        push_data(&mut script_sig, script.as_bytes());

        let spk = script.p2sh_script_pubkey();
        assert!(verify_script(&script_sig, &spk, SCRIPT_VERIFY_P2SH, &AcceptAll).unwrap());
    }

    #[test]
    fn test_redemption_script_rejects_wrong_pubkey() {
        let script = build_redemption_script(&[0; 20], &hash160(&[0x02; 33])).unwrap();

        let mut script_sig = Vec::new();
        push_data(&mut script_sig, &[0x30, 0x01]);
        push_data(&mut script_sig, &[0x03; 33]);
        push_data(&mut script_sig, script.as_bytes());

        let spk = script.p2sh_script_pubkey();
        assert!(!verify_script(&script_sig, &spk, SCRIPT_VERIFY_P2SH, &AcceptAll).unwrap());
    }

    #[test]
    fn test_push_data_small_values_use_opcodes() {
        let encode = |data: &[u8]| {
            let mut script = Vec::new();
            push_data(&mut script, data);
            script
        };
        assert_eq!(encode(&[]), vec![OP_0]);
        assert_eq!(encode(&[1]), vec![OP_1]);
        assert_eq!(encode(&[5]), vec![0x55]);
        assert_eq!(encode(&[16]), vec![OP_16]);
        assert_eq!(encode(&[0x81]), vec![OP_1NEGATE]);
        assert_eq!(encode(&[0]), vec![0x01, 0x00]);
        assert_eq!(encode(&[17]), vec![0x01, 17]);
    }

    #[test]
    fn test_small_number_opcodes_push_their_value() {
        let (result, stack) = run(&[OP_1NEGATE, OP_DROP, 0x55]);
        assert!(result);
        assert_eq!(stack, vec![vec![5]]);

        let mut stack = Vec::new();
        execute_script(&[OP_1NEGATE], &mut stack, &NullSignatureChecker).unwrap();
        assert_eq!(stack, vec![vec![0x81]]);
    }

    #[test]
    fn test_is_push_only_accepts_small_number_opcodes() {
        assert!(is_push_only(&[OP_0, OP_1NEGATE, OP_1, OP_16, 0x01, 0xff]));
        assert!(!is_push_only(&[OP_1, OP_DUP]));
    }

    #[test]
    fn test_redemption_script_single_byte_payloads() {
        let pubkey = vec![0x02; 33];
        for (payload, first_opcode) in [(0x07u8, 0x57u8), (0x10, OP_16), (0x81, OP_1NEGATE)] {
            let script = build_redemption_script(&[payload], &hash160(&pubkey)).unwrap();
            assert_eq!(script.as_bytes()[0], first_opcode);
            assert_eq!(script.as_bytes()[1], OP_DROP);

            let parsed = RedemptionScript::parse(script.as_bytes()).unwrap();
            assert_eq!(parsed.payload(), &[payload]);

            let mut script_sig = Vec::new();
            push_data(&mut script_sig, &[0x30, 0x01]);
            push_data(&mut script_sig, &pubkey);
            push_data(&mut script_sig, script.as_bytes());
            let spk = script.p2sh_script_pubkey();
            assert!(verify_script(&script_sig, &spk, SCRIPT_VERIFY_P2SH, &AcceptAll).unwrap());
        }
    }

    #[test]
    fn test_redemption_script_parse_rejects_direct_push_of_small_value() {
        let canonical = build_redemption_script(&[0x05], &[0x66; 20]).unwrap();
        let mut direct = vec![0x01, 0x05];
        direct.extend_from_slice(&canonical.as_bytes()[1..]);
        assert!(RedemptionScript::parse(&direct).is_err());
    }
}
