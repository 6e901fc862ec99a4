//! Script opcodes, consensus limits and flow defaults

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Block subsidy paid by regtest coinbase transactions
pub const INITIAL_SUBSIDY: i64 = 50 * SATOSHIS_PER_BTC;

/// Blocks a coinbase output must wait before it can be spent
pub const COINBASE_MATURITY: u64 = 100;

/// Maximum transaction size: 1MB
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Maximum number of inputs per transaction
pub const MAX_INPUTS: usize = 1000;

/// Maximum number of outputs per transaction
pub const MAX_OUTPUTS: usize = 1000;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum stack size during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Legacy sighash type committing to all inputs and outputs
pub const SIGHASH_ALL: u32 = 0x01;

/// Fixed fee deducted from the funding transaction's change output
pub const FUNDING_FEE: i64 = 10_000;

/// Fixed fee deducted from the claim output
pub const CLAIM_FEE: i64 = 312 * 3;

/// Amount locked into the script address by the funding transaction
pub const DEFAULT_FUNDING_AMOUNT: i64 = 100_000_000;

// Opcodes
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_SIZE: u8 = 0x82;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
