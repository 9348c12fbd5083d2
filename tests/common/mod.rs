//! Shared fixtures: hand-built transactions, metadata, and a scripted
//! chain backend for exercising the resolver pipeline offline.

use async_trait::async_trait;
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::CompiledInstruction;
use solana_sdk::message::{Message, MessageHeader, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    UiCompiledInstruction, UiInnerInstructions, UiInstruction, UiTransactionStatusMeta,
    UiTransactionTokenBalance,
};
use std::collections::HashMap;
use std::sync::Mutex;

use retroprice::chain::{BlockData, ChainClient, PerfSample, TxWithMeta};
use retroprice::error::Result;
use retroprice::market::SolUsdSource;
use retroprice::swap::programs::{RAYDIUM_V4_PROGRAM_ID, TOKEN_PROGRAM_ID};

pub fn key(n: u8) -> Pubkey {
    Pubkey::new_from_array([n; 32])
}

pub fn token_balance(
    account_index: u8,
    mint: Pubkey,
    owner: Pubkey,
    amount: u64,
    decimals: u8,
) -> UiTransactionTokenBalance {
    let ui = amount as f64 / 10f64.powi(decimals as i32);
    UiTransactionTokenBalance {
        account_index,
        mint: mint.to_string(),
        ui_token_amount: UiTokenAmount {
            ui_amount: Some(ui),
            decimals,
            amount: amount.to_string(),
            ui_amount_string: ui.to_string(),
        },
        owner: OptionSerializer::Some(owner.to_string()),
        program_id: OptionSerializer::Some(TOKEN_PROGRAM_ID.to_string()),
    }
}

pub fn compiled_ix(program_id_index: u8, accounts: Vec<u8>, data: Vec<u8>) -> CompiledInstruction {
    CompiledInstruction {
        program_id_index,
        accounts,
        data,
    }
}

pub fn inner_ix(program_id_index: u8, accounts: Vec<u8>, data: &[u8]) -> UiInstruction {
    UiInstruction::Compiled(UiCompiledInstruction {
        program_id_index,
        accounts,
        data: bs58::encode(data).into_string(),
        stack_height: None,
    })
}

pub fn transfer_data(amount: u64) -> Vec<u8> {
    let mut data = vec![3u8];
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

pub fn meta_base() -> UiTransactionStatusMeta {
    UiTransactionStatusMeta {
        err: None,
        status: Ok(()),
        fee: 5_000,
        pre_balances: vec![],
        post_balances: vec![],
        inner_instructions: OptionSerializer::None,
        log_messages: OptionSerializer::None,
        pre_token_balances: OptionSerializer::None,
        post_token_balances: OptionSerializer::None,
        rewards: OptionSerializer::None,
        loaded_addresses: OptionSerializer::None,
        return_data: OptionSerializer::None,
        compute_units_consumed: OptionSerializer::None,
    }
}

pub fn versioned_tx(
    account_keys: Vec<Pubkey>,
    instructions: Vec<CompiledInstruction>,
) -> VersionedTransaction {
    let num_keys = account_keys.len() as u8;
    let message = Message {
        header: MessageHeader {
            num_required_signatures: 1,
            num_readonly_signed_accounts: 0,
            num_readonly_unsigned_accounts: num_keys.saturating_sub(2),
        },
        account_keys,
        recent_blockhash: Hash::default(),
        instructions,
    };
    VersionedTransaction {
        signatures: vec![Signature::new_unique()],
        message: VersionedMessage::Legacy(message),
    }
}

/// A sell of `target_mint` into `stable_mint` through a Raydium-shaped
/// pool, as (transaction, metadata).
///
/// Account layout: [signer, token program, amm, signer target account,
/// pool target account, pool stable account, signer stable account,
/// pool authority].
pub fn stable_sell_tx(
    target_mint: Pubkey,
    target_amount: u64,
    target_decimals: u8,
    stable_mint: Pubkey,
    stable_amount: u64,
    stable_decimals: u8,
) -> (VersionedTransaction, UiTransactionStatusMeta) {
    let signer = key(1);
    let pool_auth = key(7);
    let keys = vec![
        signer,
        TOKEN_PROGRAM_ID,
        RAYDIUM_V4_PROGRAM_ID,
        key(3),
        key(4),
        key(5),
        key(6),
        pool_auth,
    ];
    let tx = versioned_tx(
        keys,
        vec![compiled_ix(2, vec![3, 4, 5, 6], vec![9, 0, 0, 0, 0, 0, 0, 0, 0])],
    );

    let mut meta = meta_base();
    meta.pre_balances = vec![1_000_000_000, 0, 0, 0, 0, 0, 0, 0];
    meta.post_balances = vec![999_995_000, 0, 0, 0, 0, 0, 0, 0];
    meta.inner_instructions = OptionSerializer::Some(vec![UiInnerInstructions {
        index: 0,
        instructions: vec![
            // signer -> pool, target mint, authority = signer
            inner_ix(1, vec![3, 4, 0], &transfer_data(target_amount)),
            // pool -> signer, stable mint, authority = pool
            inner_ix(1, vec![5, 6, 7], &transfer_data(stable_amount)),
        ],
    }]);
    meta.pre_token_balances = OptionSerializer::Some(vec![
        token_balance(3, target_mint, signer, 2 * target_amount, target_decimals),
        token_balance(4, target_mint, pool_auth, 10 * target_amount, target_decimals),
        token_balance(5, stable_mint, pool_auth, 20 * stable_amount, stable_decimals),
        token_balance(6, stable_mint, signer, 0, stable_decimals),
    ]);
    meta.post_token_balances = OptionSerializer::Some(vec![
        token_balance(3, target_mint, signer, target_amount, target_decimals),
        token_balance(4, target_mint, pool_auth, 11 * target_amount, target_decimals),
        token_balance(
            5,
            stable_mint,
            pool_auth,
            19 * stable_amount,
            stable_decimals,
        ),
        token_balance(6, stable_mint, signer, stable_amount, stable_decimals),
    ]);
    (tx, meta)
}

/// Chain stub: one block time per slot (1 second per slot), scripted
/// blocks and transactions, and a log of fetched block slots.
pub struct MockChain {
    pub now_slot: u64,
    pub genesis: i64,
    pub blocks: HashMap<u64, BlockData>,
    pub txs: HashMap<Signature, TxWithMeta>,
    pub fetched_blocks: Mutex<Vec<u64>>,
}

impl MockChain {
    pub fn new(now_slot: u64, genesis: i64) -> Self {
        MockChain {
            now_slot,
            genesis,
            blocks: HashMap::new(),
            txs: HashMap::new(),
            fetched_blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn time_of(&self, slot: u64) -> i64 {
        self.genesis + slot as i64
    }

    /// Registers a block holding the given transactions, and makes each
    /// transaction individually fetchable by its first signature.
    pub fn put_block(
        &mut self,
        slot: u64,
        txs: Vec<(VersionedTransaction, UiTransactionStatusMeta)>,
    ) {
        let block_time = Some(self.time_of(slot));
        let mut entries = Vec::new();
        for (tx, meta) in txs {
            let signature = tx.signatures[0];
            let entry = TxWithMeta {
                transaction: Some(tx),
                meta: Some(meta),
                block_time,
            };
            self.txs.insert(signature, entry.clone());
            entries.push(entry);
        }
        self.blocks.insert(
            slot,
            BlockData {
                block_time,
                transactions: entries,
            },
        );
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched_blocks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_finalized_slot(&self) -> Result<u64> {
        Ok(self.now_slot)
    }

    async fn block_time(&self, slot: u64) -> Option<i64> {
        (slot <= self.now_slot).then(|| self.time_of(slot))
    }

    async fn block(&self, slot: u64) -> Result<Option<BlockData>> {
        self.fetched_blocks.lock().unwrap().push(slot);
        Ok(Some(self.blocks.get(&slot).cloned().unwrap_or_default()))
    }

    async fn transaction(&self, signature: &Signature) -> Result<Option<TxWithMeta>> {
        Ok(self.txs.get(signature).cloned())
    }

    async fn performance_samples(&self, _limit: usize) -> Result<Vec<PerfSample>> {
        Ok(vec![PerfSample {
            num_slots: 60,
            sample_period_secs: 60,
        }])
    }
}

/// Fixed SOL/USD quote for tests.
pub struct FixedSolUsd(pub f64);

#[async_trait]
impl SolUsdSource for FixedSolUsd {
    async fn sol_usd_minute_close(&self, _unix_ms: i64) -> Result<f64> {
        Ok(self.0)
    }
}
