//! Normalized view of one transaction: flattened account keys (static plus
//! address-table loads), outer and inner instructions as raw bytes, and the
//! balance metadata the decoder cross-references.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{UiInstruction, UiTransactionStatusMeta};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{PriceError, Result};

/// One compiled instruction, inner or outer, with decoded data bytes.
#[derive(Debug, Clone)]
pub struct Ix {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A pre/post token-balance row restricted to the fields the decoder uses.
#[derive(Debug, Clone)]
pub struct TokenBalanceRow {
    pub account_index: u8,
    pub mint: Pubkey,
    pub owner: Option<Pubkey>,
    /// Raw base units.
    pub amount: u64,
    pub decimals: u8,
}

/// Flattened transaction suitable for instruction-level inspection.
#[derive(Debug, Clone)]
pub struct TxEnvelope {
    /// Static message keys followed by loaded writable then read-only keys.
    pub account_keys: Vec<Pubkey>,
    /// Count of static message keys; pre/post lamport balances only cover
    /// this prefix.
    pub static_keys_len: usize,
    pub signatures: Vec<Signature>,
    pub outer: Vec<Ix>,
    /// Inner instruction sets keyed by outer instruction index.
    pub inner: BTreeMap<u8, Vec<Ix>>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceRow>,
    pub post_token_balances: Vec<TokenBalanceRow>,
    pub log_messages: Vec<String>,
}

impl TxEnvelope {
    pub fn from_parts(tx: &VersionedTransaction, meta: &UiTransactionStatusMeta) -> Result<Self> {
        let mut account_keys: Vec<Pubkey> = tx.message.static_account_keys().to_vec();
        let static_keys_len = account_keys.len();

        if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
            for key in loaded.writable.iter().chain(loaded.readonly.iter()) {
                account_keys.push(parse_pubkey(key)?);
            }
        }

        let outer = tx
            .message
            .instructions()
            .iter()
            .map(|ci| Ix {
                program_id_index: ci.program_id_index,
                accounts: ci.accounts.clone(),
                data: ci.data.clone(),
            })
            .collect();

        let mut inner = BTreeMap::new();
        if let OptionSerializer::Some(sets) = &meta.inner_instructions {
            for set in sets {
                let mut ixs = Vec::with_capacity(set.instructions.len());
                for ui in &set.instructions {
                    // Base64-encoded transactions carry inner instructions in
                    // compiled form with base58 data.
                    if let UiInstruction::Compiled(c) = ui {
                        let data = bs58::decode(&c.data).into_vec().map_err(|e| {
                            PriceError::parse(format!("inner instruction data: {}", e))
                        })?;
                        ixs.push(Ix {
                            program_id_index: c.program_id_index,
                            accounts: c.accounts.clone(),
                            data,
                        });
                    }
                }
                inner.insert(set.index, ixs);
            }
        }

        Ok(TxEnvelope {
            account_keys,
            static_keys_len,
            signatures: tx.signatures.clone(),
            outer,
            inner,
            pre_balances: meta.pre_balances.clone(),
            post_balances: meta.post_balances.clone(),
            pre_token_balances: token_rows(&meta.pre_token_balances)?,
            post_token_balances: token_rows(&meta.post_token_balances)?,
            log_messages: match &meta.log_messages {
                OptionSerializer::Some(logs) => logs.clone(),
                _ => Vec::new(),
            },
        })
    }

    /// Account key at `index`, or `None` when the index points past the
    /// flattened key list (can happen on partially resolved lookups).
    pub fn key_at(&self, index: u8) -> Option<&Pubkey> {
        self.account_keys.get(index as usize)
    }

    /// Program id owning `ix`, if resolvable.
    pub fn program_of(&self, ix: &Ix) -> Option<&Pubkey> {
        self.key_at(ix.program_id_index)
    }

    /// Iterates outer instructions followed by every inner instruction.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Ix> {
        self.outer
            .iter()
            .chain(self.inner.values().flat_map(|set| set.iter()))
    }

    /// Net lamport change of `key` across the transaction; only static
    /// message keys carry lamport balances.
    pub fn lamport_delta_for(&self, key: &Pubkey) -> Option<i64> {
        if self.pre_balances.len() < self.static_keys_len
            || self.post_balances.len() < self.static_keys_len
        {
            return None;
        }
        self.account_keys[..self.static_keys_len]
            .iter()
            .position(|k| k == key)
            .map(|i| self.post_balances[i] as i64 - self.pre_balances[i] as i64)
    }
}

fn token_rows(
    rows: &OptionSerializer<Vec<solana_transaction_status::UiTransactionTokenBalance>>,
) -> Result<Vec<TokenBalanceRow>> {
    let rows = match rows {
        OptionSerializer::Some(rows) => rows,
        _ => return Ok(Vec::new()),
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let owner = match &row.owner {
            OptionSerializer::Some(owner) => Some(parse_pubkey(owner)?),
            _ => None,
        };
        out.push(TokenBalanceRow {
            account_index: row.account_index,
            mint: parse_pubkey(&row.mint)?,
            owner,
            amount: row.ui_token_amount.amount.parse::<u64>().unwrap_or(0),
            decimals: row.ui_token_amount.decimals,
        });
    }
    Ok(out)
}

fn parse_pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| PriceError::parse(format!("pubkey {:?}: {}", s, e)))
}
