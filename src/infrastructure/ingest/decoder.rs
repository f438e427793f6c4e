//! Account-index decoding of pool-creation instructions.
//!
//! Identification is bitwise program-id equality at the instruction's
//! `program_id_index`; the account positions per DEX are fixed and
//! verified against the public IDLs. Anything that does not match is
//! silently skipped — a bad transaction is never retried.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::domain::events::Dex;
use crate::domain::ports::{RawInstruction, RawTransaction};

/// Anchor discriminator of the pump platform's `create` instruction.
pub const PUMPFUN_CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];

/// First byte of AMM v4 `initialize2`.
pub const AMM_V4_INITIALIZE2_TAG: u8 = 0x01;

/// DEX program identities; overridable through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPrograms {
    pub amm_v4: Pubkey,
    pub clmm: Pubkey,
    pub whirlpool: Pubkey,
    pub meteora_dlmm: Pubkey,
    pub pumpfun: Pubkey,
}

impl Default for DexPrograms {
    fn default() -> Self {
        Self {
            amm_v4: solana_sdk::pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"),
            clmm: solana_sdk::pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK"),
            whirlpool: solana_sdk::pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc"),
            meteora_dlmm: solana_sdk::pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo"),
            pumpfun: solana_sdk::pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P"),
        }
    }
}

impl DexPrograms {
    pub fn identify(&self, program_id: &Pubkey) -> Option<Dex> {
        if program_id == &self.amm_v4 {
            Some(Dex::AmmV4)
        } else if program_id == &self.clmm {
            Some(Dex::Clmm)
        } else if program_id == &self.whirlpool {
            Some(Dex::OrcaWhirlpool)
        } else if program_id == &self.meteora_dlmm {
            Some(Dex::Meteora)
        } else if program_id == &self.pumpfun {
            Some(Dex::PumpFun)
        } else {
            None
        }
    }

    pub fn all(&self) -> [(Dex, Pubkey); 5] {
        [
            (Dex::AmmV4, self.amm_v4),
            (Dex::Clmm, self.clmm),
            (Dex::OrcaWhirlpool, self.whirlpool),
            (Dex::Meteora, self.meteora_dlmm),
            (Dex::PumpFun, self.pumpfun),
        ]
    }
}

/// Log markers announcing a pool initialization, per DEX. Used by the
/// log-subscription driver to decide which transactions to fetch.
pub fn init_log_marker(dex: Dex) -> &'static str {
    match dex {
        Dex::AmmV4 => "initialize2",
        Dex::Clmm => "CreatePool",
        Dex::OrcaWhirlpool => "InitializePool",
        Dex::Meteora => "InitializeLbPair",
        Dex::PumpFun => "Instruction: Create",
    }
}

/// The decoded essence of a pool-creation instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPool {
    pub dex: Dex,
    pub pool_address: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub creator: Pubkey,
    pub initial_liquidity: u64,
}

/// Decode the first matching pool-creation instruction of `tx`.
/// Returns `None` when nothing in the transaction creates a pool.
pub fn decode_pool_transaction(
    tx: &RawTransaction,
    programs: &DexPrograms,
) -> Option<DecodedPool> {
    let fee_payer = *tx.account_keys.first()?;
    for ix in &tx.instructions {
        let program_id = tx.account_keys.get(ix.program_id_index as usize)?;
        let Some(dex) = programs.identify(program_id) else {
            continue;
        };
        if let Some(decoded) = decode_instruction(dex, ix, &tx.account_keys, fee_payer) {
            return Some(decoded);
        }
    }
    None
}

fn account_at(ix: &RawInstruction, keys: &[Pubkey], position: usize) -> Option<Pubkey> {
    let key_index = *ix.accounts.get(position)? as usize;
    keys.get(key_index).copied()
}

fn decode_instruction(
    dex: Dex,
    ix: &RawInstruction,
    keys: &[Pubkey],
    fee_payer: Pubkey,
) -> Option<DecodedPool> {
    match dex {
        Dex::AmmV4 => {
            if ix.accounts.len() < 18 || ix.data.first() != Some(&AMM_V4_INITIALIZE2_TAG) {
                return None;
            }
            // initialize2 data: tag, nonce, open_time u64, init_pc u64,
            // init_coin u64.
            let initial_liquidity = ix
                .data
                .get(10..18)
                .and_then(|b| b.try_into().ok())
                .map(u64::from_le_bytes)
                .unwrap_or(0);
            Some(DecodedPool {
                dex,
                pool_address: account_at(ix, keys, 4)?,
                base_mint: account_at(ix, keys, 8)?,
                quote_mint: account_at(ix, keys, 9)?,
                creator: account_at(ix, keys, 17)?,
                initial_liquidity,
            })
        }
        Dex::Clmm => {
            if ix.accounts.len() < 4 {
                return None;
            }
            Some(DecodedPool {
                dex,
                pool_address: account_at(ix, keys, 1)?,
                base_mint: account_at(ix, keys, 2)?,
                quote_mint: account_at(ix, keys, 3)?,
                creator: fee_payer,
                initial_liquidity: 0,
            })
        }
        Dex::OrcaWhirlpool => {
            if ix.accounts.len() < 5 {
                return None;
            }
            Some(DecodedPool {
                dex,
                pool_address: account_at(ix, keys, 4)?,
                base_mint: account_at(ix, keys, 1)?,
                quote_mint: account_at(ix, keys, 2)?,
                creator: fee_payer,
                initial_liquidity: 0,
            })
        }
        Dex::Meteora => {
            if ix.accounts.len() < 4 {
                return None;
            }
            Some(DecodedPool {
                dex,
                pool_address: account_at(ix, keys, 0)?,
                base_mint: account_at(ix, keys, 2)?,
                quote_mint: account_at(ix, keys, 3)?,
                creator: fee_payer,
                initial_liquidity: 0,
            })
        }
        Dex::PumpFun => {
            if ix.accounts.len() < 8 || ix.data.get(..8) != Some(&PUMPFUN_CREATE_DISCRIMINATOR) {
                return None;
            }
            Some(DecodedPool {
                dex,
                pool_address: account_at(ix, keys, 2)?,
                base_mint: account_at(ix, keys, 0)?,
                quote_mint: spl_token::native_mint::id(),
                creator: account_at(ix, keys, 7)?,
                initial_liquidity: 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Signature;

    fn tx_with(
        program_id: Pubkey,
        account_count: usize,
        data: Vec<u8>,
    ) -> (RawTransaction, Vec<Pubkey>) {
        // account_keys[0] is the fee payer, program id comes last.
        let mut keys: Vec<Pubkey> = (0..account_count).map(|_| Pubkey::new_unique()).collect();
        keys.push(program_id);
        let ix = RawInstruction {
            program_id_index: (keys.len() - 1) as u8,
            accounts: (0..account_count as u8).collect(),
            data,
        };
        (
            RawTransaction {
                signature: Signature::default(),
                slot: 100,
                account_keys: keys.clone(),
                instructions: vec![ix],
            },
            keys,
        )
    }

    #[test]
    fn test_amm_v4_initialize2_decodes_by_index() {
        let programs = DexPrograms::default();
        let mut data = vec![AMM_V4_INITIALIZE2_TAG, 0];
        data.extend(7u64.to_le_bytes()); // open_time
        data.extend(5_000_000_000u64.to_le_bytes()); // init_pc
        data.extend(1_000_000u64.to_le_bytes()); // init_coin
        let (tx, keys) = tx_with(programs.amm_v4, 18, data);

        let decoded = decode_pool_transaction(&tx, &programs).expect("decoded");
        assert_eq!(decoded.dex, Dex::AmmV4);
        assert_eq!(decoded.pool_address, keys[4]);
        assert_eq!(decoded.base_mint, keys[8]);
        assert_eq!(decoded.quote_mint, keys[9]);
        assert_eq!(decoded.creator, keys[17]);
        assert_eq!(decoded.initial_liquidity, 5_000_000_000);
    }

    #[test]
    fn test_amm_v4_wrong_tag_is_skipped() {
        let programs = DexPrograms::default();
        let (tx, _) = tx_with(programs.amm_v4, 18, vec![0x02, 0, 0, 0]);
        assert!(decode_pool_transaction(&tx, &programs).is_none());
    }

    #[test]
    fn test_amm_v4_too_few_accounts_is_skipped() {
        let programs = DexPrograms::default();
        let (tx, _) = tx_with(programs.amm_v4, 17, vec![AMM_V4_INITIALIZE2_TAG]);
        assert!(decode_pool_transaction(&tx, &programs).is_none());
    }

    #[test]
    fn test_pumpfun_requires_discriminator() {
        let programs = DexPrograms::default();

        let (tx, keys) = tx_with(programs.pumpfun, 10, PUMPFUN_CREATE_DISCRIMINATOR.to_vec());
        let decoded = decode_pool_transaction(&tx, &programs).expect("decoded");
        assert_eq!(decoded.dex, Dex::PumpFun);
        assert_eq!(decoded.base_mint, keys[0]);
        assert_eq!(decoded.pool_address, keys[2]);
        assert_eq!(decoded.creator, keys[7]);
        assert_eq!(decoded.quote_mint, spl_token::native_mint::id());

        let (bad, _) = tx_with(programs.pumpfun, 10, vec![9; 8]);
        assert!(decode_pool_transaction(&bad, &programs).is_none());
    }

    #[test]
    fn test_meteora_lb_pair_is_account_zero() {
        let programs = DexPrograms::default();
        let (tx, keys) = tx_with(programs.meteora_dlmm, 6, vec![]);
        let decoded = decode_pool_transaction(&tx, &programs).expect("decoded");
        assert_eq!(decoded.dex, Dex::Meteora);
        assert_eq!(decoded.pool_address, keys[0]);
        assert_eq!(decoded.base_mint, keys[2]);
        assert_eq!(decoded.quote_mint, keys[3]);
        assert_eq!(decoded.creator, keys[0]); // fee payer
    }

    #[test]
    fn test_whirlpool_and_clmm_tables() {
        let programs = DexPrograms::default();

        let (tx, keys) = tx_with(programs.whirlpool, 8, vec![]);
        let decoded = decode_pool_transaction(&tx, &programs).expect("decoded");
        assert_eq!(decoded.dex, Dex::OrcaWhirlpool);
        assert_eq!(decoded.pool_address, keys[4]);
        assert_eq!((decoded.base_mint, decoded.quote_mint), (keys[1], keys[2]));

        let (tx, keys) = tx_with(programs.clmm, 8, vec![]);
        let decoded = decode_pool_transaction(&tx, &programs).expect("decoded");
        assert_eq!(decoded.dex, Dex::Clmm);
        assert_eq!(decoded.pool_address, keys[1]);
        assert_eq!((decoded.base_mint, decoded.quote_mint), (keys[2], keys[3]));
    }

    #[test]
    fn test_unknown_program_yields_nothing() {
        let programs = DexPrograms::default();
        let (tx, _) = tx_with(Pubkey::new_unique(), 18, vec![AMM_V4_INITIALIZE2_TAG]);
        assert!(decode_pool_transaction(&tx, &programs).is_none());
    }
}
