use async_trait::async_trait;
use base64::Engine;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::UiTransactionEncoding;
use std::time::Duration;

use crate::domain::errors::SniperError;
use crate::domain::ports::{
    AccountData, ChainClient, RawInstruction, RawTransaction, TokenHolder, TokenSupply,
};

/// `ChainClient` over the nonblocking Solana RPC client.
pub struct SolanaChainClient {
    rpc: RpcClient,
}

impl SolanaChainClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            url.into(),
            request_timeout,
            CommitmentConfig::confirmed(),
        );
        Self { rpc }
    }

    fn map_err(context: &str, e: impl std::fmt::Display) -> SniperError {
        let text = e.to_string();
        if text.contains("timed out") || text.contains("timeout") {
            SniperError::Timeout(0)
        } else {
            SniperError::Network(format!("{context}: {text}"))
        }
    }
}

#[async_trait]
impl ChainClient for SolanaChainClient {
    async fn get_account(&self, address: &Pubkey) -> Result<AccountData, SniperError> {
        let account = self
            .rpc
            .get_account(address)
            .await
            .map_err(|e| Self::map_err("get_account", e))?;
        Ok(AccountData {
            lamports: account.lamports,
            owner: account.owner,
            data: account.data,
        })
    }

    async fn get_token_supply(&self, mint: &Pubkey) -> Result<TokenSupply, SniperError> {
        let supply = self
            .rpc
            .get_token_supply(mint)
            .await
            .map_err(|e| Self::map_err("get_token_supply", e))?;
        let amount = supply
            .amount
            .parse::<u64>()
            .map_err(|e| SniperError::Unknown(format!("unparseable supply amount: {e}")))?;
        Ok(TokenSupply {
            amount,
            decimals: supply.decimals,
        })
    }

    async fn get_largest_holders(
        &self,
        mint: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TokenHolder>, SniperError> {
        let balances = self
            .rpc
            .get_token_largest_accounts(mint)
            .await
            .map_err(|e| Self::map_err("get_token_largest_accounts", e))?;

        let mut holders = Vec::with_capacity(limit.min(balances.len()));
        for balance in balances.into_iter().take(limit) {
            let address = balance
                .address
                .parse::<Pubkey>()
                .map_err(|e| SniperError::Unknown(format!("bad holder address: {e}")))?;
            let amount = balance
                .amount
                .amount
                .parse::<u64>()
                .map_err(|e| SniperError::Unknown(format!("bad holder amount: {e}")))?;
            holders.push(TokenHolder { address, amount });
        }
        Ok(holders)
    }

    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<u64>, SniperError> {
        let fees = self
            .rpc
            .get_recent_prioritization_fees(accounts)
            .await
            .map_err(|e| Self::map_err("get_recent_prioritization_fees", e))?;
        Ok(fees.into_iter().map(|f| f.prioritization_fee).collect())
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<RawTransaction, SniperError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let confirmed = self
            .rpc
            .get_transaction_with_config(signature, config)
            .await
            .map_err(|e| Self::map_err("get_transaction", e))?;

        let tx: VersionedTransaction = confirmed
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| SniperError::Unknown("undecodable transaction payload".into()))?;

        let account_keys = tx.message.static_account_keys().to_vec();
        let instructions = tx
            .message
            .instructions()
            .iter()
            .map(|ix| RawInstruction {
                program_id_index: ix.program_id_index,
                accounts: ix.accounts.clone(),
                data: ix.data.clone(),
            })
            .collect();

        Ok(RawTransaction {
            signature: *signature,
            slot: confirmed.slot,
            account_keys,
            instructions,
        })
    }

    async fn send_transaction(&self, tx_base64: &str) -> Result<Signature, SniperError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(tx_base64)
            .map_err(|e| SniperError::Validation(format!("bad transaction base64: {e}")))?;
        let tx: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| SniperError::Validation(format!("bad transaction payload: {e}")))?;

        self.rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| Self::map_err("send_transaction", e))
    }
}
