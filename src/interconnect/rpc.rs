//! Handler body for the inbound `CommitTransferToTransfer` call
//!
//! The transport lives elsewhere; it decodes a [`CommitTransferRequest`],
//! calls [`TransferService::commit_transfer_to_transfer`] and sends back the
//! reply.

use super::{CrossZone, MintReceipt};
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::ledger::Ledger;
use crate::core::verify::AccountLookup;
use crate::crypto::is_valid_address;
use crate::wallet::AccountDirectory;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Mint request sent by the light-compute zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTransferRequest {
    pub from_address: String,
    /// Transfer-zone address to credit; must belong to a known account
    pub to_address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTransferReply {
    pub success: bool,
}

/// Shared state behind the inbound handler
#[derive(Clone)]
pub struct TransferService {
    ledger: Arc<Ledger>,
    accounts: Arc<AccountDirectory>,
}

impl TransferService {
    pub fn new(ledger: Arc<Ledger>, accounts: Arc<AccountDirectory>) -> Self {
        Self { ledger, accounts }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    /// Mint `amount` to `to_address`
    pub fn commit_transfer_to_transfer(&self, request: &CommitTransferRequest) -> CommitTransferReply {
        match self.try_commit(request) {
            Ok(_) => CommitTransferReply { success: true },
            Err(e) => {
                warn!(
                    "CommitTransferToTransfer from {} to {} failed: {}",
                    request.from_address, request.to_address, e
                );
                CommitTransferReply { success: false }
            }
        }
    }

    fn try_commit(&self, request: &CommitTransferRequest) -> LedgerResult<MintReceipt> {
        if !is_valid_address(&request.to_address) {
            return Err(LedgerError::InvalidRequest(format!(
                "malformed address {}",
                request.to_address
            )));
        }
        let account = self
            .accounts
            .owner_of(&request.to_address)
            .ok_or_else(|| LedgerError::NotFound(format!("address {}", request.to_address)))?;

        CrossZone::new(&self.ledger, &self.accounts).mint_to(
            &request.from_address,
            &account,
            &request.to_address,
            request.amount,
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TransferService {
        let ledger = Ledger::open_temporary().unwrap();
        ledger.commit_transactions(vec![]).unwrap();
        TransferService::new(Arc::new(ledger), Arc::new(AccountDirectory::new()))
    }

    fn request(to: &str, amount: u64) -> CommitTransferRequest {
        CommitTransferRequest {
            from_address: "light-addr".to_string(),
            to_address: to.to_string(),
            amount,
        }
    }

    #[test]
    fn test_commit_credits_known_address() {
        let service = service();
        let wallet = service.accounts().create_account("alice").unwrap();

        let reply = service.commit_transfer_to_transfer(&request(&wallet.address(), 25));
        assert!(reply.success);
        assert_eq!(service.ledger().balance(&wallet.address()), 25);
        assert_eq!(service.ledger().height().unwrap(), Some(1));
    }

    #[test]
    fn test_commit_to_unknown_address_fails() {
        let service = service();
        let reply = service.commit_transfer_to_transfer(&request("nobody", 25));
        assert!(!reply.success);
        assert_eq!(service.ledger().height().unwrap(), Some(0));
    }

    #[test]
    fn test_commit_rejects_balance_overflow() {
        let service = service();
        let wallet = service.accounts().create_account("alice").unwrap();
        let half = u64::MAX / 2 + 1;

        assert!(service.commit_transfer_to_transfer(&request(&wallet.address(), half)).success);
        assert!(!service.commit_transfer_to_transfer(&request(&wallet.address(), half)).success);
        assert_eq!(service.ledger().balance(&wallet.address()), half);
        assert_eq!(service.ledger().stats().unwrap().total_unspent, half);
    }

    #[test]
    fn test_malformed_address_is_rejected() {
        let service = service();
        let wallet = service.accounts().create_account("alice").unwrap();
        let mut tampered = wallet.address();
        tampered.pop();
        tampered.push(if wallet.address().ends_with('2') { '3' } else { '2' });
        assert!(!is_valid_address(&tampered));

        let reply = service.commit_transfer_to_transfer(&request(&tampered, 5));
        assert!(!reply.success);
        assert_eq!(service.ledger().height().unwrap(), Some(0));
    }

    #[test]
    fn test_commit_zero_fails() {
        let service = service();
        let wallet = service.accounts().create_account("alice").unwrap();
        let reply = service.commit_transfer_to_transfer(&request(&wallet.address(), 0));
        assert!(!reply.success);
        assert_eq!(service.ledger().balance(&wallet.address()), 0);
    }

    #[test]
    fn test_request_json_shape() {
        let json = r#"{"from_address":"light-addr","to_address":"abc","amount":7}"#;
        let decoded: CommitTransferRequest = serde_json::from_str(json).unwrap();
        assert_eq!(decoded, request("abc", 7));
        assert_eq!(
            serde_json::to_string(&CommitTransferReply { success: true }).unwrap(),
            r#"{"success":true}"#
        );
    }
}
