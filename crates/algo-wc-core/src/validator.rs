use std::collections::HashMap;

use crate::domain::{
    CoordinatorPolicy, ErrorReason, PayloadKind, Request, Session, ValidationResult, WalletAccount,
    WalletState,
};

/// Base32 length of a 32-byte public key plus its 4-byte checksum.
pub const ADDRESS_LENGTH: usize = 58;

pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LENGTH
        && address
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

/// Pure request checks run before a request is surfaced to the user.
///
/// Checks run in a fixed order and the first failure wins:
/// chain authorization, item limits, signer presence, hardware-signing
/// compatibility, signer containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestValidator {
    max_transactions: usize,
    max_data_per_signer: usize,
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::from_policy(&CoordinatorPolicy::default())
    }
}

impl RequestValidator {
    pub fn new(max_transactions: usize, max_data_per_signer: usize) -> Self {
        Self {
            max_transactions,
            max_data_per_signer,
        }
    }

    pub fn from_policy(policy: &CoordinatorPolicy) -> Self {
        Self::new(
            policy.max_transactions_per_request,
            policy.max_arbitrary_data_per_signer,
        )
    }

    pub fn validate(
        &self,
        request: &Request,
        session: &Session,
        wallet: &WalletState,
    ) -> ValidationResult {
        match self.check(request, session, wallet) {
            Ok(()) => ValidationResult::Valid,
            Err(reason) => ValidationResult::Invalid(reason),
        }
    }

    fn check(
        &self,
        request: &Request,
        session: &Session,
        wallet: &WalletState,
    ) -> Result<(), ErrorReason> {
        check_chain(request, session, wallet)?;
        self.check_limits(request)?;
        let signers = check_signers(request, wallet)?;
        check_hardware(request.payload_kind, &signers, wallet)?;
        check_containment(&signers, wallet)
    }

    fn check_limits(&self, request: &Request) -> Result<(), ErrorReason> {
        if request.items.is_empty() {
            return Err(ErrorReason::MalformedPayload);
        }
        match request.payload_kind {
            PayloadKind::SingleTransaction | PayloadKind::GroupTransaction => {
                if request.items.len() > self.max_transactions {
                    return Err(ErrorReason::MaxTransactionLimit);
                }
            }
            PayloadKind::ArbitraryData => {
                let mut per_signer: HashMap<&str, usize> = HashMap::new();
                for item in &request.items {
                    let count = per_signer
                        .entry(item.signer.as_deref().unwrap_or_default())
                        .or_default();
                    *count += 1;
                    if *count > self.max_data_per_signer {
                        return Err(ErrorReason::MaxArbitraryDataLimit);
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_chain(
    request: &Request,
    session: &Session,
    wallet: &WalletState,
) -> Result<(), ErrorReason> {
    if session.requested_chain_ids.contains(&request.chain_id)
        && wallet.allowed_chains.contains(&request.chain_id)
    {
        Ok(())
    } else {
        Err(ErrorReason::UnauthorizedChain)
    }
}

fn check_signers<'w>(
    request: &Request,
    wallet: &'w WalletState,
) -> Result<Vec<&'w WalletAccount>, ErrorReason> {
    let mut accounts = Vec::new();
    for item in request.signable_items() {
        let account = item
            .signer
            .as_deref()
            .and_then(|signer| wallet.account(signer))
            .ok_or(ErrorReason::MissingSigner)?;
        accounts.push(account);
    }
    if accounts.is_empty() {
        return Err(ErrorReason::MissingSigner);
    }
    Ok(accounts)
}

fn check_hardware(
    kind: PayloadKind,
    signers: &[&WalletAccount],
    wallet: &WalletState,
) -> Result<(), ErrorReason> {
    if kind != PayloadKind::ArbitraryData {
        return Ok(());
    }
    let needs_device = signers.iter().any(|account| {
        account.requires_hardware
            || wallet
                .account(account.resolved_signer())
                .is_some_and(|auth| auth.requires_hardware)
    });
    if needs_device {
        Err(ErrorReason::Unsupported)
    } else {
        Ok(())
    }
}

fn check_containment(signers: &[&WalletAccount], wallet: &WalletState) -> Result<(), ErrorReason> {
    for account in signers {
        let resolved = account.resolved_signer();
        if !is_valid_address(resolved) {
            return Err(ErrorReason::InvalidPublicKey);
        }
        match wallet.account(resolved) {
            Some(auth) if !auth.watch_only => {}
            _ => return Err(ErrorReason::UnauthorizedMethod),
        }
    }
    Ok(())
}
