use std::sync::{Arc, RwLock};

use algo_wc_core::{ChainId, PortError, WalletAccount, WalletState, WalletStatePort};

/// In-memory account store shared between the wallet UI and the coordinator.
#[derive(Debug, Clone, Default)]
pub struct WalletAccountsAdapter {
    inner: Arc<RwLock<WalletState>>,
}

impl WalletAccountsAdapter {
    pub fn new(state: WalletState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn insert_account(&self, account: WalletAccount) -> Result<(), PortError> {
        let mut g = self
            .inner
            .write()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))?;
        g.accounts.insert(account.address.clone(), account);
        Ok(())
    }

    pub fn remove_account(&self, address: &str) -> Result<WalletAccount, PortError> {
        let mut g = self
            .inner
            .write()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))?;
        g.accounts
            .remove(address)
            .ok_or_else(|| PortError::NotFound(format!("wallet account missing: {address}")))
    }

    pub fn allow_chain(&self, chain: ChainId) -> Result<(), PortError> {
        let mut g = self
            .inner
            .write()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))?;
        g.allowed_chains.insert(chain);
        Ok(())
    }
}

impl WalletStatePort for WalletAccountsAdapter {
    fn snapshot(&self) -> Result<WalletState, PortError> {
        let g = self
            .inner
            .read()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))?;
        Ok(g.clone())
    }
}
