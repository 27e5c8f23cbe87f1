//! Per-node balance and stake bookkeeping.
//!
//! Each wallet carries its own lock; operations on one wallet are serialized,
//! operations on different wallets are independent. A transfer debits the
//! source under its lock and then deposits into the destination, so the two
//! halves are not jointly atomic: between them the amount is "in flight" and
//! visible in neither wallet.

use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub balance: f64,
    pub staked: f64,
}

#[derive(Debug, Default)]
pub struct Wallet {
    inner: Mutex<WalletSnapshot>,
}

fn check_amount(amount: f64) -> Result<f64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ChainError::InvalidAmount(amount));
    }
    Ok(amount)
}

impl Wallet {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            inner: Mutex::new(WalletSnapshot {
                balance: initial_balance.max(0.0),
                staked: 0.0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WalletSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!("wallet lock poisoned; continuing with last written state");
            poisoned.into_inner()
        })
    }

    pub fn balance(&self) -> f64 {
        self.lock().balance
    }

    pub fn staked(&self) -> f64 {
        self.lock().staked
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        *self.lock()
    }

    /// Move up to `amount` from balance into stake. Returns the new staked total.
    pub fn stake(&self, amount: f64) -> Result<f64> {
        let amount = check_amount(amount)?;
        let mut w = self.lock();
        let moved = amount.min(w.balance);
        w.balance -= moved;
        w.staked += moved;
        Ok(w.staked)
    }

    /// Move up to `amount` from stake back into balance. Returns the new staked total.
    pub fn unstake(&self, amount: f64) -> Result<f64> {
        let amount = check_amount(amount)?;
        let mut w = self.lock();
        let moved = amount.min(w.staked);
        w.staked -= moved;
        w.balance += moved;
        Ok(w.staked)
    }

    /// Credit `amount` to the balance. Returns the new balance.
    pub fn deposit(&self, amount: f64) -> Result<f64> {
        let amount = check_amount(amount)?;
        let mut w = self.lock();
        w.balance += amount;
        Ok(w.balance)
    }

    /// Debit this wallet and credit `other`. On failure neither wallet changes.
    pub fn transfer_to(&self, other: &Wallet, amount: f64) -> Result<()> {
        let amount = check_amount(amount)?;
        {
            let mut w = self.lock();
            if amount > w.balance {
                return Err(ChainError::InsufficientBalance {
                    requested: amount,
                    available: w.balance,
                });
            }
            w.balance -= amount;
        }
        other.deposit(amount)?;
        Ok(())
    }
}
