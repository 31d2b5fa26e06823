//! Chain Confirmation Engine
//!
//! Waits for a broadcast transaction to be included and, when confirmations
//! are requested, buried deep enough that a reorganization is unlikely to
//! remove it. A reorg observed while waiting is not an error for the caller:
//! the engine re-reads the receipt and keeps counting from its new block.
//!
//! All waiting goes through [`PhysicalTimeEffects`], so timeouts are measured
//! on the effect clock and simulated clocks make the loops deterministic.

use crate::config::ConfirmationConfig;
use ritual_core::effects::{CancellationToken, ChainReadEffects, PhysicalTimeEffects};
use ritual_core::{Receipt, Result, RitualError, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Receipt waiting with reorg detection.
pub struct ConfirmationEngine {
    chain: Arc<dyn ChainReadEffects>,
    time: Arc<dyn PhysicalTimeEffects>,
    config: ConfirmationConfig,
}

impl ConfirmationEngine {
    /// Engine over `chain`, sleeping on `time`.
    pub fn new(
        chain: Arc<dyn ChainReadEffects>,
        time: Arc<dyn PhysicalTimeEffects>,
        config: ConfirmationConfig,
    ) -> Self {
        Self {
            chain,
            time,
            config,
        }
    }

    /// Timing parameters in use.
    pub fn config(&self) -> &ConfirmationConfig {
        &self.config
    }

    /// Overall budget for reaching `confirmations` blocks of depth.
    pub fn confirmations_timeout(&self, confirmations: u64) -> Duration {
        self.config.confirmations_timeout(confirmations)
    }

    /// Receipt for `tx_hash` once it is mined and, if `confirmations > 0`,
    /// buried under that many blocks.
    ///
    /// With zero confirmations the first receipt seen is returned as-is.
    /// Otherwise reorgs, shallow inclusion and inner timeouts are retried
    /// until the confirmation budget runs out, which is reported as
    /// [`RitualError::Timeout`].
    pub async fn wait_for_receipt(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
        confirmations: u64,
    ) -> Result<Receipt> {
        if confirmations == 0 {
            return self.wait_for_mined(tx_hash, timeout).await;
        }

        self.time.sleep_ms(self.config.cooling_interval_ms).await?;

        let budget = self.confirmations_timeout(confirmations);
        let deadline = self.now_ms().await?.saturating_add(duration_ms(budget));
        loop {
            match self
                .block_until_enough_confirmations(tx_hash, timeout, confirmations)
                .await
            {
                Ok(receipt) => return Ok(receipt),
                Err(err) if err.is_transient() => {
                    debug!(%tx_hash, error = %err, "confirmation attempt failed; retrying");
                }
                Err(err) => return Err(err),
            }

            if self.now_ms().await? >= deadline {
                warn!(%tx_hash, confirmations, "confirmation budget exhausted");
                return Err(RitualError::timeout(
                    format!("confirming {tx_hash}"),
                    duration_ms(budget),
                ));
            }
            self.time.sleep_ms(self.config.poll_interval_ms).await?;
        }
    }

    /// [`Self::wait_for_receipt`], abandoned with [`RitualError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn wait_for_receipt_cancellable(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
        confirmations: u64,
        cancel: &dyn CancellationToken,
    ) -> Result<Receipt> {
        if cancel.is_cancelled() {
            return Err(RitualError::cancelled(format!("wait for {tx_hash} is moot")));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%tx_hash, "abandoning receipt wait");
                Err(RitualError::cancelled(format!("wait for {tx_hash} is moot")))
            }
            result = self.wait_for_receipt(tx_hash, timeout, confirmations) => result,
        }
    }

    /// Receipt for `tx_hash` once the chain head is at least `confirmations`
    /// blocks past its inclusion block.
    ///
    /// Fails with [`RitualError::ChainReorganizationDetected`] if the
    /// inclusion moves while counting, and with
    /// [`RitualError::NotEnoughConfirmations`] if the confirmation budget
    /// passes first.
    pub async fn block_until_enough_confirmations(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
        confirmations: u64,
    ) -> Result<Receipt> {
        let receipt = self.wait_for_mined(tx_hash, timeout).await?;

        let budget = self.confirmations_timeout(confirmations);
        let deadline = self.now_ms().await?.saturating_add(duration_ms(budget));
        loop {
            self.time.sleep_ms(self.config.poll_interval_ms).await?;
            self.check_transaction_is_on_chain(&receipt).await?;

            let height = self.chain.current_block_height().await?;
            let so_far = height.saturating_sub(receipt.block_number);
            if so_far >= confirmations {
                debug!(
                    %tx_hash,
                    block = receipt.block_number,
                    height,
                    "transaction confirmed"
                );
                return Ok(receipt);
            }
            trace!(%tx_hash, so_far, confirmations, "waiting for confirmations");

            if self.now_ms().await? >= deadline {
                return Err(RitualError::NotEnoughConfirmations {
                    tx_hash: *tx_hash,
                    confirmations: so_far,
                    required: confirmations,
                });
            }
        }
    }

    /// Assert the transaction is still in the block `receipt` recorded.
    pub async fn check_transaction_is_on_chain(&self, receipt: &Receipt) -> Result<bool> {
        let current = self.chain.get_receipt(&receipt.tx_hash).await?;
        match current {
            Some(current) if current.block_hash == receipt.block_hash => Ok(true),
            other => {
                let new_block = other.map(|r| r.block_hash);
                warn!(
                    tx_hash = %receipt.tx_hash,
                    original = %receipt.block_hash,
                    new = ?new_block,
                    "chain reorganization detected"
                );
                Err(RitualError::ChainReorganizationDetected {
                    tx_hash: receipt.tx_hash,
                    original_block: receipt.block_hash,
                    new_block,
                })
            }
        }
    }

    async fn wait_for_mined(&self, tx_hash: &TxHash, timeout: Duration) -> Result<Receipt> {
        let timeout_ms = duration_ms(timeout);
        let deadline = self.now_ms().await?.saturating_add(timeout_ms);
        loop {
            if let Some(receipt) = self.chain.get_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if self.now_ms().await? >= deadline {
                return Err(RitualError::timeout(
                    format!("waiting for {tx_hash} to be mined"),
                    timeout_ms,
                ));
            }
            self.time.sleep_ms(self.config.poll_interval_ms).await?;
        }
    }

    async fn now_ms(&self) -> Result<u64> {
        Ok(self.time.physical_time().await?.ts_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
