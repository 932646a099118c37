//! Effective-transaction emitter
//!
//! Converts the net per-asset summary a commit produced into the minimum
//! set of elementary transfer records that reproduces the same flows with
//! party-pair attribution, for audit and downstream replay.

use crate::{Error, Result};
use ledger_state::{Address, AssetId, Hasher, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Transient per-leg settlement summary. Built during commit evaluation,
/// consumed by the emitter, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    /// Paying or receiving address
    pub address: Address,

    /// Asset
    pub asset: AssetId,

    /// Signed net amount: payments are negative or zero, receipts positive
    pub amount: Quantity,

    /// Encumbrance name the payment resolved against, if any
    pub encumbrance_name: Option<String>,

    /// Amount funded from that encumbrance
    pub encumbrance_consumed: Quantity,

    /// Issuance leg
    pub issuance: bool,
}

/// Elementary transfer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Balance moves from payer to receiver
    Transfer,
    /// Payer mints; supply increases at the receiver
    Issuance,
}

/// Synthesized elementary transfer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveTransfer {
    /// Record kind
    pub kind: TransferKind,

    /// Paying address
    pub from: Address,

    /// Receiving address
    pub to: Address,

    /// Asset
    pub asset: AssetId,

    /// Positive amount transferred
    pub amount: Quantity,

    /// Digest stamped at emission
    pub digest: [u8; 32],
}

impl EffectiveTransfer {
    /// Canonical bytes for hashing (everything but the digest itself)
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(&(&self.kind, &self.from, &self.to, &self.asset, &self.amount))
            .expect("serialization cannot fail")
    }
}

/// Verify the summary nets to zero for every asset
pub fn check_zero_sum(summary: &[SummaryEntry]) -> Result<()> {
    let mut totals: BTreeMap<&AssetId, Quantity> = BTreeMap::new();
    for entry in summary {
        *totals.entry(&entry.asset).or_insert(Decimal::ZERO) += entry.amount;
    }
    for (asset, total) in totals {
        if !total.is_zero() {
            return Err(Error::Validation(format!(
                "Settlement does not balance for {}: net {}",
                asset, total
            )));
        }
    }
    Ok(())
}

/// Emit elementary transfers for a balanced summary.
///
/// Per asset: one record when a single payer faces a single receiver;
/// otherwise a waterfall match over the sorted payment and receipt lists,
/// emitting `min(remaining payment, remaining receipt)` whenever both
/// running counters are positive. The emitted total per asset equals the
/// net flow with the fewest possible records.
pub fn emit_effective_transfers(
    summary: &[SummaryEntry],
    hasher: &dyn Hasher,
) -> Vec<EffectiveTransfer> {
    let mut by_asset: BTreeMap<&AssetId, (Vec<&SummaryEntry>, Vec<&SummaryEntry>)> =
        BTreeMap::new();
    for entry in summary {
        let (payments, receipts) = by_asset.entry(&entry.asset).or_default();
        if entry.amount > Decimal::ZERO {
            receipts.push(entry);
        } else if entry.amount < Decimal::ZERO {
            payments.push(entry);
        }
    }

    let mut transfers = Vec::new();
    for (asset, (mut payments, mut receipts)) in by_asset {
        payments.sort_by(|a, b| (&a.address, a.amount).cmp(&(&b.address, b.amount)));
        receipts.sort_by(|a, b| (&a.address, a.amount).cmp(&(&b.address, b.amount)));

        if payments.len() == 1 && receipts.len() == 1 {
            transfers.push(make_transfer(
                payments[0],
                receipts[0],
                asset,
                receipts[0].amount,
                hasher,
            ));
            continue;
        }

        // Waterfall: running remainders, advance whichever side drains
        let mut p = 0;
        let mut r = 0;
        let mut pay_left = payments.first().map(|e| -e.amount).unwrap_or(Decimal::ZERO);
        let mut rec_left = receipts.first().map(|e| e.amount).unwrap_or(Decimal::ZERO);

        while p < payments.len() && r < receipts.len() {
            if pay_left > Decimal::ZERO && rec_left > Decimal::ZERO {
                let take = pay_left.min(rec_left);
                transfers.push(make_transfer(payments[p], receipts[r], asset, take, hasher));
                pay_left -= take;
                rec_left -= take;
            }
            if pay_left <= Decimal::ZERO {
                p += 1;
                pay_left = payments.get(p).map(|e| -e.amount).unwrap_or(Decimal::ZERO);
            }
            if rec_left <= Decimal::ZERO {
                r += 1;
                rec_left = receipts.get(r).map(|e| e.amount).unwrap_or(Decimal::ZERO);
            }
        }
    }

    debug!(count = transfers.len(), "emitted effective transfers");
    transfers
}

fn make_transfer(
    payment: &SummaryEntry,
    receipt: &SummaryEntry,
    asset: &AssetId,
    amount: Quantity,
    hasher: &dyn Hasher,
) -> EffectiveTransfer {
    let mut transfer = EffectiveTransfer {
        kind: if payment.issuance {
            TransferKind::Issuance
        } else {
            TransferKind::Transfer
        },
        from: payment.address.clone(),
        to: receipt.address.clone(),
        asset: asset.clone(),
        amount,
        digest: [0u8; 32],
    };
    transfer.digest = hasher.hash(&transfer.canonical_bytes());
    transfer
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_state::Sha256Hasher;

    fn gbp() -> AssetId {
        AssetId::new("IssuerGB", "GBP")
    }

    fn pay(address: &str, amount: i64) -> SummaryEntry {
        SummaryEntry {
            address: Address::new(address),
            asset: gbp(),
            amount: Decimal::from(-amount),
            encumbrance_name: None,
            encumbrance_consumed: Decimal::ZERO,
            issuance: false,
        }
    }

    fn receive(address: &str, amount: i64) -> SummaryEntry {
        SummaryEntry {
            address: Address::new(address),
            asset: gbp(),
            amount: Decimal::from(amount),
            encumbrance_name: None,
            encumbrance_consumed: Decimal::ZERO,
            issuance: false,
        }
    }

    #[test]
    fn test_zero_sum_check() {
        assert!(check_zero_sum(&[pay("A", 100), receive("B", 100)]).is_ok());
        assert!(check_zero_sum(&[pay("A", 100), receive("B", 90)]).is_err());
    }

    #[test]
    fn test_single_pair_emits_one_record() {
        let summary = vec![pay("A", 100), receive("B", 100)];
        let transfers = emit_effective_transfers(&summary, &Sha256Hasher);

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].from, Address::new("A"));
        assert_eq!(transfers[0].to, Address::new("B"));
        assert_eq!(transfers[0].amount, Decimal::from(100));
        assert_eq!(transfers[0].kind, TransferKind::Transfer);
        assert_ne!(transfers[0].digest, [0u8; 32]);
    }

    #[test]
    fn test_issuance_flag_carries_through() {
        let mut issuance_pay = pay("Issuer", 40);
        issuance_pay.issuance = true;
        let summary = vec![issuance_pay, receive("B", 40)];

        let transfers = emit_effective_transfers(&summary, &Sha256Hasher);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].kind, TransferKind::Issuance);
    }

    #[test]
    fn test_waterfall_three_payers_one_receiver() {
        let summary = vec![
            pay("P1", 10),
            pay("P2", 10),
            pay("P3", 10),
            receive("R", 30),
        ];
        let transfers = emit_effective_transfers(&summary, &Sha256Hasher);

        assert_eq!(transfers.len(), 3);
        for (i, payer) in ["P1", "P2", "P3"].iter().enumerate() {
            assert_eq!(transfers[i].from, Address::new(*payer));
            assert_eq!(transfers[i].to, Address::new("R"));
            assert_eq!(transfers[i].amount, Decimal::from(10));
        }
    }

    #[test]
    fn test_waterfall_splits_across_receivers() {
        let summary = vec![pay("P", 50), receive("R1", 20), receive("R2", 30)];
        let transfers = emit_effective_transfers(&summary, &Sha256Hasher);

        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].to, Address::new("R1"));
        assert_eq!(transfers[0].amount, Decimal::from(20));
        assert_eq!(transfers[1].to, Address::new("R2"));
        assert_eq!(transfers[1].amount, Decimal::from(30));
    }

    #[test]
    fn test_assets_emit_independently() {
        let usd = AssetId::new("IssuerUS", "USD");
        let mut usd_pay = pay("A", 7);
        usd_pay.asset = usd.clone();
        let mut usd_receive = receive("B", 7);
        usd_receive.asset = usd.clone();

        let summary = vec![pay("A", 100), receive("B", 100), usd_pay, usd_receive];
        let transfers = emit_effective_transfers(&summary, &Sha256Hasher);

        assert_eq!(transfers.len(), 2);
        assert_ne!(transfers[0].asset, transfers[1].asset);
    }

    #[test]
    fn test_digest_depends_on_record_contents() {
        let t1 = emit_effective_transfers(&[pay("A", 100), receive("B", 100)], &Sha256Hasher);
        let t2 = emit_effective_transfers(&[pay("A", 101), receive("B", 101)], &Sha256Hasher);
        assert_ne!(t1[0].digest, t2[0].digest);
    }
}
