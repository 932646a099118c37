//! DVP settlement engine
//!
//! A pure, synchronous state machine over an exclusively-owned ledger
//! snapshot. Events are `Time` (scheduled wake) and `Commit`; both carry a
//! dry-run flag. Evaluation is split into a read-only planning pass and an
//! apply pass, so a dry-run can never touch the snapshot.
//!
//! # Dry-run / apply asymmetry
//!
//! In dry-run mode every failed condition is a hard failure (mempool
//! validation must reject the transaction). In apply mode most validation
//! failures become a deferred retry and the call reports success: the time
//! trigger is a scheduling mechanism, not the transaction that failed.
//! Protocol mismatches, evaluation failures, unsigned add-encumbrances,
//! unbalanced settlements, issuance against an exhausted hold, and
//! corrupted-state are hard in both modes.

use crate::{
    config::EngineConfig,
    contract::{AmountSpec, ContractFunction, DvpContract, Party, PayItem, StateSnapshot},
    emitter::{check_zero_sum, emit_effective_transfers, EffectiveTransfer, SummaryEntry},
    eval::{round_quantity, Evaluator},
    scheduler::{LifecycleEvent, LifecycleScheduler},
    Error,
};
use ledger_state::{Address, AssetId, Hasher, Quantity, Sha256Hasher, Timestamp};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Invocation outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Event accepted
    Pass,
    /// Event rejected
    Fail,
    /// Event accepted with a caveat
    Warning,
}

/// Result of one engine invocation
#[derive(Debug, Clone)]
pub struct EngineResult {
    /// Outcome status
    pub status: Status,

    /// Diagnostic message
    pub message: String,

    /// Elementary transfers emitted by a successful apply
    pub transfers: Vec<EffectiveTransfer>,
}

impl EngineResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: Status::Pass,
            message: message.into(),
            transfers: Vec::new(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            message: message.into(),
            transfers: Vec::new(),
        }
    }

    /// Did the invocation pass?
    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }
}

/// How a failed condition propagates, decided once per gate
enum CommitFailure {
    /// Fails in both modes
    Hard(Error),
    /// Fails in dry-run; schedules a retry and reports success in apply
    Deferred(Error),
    /// Funds shortfall: fails dry-run, retries in apply
    Funds(String),
}

type CommitStep<T> = std::result::Result<T, CommitFailure>;

/// Cached holding for one (address, asset) within a single evaluation
struct Holding {
    /// Prior receipts this settlement plus ledger balance
    total: Quantity,
    /// Holding minus total encumbered at evaluation time
    unencumbered: Quantity,
}

/// Planned encumbrance install, split by funding priority
struct EncumbranceInstall {
    reference: String,
    address: Address,
    asset: AssetId,
    beneficiaries: Vec<ledger_state::Interested>,
    administrators: Vec<ledger_state::Interested>,
    /// Portion funded by this settlement's own receipts
    high: Quantity,
    /// Remainder
    normal: Quantity,
}

/// Everything a successful commit will do to the snapshot
struct CommitPlan {
    summary: Vec<SummaryEntry>,
    installs: Vec<EncumbranceInstall>,
}

/// Per-invocation evaluation state. Plain maps keyed by structured
/// tuples; nothing survives the call.
struct EvalContext {
    summary: Vec<SummaryEntry>,
    receipts: BTreeMap<(Address, AssetId), Quantity>,
    holdings: BTreeMap<(Address, AssetId), Holding>,
    encumbrances: BTreeMap<(Address, AssetId, String), Option<Quantity>>,
    funds_available: bool,
    funds_detail: String,
}

impl EvalContext {
    fn new() -> Self {
        Self {
            summary: Vec::new(),
            receipts: BTreeMap::new(),
            holdings: BTreeMap::new(),
            encumbrances: BTreeMap::new(),
            funds_available: true,
            funds_detail: String::new(),
        }
    }

    fn mark_funds_unavailable(&mut self, detail: String) {
        if self.funds_available {
            self.funds_available = false;
            self.funds_detail = detail;
        }
    }

    fn add_receipt(&mut self, address: &Address, asset: &AssetId, amount: Quantity) {
        let key = (address.clone(), asset.clone());
        *self.receipts.entry(key.clone()).or_insert(Decimal::ZERO) += amount;
        // Keep any cached holding for the same (address, asset) in step
        if let Some(holding) = self.holdings.get_mut(&key) {
            holding.total += amount;
            holding.unencumbered += amount;
        }
    }
}

/// The settlement engine: configuration plus the injected record hasher
pub struct DvpEngine<H: Hasher = Sha256Hasher> {
    config: EngineConfig,
    hasher: H,
}

impl DvpEngine<Sha256Hasher> {
    /// Engine with the default SHA-256 hasher
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            hasher: Sha256Hasher,
        }
    }
}

impl<H: Hasher> DvpEngine<H> {
    /// Engine with an injected hasher
    pub fn with_hasher(config: EngineConfig, hasher: H) -> Self {
        Self { config, hasher }
    }

    /// Handle a scheduled `Time` event for a contract address.
    ///
    /// From a protocol perspective time events always pass in apply mode
    /// unless the state itself is broken; a wake for a contract that no
    /// longer exists is a harmless no-op.
    pub fn on_time(
        &self,
        state: &mut StateSnapshot,
        scheduler: &mut dyn LifecycleScheduler,
        contract_address: &Address,
        reference_time: Timestamp,
        dry_run: bool,
    ) -> EngineResult {
        let contract = match state.contracts.find(contract_address) {
            Some(c) => c.clone(),
            None => {
                // Ghost time event
                debug!(contract = %contract_address, "time event for unknown contract");
                return EngineResult::pass("Unknown contract address");
            }
        };

        if contract.completed {
            if reference_time > contract.expiry {
                if !dry_run {
                    self.delete_contract(state, scheduler, &contract, LifecycleEvent::Delete);
                }
                return EngineResult::pass("Contract removed");
            }
            if !dry_run {
                scheduler.schedule_wake(
                    contract_address,
                    contract.expiry + self.config.completed_grace,
                );
            }
            return EngineResult::pass("Contract completed");
        }

        if reference_time < contract.next_wake {
            if !dry_run {
                scheduler.schedule_wake(contract_address, contract.next_wake);
            }
            return EngineResult::pass("Contract not yet due");
        }

        if reference_time >= contract.expiry {
            if !dry_run {
                self.expire_contract(state, scheduler, &contract);
            }
            return EngineResult::pass("Contract expired");
        }

        // Due but not expired: hold the wake at expiry and evaluate a
        // commit now
        if !dry_run {
            if let Some(record) = state.contracts.find_for_update(contract_address) {
                record.next_wake = record.expiry;
            }
        }
        self.on_commit(state, scheduler, contract_address, reference_time, dry_run)
    }

    /// Handle a `Commit` event for a contract address
    pub fn on_commit(
        &self,
        state: &mut StateSnapshot,
        scheduler: &mut dyn LifecycleScheduler,
        contract_address: &Address,
        now: Timestamp,
        dry_run: bool,
    ) -> EngineResult {
        let contract = match state.contracts.find(contract_address) {
            Some(c) => c.clone(),
            None => {
                let err =
                    Error::ProtocolMismatch(format!("no contract at {}", contract_address));
                return EngineResult::fail(err.to_string());
            }
        };

        if contract.function != ContractFunction::DvpUk {
            let err = Error::ProtocolMismatch(format!(
                "contract {} has function {}",
                contract_address,
                contract.function.as_str()
            ));
            return EngineResult::fail(err.to_string());
        }

        if contract.completed {
            return EngineResult::pass("Already completed");
        }

        if now < contract.start_date {
            return if dry_run {
                EngineResult::fail("Not yet started")
            } else {
                EngineResult::pass("Not yet started")
            };
        }

        match self.evaluate_commit(state, &contract, now) {
            Ok(plan) => {
                if dry_run {
                    return EngineResult::pass("Settlement would complete");
                }
                self.apply_commit(state, scheduler, &contract, plan, now)
            }
            Err(CommitFailure::Hard(err)) => {
                warn!(contract = %contract_address, %err, "hard commit failure");
                EngineResult::fail(err.to_string())
            }
            Err(CommitFailure::Deferred(err)) => {
                if dry_run {
                    return EngineResult::fail(err.to_string());
                }
                debug!(contract = %contract_address, %err, "commit deferred");
                self.schedule_retry(state, scheduler, contract_address, now, err.to_string());
                EngineResult::pass(err.to_string())
            }
            Err(CommitFailure::Funds(detail)) => {
                let message = Error::FundsUnavailable(detail.clone()).to_string();
                if dry_run {
                    return EngineResult::fail(message);
                }
                debug!(contract = %contract_address, detail, "funds unavailable, retrying");
                self.schedule_retry(state, scheduler, contract_address, now, message.clone());
                EngineResult::pass(message)
            }
        }
    }

    // ---- planning (read-only) -------------------------------------------

    fn evaluate_commit(
        &self,
        state: &StateSnapshot,
        contract: &DvpContract,
        now: Timestamp,
    ) -> CommitStep<CommitPlan> {
        // Gate checks, in order
        for auth in &contract.authorisations {
            if !auth.signed || auth.refused {
                return Err(CommitFailure::Deferred(Error::Validation(format!(
                    "Authorisation {} missing or refused",
                    auth.id
                ))));
            }
        }
        for add in &contract.add_encumbrances {
            if !add.signed && !add.beneficiaries.is_empty() {
                return Err(CommitFailure::Hard(Error::Validation(format!(
                    "Encumbrance {} has beneficiaries but no signature",
                    add.reference
                ))));
            }
        }

        // All parameter signatures are verified before any formula is
        // touched: a missing signature defers, a bad formula is hard, and
        // the signature outcome must win regardless of evaluation order
        for (key, param) in contract.ordered_parameters() {
            if !param.calculation_only && !param.signed {
                return Err(CommitFailure::Deferred(Error::Validation(format!(
                    "Parameter {} is not signed",
                    key
                ))));
            }
        }

        // Parameter resolution in deterministic order
        let mut evaluator = Evaluator::new();
        for (key, param) in contract.ordered_parameters() {
            let value = match &param.value {
                AmountSpec::Literal(q) => *q,
                AmountSpec::Formula(f) => {
                    evaluator
                        .evaluate(f)
                        .map_err(|source| {
                            CommitFailure::Hard(Error::Evaluation {
                                key: key.clone(),
                                address: contract.address.to_string(),
                                source,
                            })
                        })?
                }
            };
            evaluator.bind(key, value);
        }

        // Per-party pass, record order: receipts first, then payments
        let mut ctx = EvalContext::new();
        for party in &contract.parties {
            self.check_party_signature(contract, party)?;
            for item in &party.receive {
                self.process_receipt(state, contract, &mut ctx, &evaluator, party, item)?;
            }
            for item in &party.pay {
                if !ctx.funds_available {
                    break;
                }
                self.process_payment(state, contract, &mut ctx, &evaluator, party, item, now)?;
            }
        }

        // Add-encumbrance amounts, signatures, and priority split
        let installs = self.plan_installs(contract, &mut ctx, &evaluator)?;

        if !ctx.funds_available {
            return Err(CommitFailure::Funds(ctx.funds_detail));
        }

        check_zero_sum(&ctx.summary).map_err(CommitFailure::Hard)?;

        let mut summary = ctx.summary;
        summary.sort_by(|a, b| {
            (&a.asset, &a.address, a.amount, &a.encumbrance_name).cmp(&(
                &b.asset,
                &b.address,
                b.amount,
                &b.encumbrance_name,
            ))
        });

        Ok(CommitPlan { summary, installs })
    }

    fn check_party_signature(&self, contract: &DvpContract, party: &Party) -> CommitStep<()> {
        if party.signed {
            return Ok(());
        }
        if party.must_sign {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Party {} must sign and has not",
                party.identifier
            ))));
        }
        if !party.pay.is_empty() && !contract.uses_encumbrances() {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Party {} has unsigned payments and no encumbrance cover",
                party.identifier
            ))));
        }
        Ok(())
    }

    fn check_asset_unlocked(&self, state: &StateSnapshot, asset: &AssetId) -> CommitStep<()> {
        if state.locks.is_locked(&asset.namespace) || state.locks.is_locked(&asset.full_id()) {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Asset {} is locked",
                asset
            ))));
        }
        Ok(())
    }

    fn resolve_amount(
        &self,
        contract: &DvpContract,
        evaluator: &Evaluator,
        value: &AmountSpec,
        label: &str,
    ) -> CommitStep<Quantity> {
        match value {
            AmountSpec::Literal(q) => Ok(*q),
            AmountSpec::Formula(f) => evaluator
                .evaluate(f)
                .map(round_quantity)
                .map_err(|source| {
                    CommitFailure::Hard(Error::Evaluation {
                        key: label.to_string(),
                        address: contract.address.to_string(),
                        source,
                    })
                }),
        }
    }

    fn process_receipt(
        &self,
        state: &StateSnapshot,
        contract: &DvpContract,
        ctx: &mut EvalContext,
        evaluator: &Evaluator,
        party: &Party,
        item: &crate::contract::ReceiveItem,
    ) -> CommitStep<()> {
        self.check_asset_unlocked(state, &item.asset)?;
        let label = format!("receive:{}:{}", party.identifier, item.asset);
        let amount = self.resolve_amount(contract, evaluator, &item.amount, &label)?;
        if amount < Decimal::ZERO {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Negative receipt amount for party {}",
                party.identifier
            ))));
        }
        if amount > Decimal::ZERO && item.address.is_empty() {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Receipt with no address for party {}",
                party.identifier
            ))));
        }
        ctx.add_receipt(&item.address, &item.asset, amount);
        ctx.summary.push(SummaryEntry {
            address: item.address.clone(),
            asset: item.asset.clone(),
            amount,
            encumbrance_name: None,
            encumbrance_consumed: Decimal::ZERO,
            issuance: false,
        });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_payment(
        &self,
        state: &StateSnapshot,
        contract: &DvpContract,
        ctx: &mut EvalContext,
        evaluator: &Evaluator,
        party: &Party,
        item: &PayItem,
        now: Timestamp,
    ) -> CommitStep<()> {
        if item.address.is_empty() {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Payment with no address for party {}",
                party.identifier
            ))));
        }
        self.check_asset_unlocked(state, &item.asset)?;
        let label = format!("pay:{}:{}", party.identifier, item.asset);
        let amount = self.resolve_amount(contract, evaluator, &item.amount, &label)?;
        if amount < Decimal::ZERO {
            return Err(CommitFailure::Deferred(Error::Validation(format!(
                "Negative payment amount for party {}",
                party.identifier
            ))));
        }
        if amount.is_zero() {
            return Ok(());
        }

        let signed = party.payment_signed(item);
        let name = contract.encumbrance_name_for(item);

        // Resolve the applicable encumbrance copy, cached per
        // (address, asset, name) for the invocation
        let enc_remaining = match &name {
            None => None,
            Some(name) => {
                let holding_total = self
                    .holding(state, ctx, &item.address, &item.asset, now)
                    .total;
                let key = (item.address.clone(), item.asset.clone(), name.clone());
                *ctx.encumbrances.entry(key).or_insert_with(|| {
                    let asset_enc = state
                        .encumbrances
                        .find(&item.address)
                        .and_then(|r| r.asset_encumbrance(&item.asset))?;
                    let aggregate = if item.issuance {
                        asset_enc.aggregate_by_reference(name, &contract.issuing_address, now)
                    } else {
                        asset_enc.aggregate_available_by_reference(
                            name,
                            &contract.issuing_address,
                            now,
                            holding_total,
                        )
                    };
                    aggregate.map(|e| e.amount)
                })
            }
        };

        match enc_remaining {
            Some(remaining) if remaining >= amount => {
                // Funded by the hold; consume from the cached copy
                let name = name.as_ref().cloned();
                if let Some(n) = &name {
                    let key = (item.address.clone(), item.asset.clone(), n.clone());
                    ctx.encumbrances.insert(key, Some(remaining - amount));
                }
                if !item.issuance {
                    // Issuance mints; only transfers draw the holding down
                    let holding = self.holding(state, ctx, &item.address, &item.asset, now);
                    holding.total -= amount;
                }
                ctx.summary.push(SummaryEntry {
                    address: item.address.clone(),
                    asset: item.asset.clone(),
                    amount: -amount,
                    encumbrance_name: name,
                    encumbrance_consumed: amount,
                    issuance: item.issuance,
                });
                Ok(())
            }
            Some(_) if item.issuance => {
                // Exhausted holds cap issuance; given behavior, always hard
                Err(CommitFailure::Hard(Error::Validation(format!(
                    "Issuance payment for party {} exceeds its encumbrance",
                    party.identifier
                ))))
            }
            Some(_) if signed => self.pay_from_unencumbered(state, ctx, item, amount, now),
            Some(_) => {
                ctx.mark_funds_unavailable(format!("{} {}", item.address, item.asset));
                Ok(())
            }
            None if !signed => Err(CommitFailure::Hard(Error::Validation(format!(
                "Payment for party {} has neither signature nor encumbrance",
                party.identifier
            )))),
            None if item.issuance => {
                ctx.summary.push(SummaryEntry {
                    address: item.address.clone(),
                    asset: item.asset.clone(),
                    amount: -amount,
                    encumbrance_name: None,
                    encumbrance_consumed: Decimal::ZERO,
                    issuance: true,
                });
                Ok(())
            }
            None => self.pay_from_unencumbered(state, ctx, item, amount, now),
        }
    }

    /// Signed, non-issuance payment funded from the unencumbered holding
    fn pay_from_unencumbered(
        &self,
        state: &StateSnapshot,
        ctx: &mut EvalContext,
        item: &PayItem,
        amount: Quantity,
        now: Timestamp,
    ) -> CommitStep<()> {
        let holding = self.holding(state, ctx, &item.address, &item.asset, now);
        if amount > holding.unencumbered {
            ctx.mark_funds_unavailable(format!("{} {}", item.address, item.asset));
            return Ok(());
        }
        holding.total -= amount;
        holding.unencumbered -= amount;
        ctx.summary.push(SummaryEntry {
            address: item.address.clone(),
            asset: item.asset.clone(),
            amount: -amount,
            encumbrance_name: None,
            encumbrance_consumed: Decimal::ZERO,
            issuance: false,
        });
        Ok(())
    }

    /// Cached holding for (address, asset): prior receipts this settlement
    /// plus ledger balance; unencumbered = holding minus total encumbered
    fn holding<'c>(
        &self,
        state: &StateSnapshot,
        ctx: &'c mut EvalContext,
        address: &Address,
        asset: &AssetId,
        now: Timestamp,
    ) -> &'c mut Holding {
        let key = (address.clone(), asset.clone());
        let receipts = ctx.receipts.get(&key).copied().unwrap_or(Decimal::ZERO);
        ctx.holdings.entry(key).or_insert_with(|| {
            let balance = state.balances.asset_balance(address, asset);
            let encumbered = state.encumbrances.total_encumbered(address, asset, now);
            let total = receipts + balance;
            Holding {
                total,
                unencumbered: total - encumbered,
            }
        })
    }

    fn plan_installs(
        &self,
        contract: &DvpContract,
        ctx: &mut EvalContext,
        evaluator: &Evaluator,
    ) -> CommitStep<Vec<EncumbranceInstall>> {
        let mut installs = Vec::new();
        for add in &contract.add_encumbrances {
            let label = format!("encumber:{}", add.reference);
            let amount = self.resolve_amount(contract, evaluator, &add.amount, &label)?;
            if amount < Decimal::ZERO {
                return Err(CommitFailure::Deferred(Error::Validation(format!(
                    "Negative encumbrance amount for {}",
                    add.reference
                ))));
            }

            let key = (add.address.clone(), add.asset.clone());
            let pool = ctx.receipts.entry(key).or_insert(Decimal::ZERO);

            let (high, normal) = if add.signed {
                let high = amount.min(*pool);
                (high, amount - high)
            } else {
                // Lock pattern: only valid when this settlement's own
                // receipts fully cover the hold
                if *pool < amount {
                    return Err(CommitFailure::Hard(Error::Validation(format!(
                        "Unsigned encumbrance {} not covered by settlement receipts",
                        add.reference
                    ))));
                }
                (amount, Decimal::ZERO)
            };
            *pool -= high;

            installs.push(EncumbranceInstall {
                reference: add.reference.clone(),
                address: add.address.clone(),
                asset: add.asset.clone(),
                beneficiaries: add.beneficiaries.clone(),
                administrators: add.administrators.clone(),
                high,
                normal,
            });
        }
        Ok(installs)
    }

    // ---- apply (mutating) -----------------------------------------------

    fn apply_commit(
        &self,
        state: &mut StateSnapshot,
        scheduler: &mut dyn LifecycleScheduler,
        contract: &DvpContract,
        plan: CommitPlan,
        now: Timestamp,
    ) -> EngineResult {
        // Balance deltas, in the summary's canonical order. Zero entries
        // carry no delta and must not mint an account record (a zero
        // receipt may legitimately have an empty address)
        for entry in &plan.summary {
            if entry.amount.is_zero() {
                continue;
            }
            let account = state.balances.create_if_absent(&entry.address);
            let balance = account.asset_balance(&entry.asset);
            account.set_asset_balance(entry.asset.clone(), balance + entry.amount);
        }

        // Consume the holds that funded payments, pruning drained records
        for entry in &plan.summary {
            if entry.encumbrance_consumed <= Decimal::ZERO {
                continue;
            }
            let name = match &entry.encumbrance_name {
                Some(n) => n.clone(),
                None => continue,
            };
            if let Some(record) = state.encumbrances.find_for_update(&entry.address) {
                if let Some(asset_enc) = record.asset_encumbrance_mut(&entry.asset) {
                    asset_enc.consume(&name, entry.encumbrance_consumed, now);
                }
            }
            state.encumbrances.prune(&entry.address);
        }

        // A contract-specific hold is spent: strip the residue from every
        // payer address
        if contract.has_contract_specific_encumbrance() {
            self.strip_contract_encumbrances(state, contract);
        }

        // Install requested holds, receipts-funded portion first
        for install in &plan.installs {
            for (portion, high_priority) in
                [(install.high, true), (install.normal, false)]
            {
                if portion <= Decimal::ZERO {
                    continue;
                }
                let entry = ledger_state::EncumbranceEntry {
                    reference: install.reference.clone(),
                    amount: portion,
                    beneficiaries: install.beneficiaries.clone(),
                    administrators: install.administrators.clone(),
                    expiry: None,
                    priority: ledger_state::Priority::Normal,
                };
                let record = state.encumbrances.find_or_create(&install.address);
                let asset_enc = record.asset_encumbrance_or_default(&install.asset);
                if !asset_enc.set_encumbrance_entry(now, entry, true, high_priority) {
                    state.corrupted = true;
                    let err = Error::CorruptedState(format!(
                        "Encumbrance accumulation failed for {} on {}",
                        install.reference, install.address
                    ));
                    warn!(%err, "snapshot flagged corrupted");
                    return EngineResult::fail(err.to_string());
                }
            }
        }

        let transfers = emit_effective_transfers(&plan.summary, &self.hasher);

        // Contract completes; the wake moves to the cleanup poll at expiry
        let related = contract.related_addresses();
        if let Some(record) = state.contracts.find_for_update(&contract.address) {
            scheduler.cancel_wake(&record.address, record.next_wake);
            record.completed = true;
            record.status_message = "Complete".to_string();
            record.next_wake = record.expiry;
            scheduler.schedule_wake(&contract.address, record.expiry);
        }
        scheduler.notify(LifecycleEvent::Complete, &contract.address, &related);

        info!(
            contract = %contract.address,
            transfers = transfers.len(),
            "settlement complete"
        );

        EngineResult {
            status: Status::Pass,
            message: "Settlement complete".to_string(),
            transfers,
        }
    }

    fn schedule_retry(
        &self,
        state: &mut StateSnapshot,
        scheduler: &mut dyn LifecycleScheduler,
        contract_address: &Address,
        now: Timestamp,
        message: String,
    ) {
        let at = now + self.config.retry_interval;
        if let Some(record) = state.contracts.find_for_update(contract_address) {
            record.next_wake = at;
            record.status_message = message;
        }
        scheduler.schedule_wake(contract_address, at);
    }

    /// Drop every hold named after the contract from its payer addresses
    fn strip_contract_encumbrances(&self, state: &mut StateSnapshot, contract: &DvpContract) {
        let reference = contract.address.as_str().to_string();
        for party in &contract.parties {
            for item in &party.pay {
                if item.address.is_empty() {
                    continue;
                }
                if let Some(record) = state.encumbrances.find_for_update(&item.address) {
                    if let Some(asset_enc) = record.asset_encumbrance_mut(&item.asset) {
                        asset_enc.remove_encumbrance(&reference);
                    }
                }
                state.encumbrances.prune(&item.address);
            }
        }
    }

    fn expire_contract(
        &self,
        state: &mut StateSnapshot,
        scheduler: &mut dyn LifecycleScheduler,
        contract: &DvpContract,
    ) {
        info!(contract = %contract.address, "contract expired");
        scheduler.notify(
            LifecycleEvent::Expire,
            &contract.address,
            &contract.related_addresses(),
        );
        self.delete_contract(state, scheduler, contract, LifecycleEvent::Delete);
    }

    fn delete_contract(
        &self,
        state: &mut StateSnapshot,
        scheduler: &mut dyn LifecycleScheduler,
        contract: &DvpContract,
        event: LifecycleEvent,
    ) {
        if contract.has_contract_specific_encumbrance() {
            self.strip_contract_encumbrances(state, contract);
        }
        scheduler.cancel_wake(&contract.address, contract.next_wake);
        state.contracts.delete(&contract.address);
        scheduler.notify(event, &contract.address, &contract.related_addresses());
    }
}
