//! End-to-end settlement scenarios against an in-memory snapshot

use dvp_settlement::{
    AddEncumbrance, AmountSpec, ContractEncumbrance, DvpContract, DvpEngine, EngineConfig,
    LifecycleEvent, Parameter, Party, PayItem, ReceiveItem, RecordingScheduler, StateSnapshot,
    Status, TransferKind,
};
use ledger_state::{Address, AssetId, EncumbranceEntry, Interested, Priority};
use rust_decimal::Decimal;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gbp() -> AssetId {
    AssetId::new("IssuerGB", "GBP")
}

fn bond() -> AssetId {
    AssetId::new("IssuerGB", "GILT2030")
}

fn addr(id: &str) -> Address {
    Address::new(id)
}

fn engine() -> DvpEngine {
    DvpEngine::new(EngineConfig::default())
}

fn party(id: &str, signed: bool) -> Party {
    Party {
        identifier: id.to_string(),
        sig_address: addr(id),
        public_key: format!("pk-{}", id),
        signed,
        must_sign: false,
        pay: Vec::new(),
        receive: Vec::new(),
    }
}

fn pay(id: &str, asset: AssetId, amount: i64) -> PayItem {
    PayItem {
        address: addr(id),
        asset,
        amount: AmountSpec::from(amount),
        issuance: false,
        encumbrance_name: None,
        signed: false,
    }
}

fn receive(id: &str, asset: AssetId, amount: i64) -> ReceiveItem {
    ReceiveItem {
        address: addr(id),
        asset,
        amount: AmountSpec::from(amount),
    }
}

fn set_balance(state: &mut StateSnapshot, id: &str, asset: AssetId, amount: i64) {
    state
        .balances
        .create_if_absent(&addr(id))
        .set_asset_balance(asset, Decimal::from(amount));
    state.balances.clear_dirty();
}

fn balance(state: &StateSnapshot, id: &str, asset: &AssetId) -> Decimal {
    state.balances.asset_balance(&addr(id), asset)
}

/// Cash against bonds between two signed parties, amounts via formula
/// parameters, applied atomically.
#[test]
fn two_party_cash_versus_bond_settles_atomically() {
    init_tracing();
    let mut contract = DvpContract::new(addr("DvpA"), addr("Seller"), 0, 1_000);
    contract.parameters.insert(
        "price".to_string(),
        Parameter {
            value: AmountSpec::from(101),
            calculated_index: 0,
            calculation_only: true,
            signed: false,
        },
    );
    contract.parameters.insert(
        "units".to_string(),
        Parameter {
            value: AmountSpec::from(10),
            calculated_index: 0,
            calculation_only: true,
            signed: false,
        },
    );

    let mut buyer = party("Buyer", true);
    buyer.pay.push(PayItem {
        amount: AmountSpec::Formula("price * units".to_string()),
        ..pay("Buyer", gbp(), 0)
    });
    buyer.receive.push(ReceiveItem {
        amount: AmountSpec::Formula("units".to_string()),
        ..receive("Buyer", bond(), 0)
    });

    let mut seller = party("Seller", true);
    seller.pay.push(PayItem {
        amount: AmountSpec::Formula("units".to_string()),
        ..pay("Seller", bond(), 0)
    });
    seller.receive.push(ReceiveItem {
        amount: AmountSpec::Formula("price * units".to_string()),
        ..receive("Seller", gbp(), 0)
    });

    contract.parties.push(buyer);
    contract.parties.push(seller);

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 2_000);
    set_balance(&mut state, "Seller", bond(), 10);
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let result = engine().on_commit(&mut state, &mut sched, &addr("DvpA"), 100, false);
    assert_eq!(result.status, Status::Pass, "{}", result.message);

    assert_eq!(balance(&state, "Buyer", &gbp()), Decimal::from(990));
    assert_eq!(balance(&state, "Buyer", &bond()), Decimal::from(10));
    assert_eq!(balance(&state, "Seller", &gbp()), Decimal::from(1_010));
    assert_eq!(balance(&state, "Seller", &bond()), Decimal::ZERO);

    // Two assets, one transfer each, zero-sum by construction
    assert_eq!(result.transfers.len(), 2);
    for transfer in &result.transfers {
        assert_eq!(transfer.kind, TransferKind::Transfer);
        assert!(transfer.amount > Decimal::ZERO);
    }

    let contract = state.contracts.find(&addr("DvpA")).unwrap();
    assert!(contract.completed);
    assert_eq!(contract.status_message, "Complete");
    assert_eq!(
        sched.events_for(&addr("DvpA")),
        vec![LifecycleEvent::Complete]
    );
}

/// An encumbrance-funded payment short of cover reports "Insufficient
/// Asset" and retries; once the hold grows it settles and the hold is
/// consumed.
#[test]
fn encumbrance_shortfall_retries_until_funded() {
    init_tracing();
    let mut contract = DvpContract::new(addr("DvpB"), addr("Broker"), 0, 1_000);
    contract.encumbrance = Some(ContractEncumbrance {
        use_contract_address: false,
        default_name: Some("margin-call".to_string()),
    });

    let mut payer = party("ClientX", false);
    payer.pay.push(pay("ClientX", gbp(), 50));
    let mut broker = party("Broker", true);
    broker.receive.push(receive("Broker", gbp(), 50));
    contract.parties.push(payer);
    contract.parties.push(broker);

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "ClientX", gbp(), 30);
    let record = state.encumbrances.find_or_create(&addr("ClientX"));
    let holds = record.asset_encumbrance_or_default(&gbp());
    assert!(holds.set_encumbrance_entry(
        0,
        EncumbranceEntry {
            reference: "margin-call".to_string(),
            amount: Decimal::from(30),
            beneficiaries: vec![Interested::forever(addr("Broker"))],
            administrators: vec![],
            expiry: None,
            priority: Priority::Normal,
        },
        false,
        false,
    ));
    state.encumbrances.clear_dirty();
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let eng = engine();

    // Dry-run is a hard reject
    let checked = eng.on_commit(&mut state, &mut sched, &addr("DvpB"), 100, true);
    assert_eq!(checked.status, Status::Fail);
    assert!(checked.message.starts_with("Insufficient Asset"));

    // Apply defers: pass, retry wake scheduled, nothing moved
    let applied = eng.on_commit(&mut state, &mut sched, &addr("DvpB"), 100, false);
    assert_eq!(applied.status, Status::Pass);
    assert!(applied.message.starts_with("Insufficient Asset"));
    assert!(sched.has_wake(&addr("DvpB"), 105));
    assert_eq!(balance(&state, "ClientX", &gbp()), Decimal::from(30));
    assert!(!state.contracts.find(&addr("DvpB")).unwrap().completed);

    // Top up the balance and the hold, then the retry wake settles
    set_balance(&mut state, "ClientX", gbp(), 50);
    let record = state.encumbrances.find_or_create(&addr("ClientX"));
    let holds = record.asset_encumbrance_or_default(&gbp());
    assert!(holds.set_encumbrance_entry(
        0,
        EncumbranceEntry {
            reference: "margin-call".to_string(),
            amount: Decimal::from(20),
            beneficiaries: vec![Interested::forever(addr("Broker"))],
            administrators: vec![],
            expiry: None,
            priority: Priority::Normal,
        },
        true,
        false,
    ));
    state.encumbrances.clear_dirty();

    let retried = eng.on_time(&mut state, &mut sched, &addr("DvpB"), 105, false);
    assert_eq!(retried.status, Status::Pass, "{}", retried.message);

    assert_eq!(balance(&state, "ClientX", &gbp()), Decimal::ZERO);
    assert_eq!(balance(&state, "Broker", &gbp()), Decimal::from(50));
    // Hold fully consumed and the drained record pruned
    assert!(state.encumbrances.find(&addr("ClientX")).is_none());
    assert!(state.contracts.find(&addr("DvpB")).unwrap().completed);
}

/// An unsigned add-encumbrance naming beneficiaries is rejected outright
/// in both modes.
#[test]
fn unsigned_encumbrance_with_beneficiaries_is_rejected() {
    let mut contract = DvpContract::new(addr("DvpC"), addr("Seller"), 0, 1_000);
    let mut payer = party("Buyer", true);
    payer.pay.push(pay("Buyer", gbp(), 10));
    let mut seller = party("Seller", true);
    seller.receive.push(receive("Seller", gbp(), 10));
    contract.parties.push(payer);
    contract.parties.push(seller);
    contract.add_encumbrances.push(AddEncumbrance {
        reference: "collateral".to_string(),
        address: addr("Seller"),
        asset: gbp(),
        amount: AmountSpec::from(10),
        beneficiaries: vec![Interested::forever(addr("Buyer"))],
        administrators: vec![],
        signed: false,
    });

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 100);
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    for dry_run in [true, false] {
        let result = engine().on_commit(&mut state, &mut sched, &addr("DvpC"), 100, dry_run);
        assert_eq!(result.status, Status::Fail);
        assert!(result.message.contains("beneficiaries"));
    }
    // Nothing moved, no retry scheduled
    assert_eq!(balance(&state, "Buyer", &gbp()), Decimal::from(100));
    assert!(sched.wakes.is_empty());
}

/// Expiry of a pending contract with contract-specific holds removes the
/// contract and strips its named holds from payer addresses.
#[test]
fn expiry_strips_contract_named_holds() {
    let mut contract = DvpContract::new(addr("DvpD"), addr("Seller"), 0, 500);
    contract.encumbrance = Some(ContractEncumbrance {
        use_contract_address: true,
        default_name: None,
    });
    let mut cash_payer = party("Buyer", false);
    cash_payer.pay.push(pay("Buyer", gbp(), 40));
    let mut bond_payer = party("Dealer", false);
    bond_payer.pay.push(pay("Dealer", bond(), 4));
    let mut seller = party("Seller", true);
    seller.receive.push(receive("Seller", gbp(), 40));
    seller.receive.push(receive("Seller", bond(), 4));
    contract.parties.push(cash_payer);
    contract.parties.push(bond_payer);
    contract.parties.push(seller);
    // Authorisation never arrives, so the contract can only expire
    contract.authorisations.push(dvp_settlement::Authorisation {
        id: "custodian".to_string(),
        signed: false,
        refused: false,
    });

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 40);
    set_balance(&mut state, "Dealer", bond(), 4);
    for (payer, asset, amount) in [("Buyer", gbp(), 40), ("Dealer", bond(), 4)] {
        let record = state.encumbrances.find_or_create(&addr(payer));
        let holds = record.asset_encumbrance_or_default(&asset);
        assert!(holds.set_encumbrance_entry(
            0,
            EncumbranceEntry {
                reference: "DvpD".to_string(),
                amount: Decimal::from(amount),
                beneficiaries: vec![Interested::forever(addr("Seller"))],
                administrators: vec![],
                expiry: None,
                priority: Priority::Normal,
            },
            false,
            false,
        ));
    }
    state.encumbrances.clear_dirty();
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let result = engine().on_time(&mut state, &mut sched, &addr("DvpD"), 600, false);
    assert_eq!(result.status, Status::Pass);

    assert!(state.contracts.find(&addr("DvpD")).is_none());
    // Both payers' contract-named holds are stripped on expiry
    assert!(state.encumbrances.find(&addr("Buyer")).is_none());
    assert!(state.encumbrances.find(&addr("Dealer")).is_none());
    assert_eq!(balance(&state, "Buyer", &gbp()), Decimal::from(40));
    assert_eq!(balance(&state, "Dealer", &bond()), Decimal::from(4));
    assert_eq!(
        sched.events_for(&addr("DvpD")),
        vec![LifecycleEvent::Expire, LifecycleEvent::Delete]
    );
}

/// Three payers funding one receiver produce three effective transfers
/// through the waterfall.
#[test]
fn three_payers_one_receiver_waterfall() {
    let mut contract = DvpContract::new(addr("DvpE"), addr("Fund"), 0, 1_000);
    for (id, amount) in [("InvA", 10), ("InvB", 20), ("InvC", 30)] {
        let mut p = party(id, true);
        p.pay.push(pay(id, gbp(), amount));
        contract.parties.push(p);
    }
    let mut fund = party("Fund", true);
    fund.receive.push(receive("Fund", gbp(), 60));
    contract.parties.push(fund);

    let mut state = StateSnapshot::new();
    for id in ["InvA", "InvB", "InvC"] {
        set_balance(&mut state, id, gbp(), 100);
    }
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let result = engine().on_commit(&mut state, &mut sched, &addr("DvpE"), 100, false);
    assert_eq!(result.status, Status::Pass, "{}", result.message);

    assert_eq!(result.transfers.len(), 3);
    let total: Decimal = result.transfers.iter().map(|t| t.amount).sum();
    assert_eq!(total, Decimal::from(60));
    for transfer in &result.transfers {
        assert_eq!(transfer.to, addr("Fund"));
    }
    // Digests are per-record and distinct
    let mut digests: Vec<_> = result.transfers.iter().map(|t| t.digest).collect();
    digests.dedup();
    assert_eq!(digests.len(), 3);

    assert_eq!(balance(&state, "Fund", &gbp()), Decimal::from(60));
}

/// Issuance legs are not capped by balance; the issuer's balance goes
/// negative as a liability record.
#[test]
fn issuance_payment_mints_against_the_issuer() {
    let mut contract = DvpContract::new(addr("DvpIssue"), addr("IssuerGB"), 0, 1_000);
    let mut issuer = party("IssuerGB", true);
    issuer.pay.push(PayItem {
        issuance: true,
        ..pay("IssuerGB", gbp(), 500)
    });
    let mut holder = party("Holder", true);
    holder.receive.push(receive("Holder", gbp(), 500));
    contract.parties.push(issuer);
    contract.parties.push(holder);

    let mut state = StateSnapshot::new();
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let result = engine().on_commit(&mut state, &mut sched, &addr("DvpIssue"), 100, false);
    assert_eq!(result.status, Status::Pass, "{}", result.message);

    assert_eq!(balance(&state, "IssuerGB", &gbp()), Decimal::from(-500));
    assert_eq!(balance(&state, "Holder", &gbp()), Decimal::from(500));
    assert_eq!(result.transfers.len(), 1);
    assert_eq!(result.transfers[0].kind, TransferKind::Issuance);
}

/// A signed add-encumbrance splits into a receipts-funded high-priority
/// portion and a normal-priority remainder.
#[test]
fn installed_hold_splits_by_receipt_funding() {
    let mut contract = DvpContract::new(addr("DvpLock"), addr("Seller"), 0, 1_000);
    let mut payer = party("Buyer", true);
    payer.pay.push(pay("Buyer", gbp(), 70));
    let mut seller = party("Seller", true);
    seller.receive.push(receive("Seller", gbp(), 70));
    contract.parties.push(payer);
    contract.parties.push(seller);
    // Hold 100 on the seller: 70 covered by this settlement's receipt
    contract.add_encumbrances.push(AddEncumbrance {
        reference: "post-trade-lock".to_string(),
        address: addr("Seller"),
        asset: gbp(),
        amount: AmountSpec::from(100),
        beneficiaries: vec![Interested::forever(addr("Custodian"))],
        administrators: vec![Interested::forever(addr("Custodian"))],
        signed: true,
    });

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 70);
    set_balance(&mut state, "Seller", gbp(), 40);
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let result = engine().on_commit(&mut state, &mut sched, &addr("DvpLock"), 100, false);
    assert_eq!(result.status, Status::Pass, "{}", result.message);

    let record = state.encumbrances.find(&addr("Seller")).unwrap();
    let holds = record.asset_encumbrance(&gbp()).unwrap();
    let entries = holds.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].priority, Priority::High);
    assert_eq!(entries[0].amount, Decimal::from(70));
    assert_eq!(entries[1].priority, Priority::Normal);
    assert_eq!(entries[1].amount, Decimal::from(30));
    assert_eq!(holds.total_encumbered(100), Decimal::from(100));
}

/// Dry-run evaluation of a settleable contract reports success and
/// leaves snapshot and scheduler untouched.
#[test]
fn dry_run_is_free_of_side_effects() {
    let mut contract = DvpContract::new(addr("DvpDry"), addr("Seller"), 0, 1_000);
    let mut payer = party("Buyer", true);
    payer.pay.push(pay("Buyer", gbp(), 25));
    let mut seller = party("Seller", true);
    seller.receive.push(receive("Seller", gbp(), 25));
    contract.parties.push(payer);
    contract.parties.push(seller);

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 25);
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let before = serde_json::to_string(&state).unwrap();
    let mut sched = RecordingScheduler::new();
    let result = engine().on_commit(&mut state, &mut sched, &addr("DvpDry"), 100, true);
    assert_eq!(result.status, Status::Pass);
    assert!(result.transfers.is_empty());

    assert_eq!(serde_json::to_string(&state).unwrap(), before);
    assert!(sched.wakes.is_empty());
    assert!(sched.notifications.is_empty());
}

/// Parameters resolve by calculated_index then key, so a formula may use
/// any parameter with a lower index regardless of key order.
#[test]
fn parameter_resolution_order_is_deterministic() {
    let mut contract = DvpContract::new(addr("DvpParam"), addr("Seller"), 0, 1_000);
    contract.parameters.insert(
        "zbase".to_string(),
        Parameter {
            value: AmountSpec::from(7),
            calculated_index: 0,
            calculation_only: true,
            signed: false,
        },
    );
    contract.parameters.insert(
        "amount".to_string(),
        Parameter {
            value: AmountSpec::Formula("zbase * 3".to_string()),
            calculated_index: 1,
            calculation_only: true,
            signed: false,
        },
    );

    let mut payer = party("Buyer", true);
    payer.pay.push(PayItem {
        amount: AmountSpec::Formula("amount".to_string()),
        ..pay("Buyer", gbp(), 0)
    });
    let mut seller = party("Seller", true);
    seller.receive.push(ReceiveItem {
        amount: AmountSpec::Formula("amount".to_string()),
        ..receive("Seller", gbp(), 0)
    });
    contract.parties.push(payer);
    contract.parties.push(seller);

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 100);
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let result = engine().on_commit(&mut state, &mut sched, &addr("DvpParam"), 100, false);
    assert_eq!(result.status, Status::Pass, "{}", result.message);
    assert_eq!(balance(&state, "Seller", &gbp()), Decimal::from(21));
}

/// Completed contracts linger until expiry, then a time event removes
/// them.
#[test]
fn completed_contract_cleanup_cycle() {
    let mut contract = DvpContract::new(addr("DvpDone"), addr("Seller"), 0, 500);
    let mut payer = party("Buyer", true);
    payer.pay.push(pay("Buyer", gbp(), 10));
    let mut seller = party("Seller", true);
    seller.receive.push(receive("Seller", gbp(), 10));
    contract.parties.push(payer);
    contract.parties.push(seller);

    let mut state = StateSnapshot::new();
    set_balance(&mut state, "Buyer", gbp(), 10);
    state.contracts.add(contract);
    state.contracts.clear_dirty();

    let mut sched = RecordingScheduler::new();
    let eng = engine();
    let result = eng.on_commit(&mut state, &mut sched, &addr("DvpDone"), 100, false);
    assert_eq!(result.status, Status::Pass);
    assert!(sched.has_wake(&addr("DvpDone"), 500));

    // A wake before expiry re-arms past it
    let poll = eng.on_time(&mut state, &mut sched, &addr("DvpDone"), 500, false);
    assert_eq!(poll.status, Status::Pass);
    assert!(state.contracts.find(&addr("DvpDone")).is_some());
    assert!(sched.has_wake(&addr("DvpDone"), 505));

    // Past expiry the record is removed
    let cleanup = eng.on_time(&mut state, &mut sched, &addr("DvpDone"), 505, false);
    assert_eq!(cleanup.status, Status::Pass);
    assert!(state.contracts.find(&addr("DvpDone")).is_none());

    // Balances persist after cleanup
    assert_eq!(balance(&state, "Seller", &gbp()), Decimal::from(10));
}
