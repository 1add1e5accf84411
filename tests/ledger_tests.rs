//! Position ledger through the engine: fills, funding intervals, margin
//! transfers and breach reporting.

use parking_lot::Mutex;
use perps_engine::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const INST: InstrumentId = InstrumentId(3);
const EIGHT_HOURS: i64 = 8 * 3_600_000;

#[derive(Debug, Default)]
struct Recorder {
    alerts: Mutex<Vec<MarginAlert>>,
}

impl LiquidationPolicy for Recorder {
    fn on_breach(&self, alert: &MarginAlert) {
        self.alerts.lock().push(alert.clone());
    }
}

struct Harness {
    engine: Arc<Engine>,
    clock: Arc<ManualClock>,
    recorder: Arc<Recorder>,
}

fn harness() -> Harness {
    let settings = EngineSettings {
        instruments: vec![InstrumentSpec::unrestricted(INST, "LEDGER-PERP")],
        ..EngineSettings::default()
    };
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(settings, clock.clone())
        .unwrap()
        .with_liquidation_policy(recorder.clone());
    Harness {
        engine: Arc::new(engine),
        clock,
        recorder,
    }
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

async fn fund(engine: &Engine, account: u64, amount: Decimal) {
    engine
        .deposit_margin(INST, AccountId(account), Amount::new(amount))
        .await
        .unwrap();
}

/// Account 1 sells `size` at `price` to account 2.
async fn cross(engine: &Engine, size: Decimal, price: Decimal) {
    engine
        .submit(OrderRequest::limit(AccountId(1), INST, Side::Sell, size, px(price)))
        .await
        .unwrap();
    engine
        .submit(OrderRequest::market(AccountId(2), INST, Side::Buy, size))
        .await
        .unwrap();
}

async fn prices(engine: &Engine, at: i64, mark: Decimal, index: Decimal) -> Vec<MarginAlert> {
    let ts = Timestamp::from_millis(at);
    engine
        .update_prices(INST, PricePoint::new(px(mark), ts), PricePoint::new(px(index), ts))
        .await
        .unwrap()
}

async fn margin_of(engine: &Engine, account: u64) -> Decimal {
    engine.position(INST, AccountId(account)).await.unwrap().margin.value()
}

#[tokio::test]
async fn funding_moves_margin_from_long_to_short() {
    let h = harness();
    fund(&h.engine, 1, dec!(1000)).await;
    fund(&h.engine, 2, dec!(1000)).await;
    cross(&h.engine, dec!(10), dec!(100)).await;
    prices(&h.engine, 1_000, dec!(101), dec!(100)).await;

    h.clock.set(Timestamp::from_millis(EIGHT_HOURS));
    let outcome = h.engine.settle_funding(INST, h.engine.now()).await.unwrap();

    // premium 1%, dampened to 0.5%, plus 0.01% interest
    let FundingOutcome::Applied { rate, summary } = outcome else {
        panic!("expected funding to apply");
    };
    assert_eq!(rate.rate, dec!(0.0051));
    assert_eq!(rate.effective_at, Timestamp::from_millis(EIGHT_HOURS));
    assert_eq!(summary.positions_funded, 2);
    assert_eq!(summary.total_paid.value(), dec!(5.151));
    assert_eq!(summary.total_received.value(), dec!(5.151));

    assert_eq!(margin_of(&h.engine, 2).await, dec!(994.849));
    assert_eq!(margin_of(&h.engine, 1).await, dec!(1005.151));
    assert_eq!(h.engine.funding_history(INST).await.unwrap().len(), 1);
}

#[tokio::test]
async fn funding_applies_once_per_interval() {
    let h = harness();
    fund(&h.engine, 1, dec!(1000)).await;
    fund(&h.engine, 2, dec!(1000)).await;
    cross(&h.engine, dec!(10), dec!(100)).await;
    prices(&h.engine, 1_000, dec!(101), dec!(100)).await;
    let controller = FundingController::new(h.engine.clone());

    // nothing is due inside the interval the instrument was registered in
    let early = controller.tick(h.engine.now()).await;
    assert_eq!(early[0].outcome, FundingOutcome::AlreadyApplied);

    h.clock.set(Timestamp::from_millis(EIGHT_HOURS + 5));
    let first = controller.tick(h.engine.now()).await;
    assert!(matches!(first[0].outcome, FundingOutcome::Applied { .. }));
    let after_first = margin_of(&h.engine, 2).await;

    h.clock.advance(60_000);
    let second = controller.tick(h.engine.now()).await;
    assert_eq!(second[0].outcome, FundingOutcome::AlreadyApplied);
    assert_eq!(margin_of(&h.engine, 2).await, after_first);
    assert_eq!(controller.phase(INST), FundingPhase::Idle);

    h.clock.set(Timestamp::from_millis(2 * EIGHT_HOURS));
    let third = controller.tick(h.engine.now()).await;
    assert!(matches!(third[0].outcome, FundingOutcome::Applied { .. }));
    assert!(margin_of(&h.engine, 2).await < after_first);
    assert_eq!(h.engine.funding_history(INST).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_funding_retries_next_tick() {
    let h = harness();
    fund(&h.engine, 1, dec!(1000)).await;
    fund(&h.engine, 2, dec!(1000)).await;
    cross(&h.engine, dec!(10), dec!(100)).await;
    let controller = FundingController::new(h.engine.clone());

    h.clock.set(Timestamp::from_millis(EIGHT_HOURS));
    let failed = controller.tick(h.engine.now()).await;
    assert_eq!(failed[0].outcome, FundingOutcome::Failed(EngineError::NoPrice(INST)));
    assert_eq!(margin_of(&h.engine, 2).await, dec!(1000));

    prices(&h.engine, EIGHT_HOURS + 1, dec!(100), dec!(100)).await;
    h.clock.advance(1_000);
    let retried = controller.tick(h.engine.now()).await;
    let FundingOutcome::Applied { rate, .. } = &retried[0].outcome else {
        panic!("expected retry to apply");
    };
    // no premium, interest only
    assert_eq!(rate.rate, dec!(0.0001));
    assert_eq!(margin_of(&h.engine, 2).await, dec!(999.9));
}

#[tokio::test]
async fn breach_reported_to_policy_and_audited() {
    let h = harness();
    fund(&h.engine, 1, dec!(30)).await;
    fund(&h.engine, 2, dec!(30)).await;
    cross(&h.engine, dec!(10), dec!(100)).await;
    assert!(h.recorder.alerts.lock().is_empty());

    // long: equity 20 on notional 990, below the 2.5% maintenance
    let alerts = prices(&h.engine, 1_000, dec!(99), dec!(99)).await;

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].account_id, AccountId(2));
    assert_eq!(alerts[0].maintenance, dec!(0.025));
    assert_eq!(h.recorder.alerts.lock().len(), 1);
    assert!(matches!(
        h.engine.check_margin(INST, AccountId(2)).await,
        Err(EngineError::MarginBreach { .. })
    ));
    assert!(h.engine.check_margin(INST, AccountId(1)).await.is_ok());
    let breach_logged = h
        .engine
        .recent_events(10)
        .iter()
        .any(|e| matches!(e.payload, EventPayload::MarginBreach(_)));
    assert!(breach_logged);

    // position is left open for the policy to deal with
    let long = h.engine.position(INST, AccountId(2)).await.unwrap();
    assert_eq!(long.net_size.value(), dec!(10));
}

#[tokio::test]
async fn withdrawal_keeps_initial_margin() {
    let h = harness();
    fund(&h.engine, 1, dec!(100)).await;
    fund(&h.engine, 2, dec!(100)).await;
    cross(&h.engine, dec!(10), dec!(100)).await;
    prices(&h.engine, 1_000, dec!(100), dec!(100)).await;

    // initial margin on 1000 notional at 20x is 50
    let refused = h
        .engine
        .withdraw_margin(INST, AccountId(2), Amount::new(dec!(60)))
        .await
        .unwrap_err();
    assert!(matches!(refused, EngineError::MarginBreach { .. }));

    let left = h
        .engine
        .withdraw_margin(INST, AccountId(2), Amount::new(dec!(40)))
        .await
        .unwrap();
    assert_eq!(left.value(), dec!(60));
}

#[tokio::test]
async fn withdrawal_needs_a_price() {
    let h = harness();
    fund(&h.engine, 5, dec!(100)).await;

    let err = h
        .engine
        .withdraw_margin(INST, AccountId(5), Amount::new(dec!(10)))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NoPrice(INST));
}

#[tokio::test]
async fn flip_realizes_pnl_and_resets_entry() {
    let h = harness();
    cross(&h.engine, dec!(10), dec!(100)).await;
    h.engine
        .submit(OrderRequest::limit(AccountId(3), INST, Side::Buy, dec!(15), px(dec!(110))))
        .await
        .unwrap();
    h.engine
        .submit(OrderRequest::market(AccountId(2), INST, Side::Sell, dec!(15)))
        .await
        .unwrap();

    let flipped = h.engine.position(INST, AccountId(2)).await.unwrap();
    assert_eq!(flipped.net_size.value(), dec!(-5));
    assert_eq!(flipped.entry_price.unwrap().value(), dec!(110));
    assert_eq!(flipped.realized_pnl.value(), dec!(100));

    // 1 short 10, 3 long 15, 2 short 5
    assert_eq!(h.engine.open_interest(INST).await.unwrap(), dec!(15));
    assert_eq!(h.engine.positions_for(AccountId(2)).await.len(), 1);
}
