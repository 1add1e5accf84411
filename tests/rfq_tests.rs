//! RFQ flow through the engine: provider timeouts, AMM fallback, quote
//! expiry and single-use acceptance.

use async_trait::async_trait;
use perps_engine::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const INST: InstrumentId = InstrumentId(4);
const REQUESTER: AccountId = AccountId(1);
const DESK: AccountId = AccountId(50);

/// Provider that never answers in time.
#[derive(Debug)]
struct Silent;

#[async_trait]
impl QuoteProvider for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    fn account(&self) -> AccountId {
        AccountId(99)
    }

    async fn quote(&self, _request: &QuoteRequest) -> Option<Price> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        None
    }
}

fn setup() -> (Engine, Arc<ManualClock>) {
    let mut settings = EngineSettings {
        instruments: vec![InstrumentSpec::unrestricted(INST, "RFQ-PERP")],
        ..EngineSettings::default()
    };
    settings.rfq.provider_timeout_ms = 2_000;
    settings.instruments[0].amm_depth = dec!(100);
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
    (Engine::new(settings, clock.clone()).unwrap(), clock)
}

async fn set_reference(engine: &Engine, price: Decimal) {
    let p = Price::new_unchecked(price);
    let ts = engine.now();
    engine
        .update_prices(INST, PricePoint::new(p, ts), PricePoint::new(p, ts))
        .await
        .unwrap();
}

fn buy(size: Decimal) -> QuoteRequest {
    QuoteRequest::new(REQUESTER, INST, Side::Buy, size)
}

#[tokio::test(start_paused = true)]
async fn silent_provider_falls_back_to_amm_after_timeout() {
    let (engine, _) = setup();
    set_reference(&engine, dec!(50)).await;
    engine.rfq().add_provider(Arc::new(Silent));

    let started = tokio::time::Instant::now();
    let quote = engine.request_quote(buy(dec!(20))).await.unwrap();

    assert_eq!(quote.source, QuoteSource::Amm);
    assert_eq!(quote.counterparty, engine.rfq().config().amm_account);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(60));
    // reserves 100 base / 5000 quote, buying 20 before the 30 bps fee
    let expected = dec!(62.5) * (Decimal::ONE + dec!(0.003));
    assert_eq!(quote.price.value(), expected);
}

#[tokio::test(start_paused = true)]
async fn responsive_provider_beats_amm() {
    let (engine, _) = setup();
    set_reference(&engine, dec!(50)).await;
    let desk = Arc::new(SpreadProvider::new("desk", DESK, Bps::new(10)).with_latency(Duration::from_millis(300)));
    desk.set_mid(INST, Price::new_unchecked(dec!(50)));
    engine.rfq().add_provider(desk);

    let quote = engine.request_quote(buy(dec!(1))).await.unwrap();

    assert_eq!(quote.source, QuoteSource::Rfq { provider: "desk".to_string() });
    assert_eq!(quote.counterparty, DESK);
    assert_eq!(quote.price.value(), dec!(50.05));
}

#[tokio::test(start_paused = true)]
async fn accept_books_both_legs_once() {
    let (engine, _) = setup();
    set_reference(&engine, dec!(50)).await;
    let desk = Arc::new(SpreadProvider::new("desk", DESK, Bps::new(10)));
    desk.set_mid(INST, Price::new_unchecked(dec!(50)));
    engine.rfq().add_provider(desk);

    let quote = engine.request_quote(buy(dec!(2))).await.unwrap();
    let trade = engine.accept_quote(quote.id).await.unwrap();

    assert_eq!(trade.origin, TradeOrigin::Rfq { quote_id: quote.id });
    assert_eq!(trade.taker_account, REQUESTER);
    assert_eq!(trade.maker_account, DESK);
    assert_eq!(trade.size, dec!(2));
    assert_eq!(trade.price, quote.price);

    let taker = engine.position(INST, REQUESTER).await.unwrap();
    let maker = engine.position(INST, DESK).await.unwrap();
    assert_eq!(taker.net_size.value(), dec!(2));
    assert_eq!(maker.net_size.value(), dec!(-2));

    let again = engine.accept_quote(quote.id).await.unwrap_err();
    assert_eq!(again, EngineError::QuoteNotFound(quote.id));
    assert!(again.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn expired_quote_rejected() {
    let (engine, clock) = setup();
    set_reference(&engine, dec!(50)).await;

    let quote = engine.request_quote(buy(dec!(1))).await.unwrap();
    clock.advance(engine.rfq().config().quote_ttl_ms as i64);

    let err = engine.accept_quote(quote.id).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Expired {
            quote_id: quote.id,
            expired_at: quote.expires_at,
        }
    );
    assert!(err.is_recoverable());
    assert!(engine.position(INST, REQUESTER).await.is_err());
    let rejected = engine
        .recent_events(1)
        .into_iter()
        .any(|e| matches!(e.payload, EventPayload::QuoteRejected(_)));
    assert!(rejected);
}

#[tokio::test(start_paused = true)]
async fn unknown_quote_not_found() {
    let (engine, _) = setup();
    let err = engine.accept_quote(QuoteId(12345)).await.unwrap_err();
    assert_eq!(err, EngineError::QuoteNotFound(QuoteId(12345)));
    let last = engine.recent_events(1).pop().unwrap();
    assert!(matches!(
        last.payload,
        EventPayload::QuoteRejected(ref e) if e.quote_id == QuoteId(12345)
    ));
}

#[tokio::test(start_paused = true)]
async fn request_size_follows_instrument_rules() {
    let mut settings = EngineSettings {
        instruments: vec![InstrumentSpec::unrestricted(INST, "RFQ-PERP")],
        ..EngineSettings::default()
    };
    settings.instruments[0].max_order_size = dec!(50);
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
    let engine = Engine::new(settings, clock).unwrap();
    set_reference(&engine, dec!(50)).await;

    let err = engine.request_quote(buy(dec!(60))).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidOrder { .. }));
    assert_eq!(engine.rfq().outstanding(), 0);
    assert!(engine.request_quote(buy(dec!(50))).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn amm_counterparty_is_not_margin_checked() {
    let (engine, _) = setup();
    set_reference(&engine, dec!(50)).await;
    let amm = engine.rfq().config().amm_account;
    engine
        .deposit_margin(INST, REQUESTER, Amount::new(dec!(1000)))
        .await
        .unwrap();

    let quote = engine.request_quote(buy(dec!(5))).await.unwrap();
    assert_eq!(quote.counterparty, amm);
    engine.accept_quote(quote.id).await.unwrap();
    assert_eq!(engine.position(INST, amm).await.unwrap().net_size.value(), dec!(-5));

    let alerts = engine.sweep_margin(INST).await.unwrap();
    assert!(alerts.iter().all(|a| a.account_id != amm));
    assert!(engine.check_margin(INST, amm).await.is_ok());

    let own = QuoteRequest::new(amm, INST, Side::Sell, dec!(1));
    let err = engine.request_quote(own).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidOrder { .. }));
}

#[tokio::test(start_paused = true)]
async fn amm_without_reference_has_no_price() {
    let (engine, _) = setup();
    let err = engine.request_quote(buy(dec!(1))).await.unwrap_err();
    assert_eq!(err, EngineError::NoPrice(INST));
}

#[tokio::test(start_paused = true)]
async fn rfq_and_book_trades_share_id_space() {
    let (engine, _) = setup();
    set_reference(&engine, dec!(50)).await;
    engine
        .submit(OrderRequest::limit(AccountId(7), INST, Side::Sell, dec!(1), Price::new_unchecked(dec!(50))))
        .await
        .unwrap();
    let book = engine
        .submit(OrderRequest::market(AccountId(8), INST, Side::Buy, dec!(1)))
        .await
        .unwrap();

    let quote = engine.request_quote(buy(dec!(1))).await.unwrap();
    let rfq = engine.accept_quote(quote.id).await.unwrap();

    assert_ne!(book.trades[0].id, rfq.id);
    assert!(rfq.id > book.trades[0].id);
}
