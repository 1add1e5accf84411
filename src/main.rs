//! Perpetual futures engine simulation.
//!
//! Runs one BTC-PERP session end to end: a funding controller on its own
//! task, a resting book, a market sweep, an RFQ round with a spread provider,
//! and a margin withdrawal. `PERPS_ENV` picks the preset, an optional first
//! argument points at a JSON settings file, and `PERPS_LOG_JSON=1` switches
//! to JSON logs.

use anyhow::{Context, Result};
use perps_engine::logging::init_tracing;
use perps_engine::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const BTC: InstrumentId = InstrumentId(1);
const MAKER: AccountId = AccountId(1);
const TAKER: AccountId = AccountId(2);
const DESK: AccountId = AccountId(100);

fn load_settings() -> Result<EngineSettings> {
    if let Some(path) = std::env::args().nth(1) {
        return EngineSettings::from_json_file(&path).with_context(|| format!("loading settings from {path}"));
    }
    let env: Environment = std::env::var("PERPS_ENV")
        .unwrap_or_else(|_| "development".to_string())
        .parse()
        .context("PERPS_ENV")?;
    let settings = env.config();
    settings.validate().context("preset settings")?;
    Ok(settings)
}

fn price(value: rust_decimal::Decimal) -> Result<Price> {
    Price::new(value).context("price must be positive")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(std::env::var("PERPS_LOG_JSON").map_or(false, |v| v == "1"));

    let settings = load_settings()?;
    let engine = Arc::new(Engine::new(settings, Arc::new(SystemClock))?);
    info!(instruments = ?engine.instruments(), "engine ready");

    let cancel = CancellationToken::new();
    let controller = FundingController::new(engine.clone());
    let funding_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(cancel).await })
    };

    let now = engine.now();
    let oracle = price(dec!(50000))?;
    engine
        .update_prices(BTC, PricePoint::new(oracle, now), PricePoint::new(oracle, now))
        .await?;

    for account in [MAKER, TAKER, DESK] {
        engine.deposit_margin(BTC, account, Amount::new(dec!(100000))).await?;
    }

    // scenario 1: resting liquidity and a market sweep
    for (size, level) in [(dec!(0.5), dec!(50010)), (dec!(0.5), dec!(50020)), (dec!(1.0), dec!(50050))] {
        engine
            .submit(OrderRequest::limit(MAKER, BTC, Side::Sell, size, price(level)?))
            .await?;
    }
    let sweep = engine.submit(OrderRequest::market(TAKER, BTC, Side::Buy, dec!(0.8))).await?;
    sweep.check_liquidity()?;
    println!(
        "market buy 0.8 BTC: {} fills, avg {}",
        sweep.trades.len(),
        sweep.average_price().map_or("-".to_string(), |p| p.to_string())
    );

    // scenario 2: a sweep bigger than the book drops its remainder
    let oversized = engine.submit(OrderRequest::market(TAKER, BTC, Side::Buy, dec!(5))).await?;
    if let Err(err) = oversized.check_liquidity() {
        warn!(error = %err, "book exhausted");
    }

    // scenario 3: RFQ with a single desk quoting 5 bps around the oracle
    let desk = Arc::new(SpreadProvider::new("desk", DESK, Bps::new(5)));
    desk.set_mid(BTC, oracle);
    engine.rfq().add_provider(desk);
    let quote = engine
        .request_quote(QuoteRequest::new(MAKER, BTC, Side::Buy, dec!(1)))
        .await?;
    println!("rfq quote {} from {:?}: {} @ {}", quote.id.0, quote.source, quote.size, quote.price);
    let rfq_trade = engine.accept_quote(quote.id).await?;
    println!("rfq trade {} settled, maker {}", rfq_trade.id.0, rfq_trade.maker_account);

    // scenario 4: price moves, then the taker pulls spare margin
    let later = engine.now();
    let moved = price(dec!(51000))?;
    let alerts = engine
        .update_prices(BTC, PricePoint::new(moved, later), PricePoint::new(oracle, later))
        .await?;
    println!("mark moved to {moved}: {} margin alerts", alerts.len());
    match engine.withdraw_margin(BTC, TAKER, Amount::new(dec!(50000))).await {
        Ok(left) => println!("taker withdrew 50000, margin now {left}"),
        Err(err) => warn!(error = %err, "withdrawal refused"),
    }

    for account in [MAKER, TAKER, DESK] {
        let position = engine.position(BTC, account).await?;
        println!(
            "{account}: size {} entry {} margin {} upnl {}",
            position.net_size.value(),
            position.entry_price.map_or("-".to_string(), |p| p.to_string()),
            position.margin,
            position.unrealized_pnl(moved),
        );
    }
    println!(
        "open interest {} BTC, {} events logged",
        engine.open_interest(BTC).await?,
        engine.event_count()
    );

    cancel.cancel();
    funding_task.await.context("funding task")?;
    info!("simulation finished");
    Ok(())
}
