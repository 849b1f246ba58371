//! # SplitPay Operator Tool
//!
//! Previews, settles and refunds sales from the command line, against the
//! configured ledger database.
//!
//! ## Usage
//! ```bash
//! # What does each side receive on a 100.00 Kz sale with a 30% co-producer?
//! cargo run -p splitpay-db --bin splitpay -- preview 10000 KZ coproducer 30
//!
//! # Settle an order (idempotent) and refund half of it
//! cargo run -p splitpay-db --bin splitpay -- settle order-42 10000 KZ affiliate 15 \
//!     --producer seller-1 --partner promoter-7
//! cargo run -p splitpay-db --bin splitpay -- refund order-42 5000
//!
//! # Balance of a party
//! cargo run -p splitpay-db --bin splitpay -- balance seller-1 KZ
//!
//! # Use another database
//! cargo run -p splitpay-db --bin splitpay -- --db ./dev.db preview 2500 USD
//! ```
//!
//! Log output is controlled with `RUST_LOG` (default `info,sqlx=warn`).

use std::env;
use std::error::Error;
use std::path::PathBuf;

use splitpay_core::{
    Currency, Money, Participant, ParticipantLedger, Rate, RefundFraction, SettlementRecord,
};
use splitpay_db::{CommissionService, Database, SplitPayConfig};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value_after(&args, i, "--config")?));
                i += 1;
            }
            "--db" | "-d" => {
                db_path = Some(PathBuf::from(value_after(&args, i, "--db")?));
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    let mut config = SplitPayConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    let Some((command, params)) = rest.split_first() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "preview" => {
            let (gross, tail) = parse_gross(params)?;
            let ledger = parse_ledger(tail)?;
            // Same engine as checkout, without opening the database
            let record = splitpay_core::settle(gross, &config.fee_schedule()?, &ledger)?;
            print_settlement(&record);
        }
        "settle" => {
            let (order_id, params) = params
                .split_first()
                .ok_or("settle needs an order id")?;
            let (gross, tail) = parse_gross(params)?;
            let ledger = parse_ledger(tail)?;
            let service = open_service(&config).await?;
            let record = service.settle_sale(order_id, gross, &ledger).await?;
            print_settlement(&record);
        }
        "refund" => {
            let [order_id, bps] = params else {
                return Err("usage: refund <order-id> <bps>".into());
            };
            let fraction = RefundFraction::from_bps(bps.parse()?)?;
            let service = open_service(&config).await?;
            let reversal = service.refund_sale(order_id, fraction).await?;

            println!(
                "Refunded {} ({} of gross, {} in total)",
                reversal.refunded, reversal.fraction, reversal.cumulative
            );
            println!("  platform fee   -{}", reversal.platform_fee);
            for share in &reversal.shares {
                println!("  {:<14} -{}", share.role.to_string(), share.amount);
            }
        }
        "refundable" => {
            let [order_id] = params else {
                return Err("usage: refundable <order-id>".into());
            };
            let service = open_service(&config).await?;
            let left = service.refundable(order_id).await?;
            println!("{}: {} bps still refundable", order_id, left.to_bps_floor());
        }
        "balance" => {
            let [party_id, currency] = params else {
                return Err("usage: balance <party-id> <currency>".into());
            };
            let currency: Currency = currency.parse()?;
            let service = open_service(&config).await?;
            let balance = service.party_balance(party_id, currency).await?;
            println!("{}: {}", party_id, balance);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
        }
    }

    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_service(config: &SplitPayConfig) -> CliResult<CommissionService> {
    let db = Database::new(config.db_config()).await?;
    Ok(CommissionService::new(db, config.fee_schedule()?))
}

fn value_after<'a>(args: &'a [String], i: usize, flag: &str) -> CliResult<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", flag).into())
}

/// `<amount-minor> <currency> ...`
fn parse_gross(params: &[String]) -> CliResult<(Money, &[String])> {
    match params {
        [amount, currency, tail @ ..] => {
            let amount: i64 = amount.parse()?;
            let currency: Currency = currency.parse()?;
            Ok((Money::new(amount, currency), tail))
        }
        _ => Err("expected <amount-minor> <currency>".into()),
    }
}

/// `[coproducer|affiliate <pct>] [--producer <party>] [--partner <party>]`
fn parse_ledger(params: &[String]) -> CliResult<ParticipantLedger> {
    let mut sharer: Option<Participant> = None;
    let mut producer_party: Option<String> = None;
    let mut partner_party: Option<String> = None;

    let mut i = 0;
    while i < params.len() {
        match params[i].as_str() {
            "coproducer" | "co-producer" => {
                let rate = Rate::from_percent_str(value_after(params, i, "coproducer")?)?;
                sharer = Some(Participant::co_producer(rate));
                i += 1;
            }
            "affiliate" => {
                let rate = Rate::from_percent_str(value_after(params, i, "affiliate")?)?;
                sharer = Some(Participant::affiliate(rate));
                i += 1;
            }
            "--producer" => {
                producer_party = Some(value_after(params, i, "--producer")?.to_string());
                i += 1;
            }
            "--partner" => {
                partner_party = Some(value_after(params, i, "--partner")?.to_string());
                i += 1;
            }
            other => return Err(format!("unexpected argument '{}'", other).into()),
        }
        i += 1;
    }

    let mut participants = Vec::new();
    if let Some(party) = producer_party {
        participants.push(Participant::producer().with_party(party));
    }
    if let Some(mut participant) = sharer {
        participant.party_id = partner_party;
        participants.push(participant);
    }

    Ok(ParticipantLedger::new(participants)?)
}

fn print_settlement(record: &SettlementRecord) {
    println!("Gross          {}", record.gross);
    println!("Platform fee   {} ({})", record.platform_fee, record.take_rate);
    println!("Net            {}", record.net);
    for share in &record.shares {
        match &share.party_id {
            Some(party) => println!("  {:<12} {} → {}", share.role.to_string(), share.amount, party),
            None => println!("  {:<12} {}", share.role.to_string(), share.amount),
        }
    }
}

fn print_help() {
    println!("SplitPay operator tool");
    println!();
    println!("Usage: splitpay [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  preview <amount-minor> <currency> [coproducer|affiliate <pct>]");
    println!("  settle <order-id> <amount-minor> <currency> [coproducer|affiliate <pct>]");
    println!("         [--producer <party>] [--partner <party>]");
    println!("  refund <order-id> <bps>");
    println!("  refundable <order-id>");
    println!("  balance <party-id> <currency>");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir/splitpay.toml)");
    println!("  -d, --db <PATH>      Database file, overrides config and SPLITPAY_DB_PATH");
    println!("  -h, --help           Show this help message");
}
