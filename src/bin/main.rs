//! Paynode CLI - Deposit engine daemon and operator commands
//!
//! Every command prints one JSON document:
//!   paynode serve                      → run the reconciliation loop until SIGINT/SIGTERM
//!   paynode tick                       → {examined, expired, completed, ...}
//!   paynode pay <email> <plan> [cur]   → {payment_id, address, amount_trx, expires_at, ...}
//!   paynode status <id>                → payment record + deposit address
//!   paynode cancel <id>                → cancelled payment record
//!
//! Chain and price lookups need no vault key:
//!   paynode balance <address>          → {address, balance_sun, balance_trx}
//!   paynode transferable <address>     → {address, balance_sun, transferable_sun, ...}
//!   paynode quote <usd>                → {usd, price, amount_sun, amount_trx}
//!
//! Configuration comes from `PAYNODE_*` variables; a `.env` in the working
//! directory is loaded first (variables already set win).
//!
//! Output format:
//!   --json     Compact JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use paynode::logging::init_logging;
use paynode::{
    install_signal_handlers, native_amount, ChainReader, Currency, EngineConfig, EngineContext, FeeEstimator,
    HttpPriceOracle, LocalLedger, Plan, PriceOracle, TronGridClient, VaultKey,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::env;
use std::future::Future;
use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);
    init_logging();

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("paynode {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("serve") => cmd_serve(),
        Some("tick") => cmd_tick(),
        Some("pay") => cmd_pay(&opts),
        Some("cancel") => cmd_cancel(&opts),
        Some("status") => cmd_status(&opts),
        Some("balance") => cmd_balance(&opts),
        Some("transferable") => cmd_transferable(&opts),
        Some("quote") => cmd_quote(&opts),
        Some("gen-key") => Ok(json!({ "vault_key": VaultKey::generate().to_hex() })),
        Some("plans") => cmd_plans(),
        Some("add-plan") => cmd_add_plan(&opts),
        Some("add-currency") => cmd_add_currency(&opts),
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || (!opts.json && std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({ "error": e }), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|e| format!(r#"{{"error":"render failed: {}"}}"#, e))
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    args: Vec<String>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        load_dotenv(".env");

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                // Flags beat both the environment and .env
                "--network" | "-n" => {
                    if i + 1 < args.len() {
                        env::set_var("PAYNODE_NETWORK", &args[i + 1]);
                        i += 1;
                    }
                }
                "--ledger" | "-l" => {
                    if i + 1 < args.len() {
                        env::set_var("PAYNODE_LEDGER_PATH", &args[i + 1]);
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.args = positional;
        opts
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str, String> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| format!("Missing argument <{}>", name))
    }
}

fn load_dotenv(path: &str) {
    let Ok(contents) = std::fs::read_to_string(path) else { return };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().trim_start_matches("export ").trim();
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && env::var(key).is_err() {
                env::set_var(key, value);
            }
        }
    }
}

// =============================================================================
// Wiring
// =============================================================================

fn config() -> Result<EngineConfig, String> {
    EngineConfig::from_env().map_err(|e| e.to_string())
}

/// Full engine: validated config, vault, ledger, chain, oracle.
fn engine() -> Result<EngineContext, String> {
    EngineContext::from_config(config()?).map_err(|e| format!("{:#}", e))
}

fn reader(config: &EngineConfig) -> Result<ChainReader, String> {
    let client = TronGridClient::with_timeout(config.api_url.clone(), config.api_key.clone(), config.http_timeout)
        .map_err(|e| e.to_string())?;
    Ok(ChainReader::new(Arc::new(client)))
}

fn ledger(config: &EngineConfig) -> Result<LocalLedger, String> {
    LocalLedger::open(&config.ledger_path)
        .map_err(|e| format!("Failed to open ledger {}: {}", config.ledger_path.display(), e))
}

fn block_on<F>(future: F) -> Result<Value, String>
where
    F: Future<Output = Result<Value, String>>,
{
    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;
    rt.block_on(future)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_serve() -> Result<Value, String> {
    let ctx = engine()?;
    let scheduler = ctx.scheduler().map_err(|e| e.to_string())?;

    block_on(async move {
        let shutdown = install_signal_handlers();

        info!(
            network = %ctx.config.network,
            api_url = %ctx.config.api_url,
            ledger = %ctx.config.ledger_path.display(),
            interval_secs = scheduler.interval().as_secs(),
            "paynode reconciling"
        );

        scheduler
            .spawn(shutdown.subscribe())
            .await
            .map_err(|e| format!("Scheduler task failed: {}", e))?;

        info!("paynode stopped");
        Ok(json!({ "stopped": true }))
    })
}

fn cmd_tick() -> Result<Value, String> {
    let ctx = engine()?;
    let reconciler = ctx.reconciler().map_err(|e| e.to_string())?;

    block_on(async move {
        let report = reconciler.run_pass().await.map_err(|e| e.to_string())?;
        to_json(&report)
    })
}

fn cmd_pay(opts: &ParsedArgs) -> Result<Value, String> {
    let identity = opts.arg(0, "email")?.to_string();
    let plan_id = opts.arg(1, "plan")?.to_string();
    let currency = opts.args.get(2).cloned();
    let service = engine()?.payment_service();

    block_on(async move {
        let receipt = service
            .create_payment(&identity, &plan_id, currency.as_deref())
            .await
            .map_err(|e| e.to_string())?;
        to_json(&receipt)
    })
}

fn cmd_cancel(opts: &ParsedArgs) -> Result<Value, String> {
    let id = opts.arg(0, "payment-id")?.to_string();
    let service = engine()?.payment_service();

    block_on(async move {
        let payment = service.cancel_payment(&id).await.map_err(|e| e.to_string())?;
        to_json(&payment)
    })
}

fn cmd_status(opts: &ParsedArgs) -> Result<Value, String> {
    let id = opts.arg(0, "payment-id")?.to_string();
    let service = engine()?.payment_service();

    block_on(async move {
        let view = service.payment_status(&id).await.map_err(|e| e.to_string())?;
        to_json(&view)
    })
}

fn cmd_balance(opts: &ParsedArgs) -> Result<Value, String> {
    let address = opts.arg(0, "address")?.to_string();
    let reader = reader(&config()?)?;

    block_on(async move {
        let balance = reader.balance(&address).await.map_err(|e| e.to_string())?;
        Ok(json!({
            "address": address,
            "balance_sun": balance.as_u64(),
            "balance_trx": balance.to_trx().to_string(),
        }))
    })
}

fn cmd_transferable(opts: &ParsedArgs) -> Result<Value, String> {
    let address = opts.arg(0, "address")?.to_string();
    let config = config()?;
    let reader = reader(&config)?;
    let estimator = FeeEstimator::new(reader.clone(), config.fees);

    block_on(async move {
        let balance = reader.balance(&address).await.map_err(|e| e.to_string())?;
        let amount = estimator.transferable(&address, balance).await.map_err(|e| e.to_string())?;
        Ok(json!({
            "address": address,
            "balance_sun": balance.as_u64(),
            "fee_sun": balance.saturating_sub(amount).as_u64(),
            "transferable_sun": amount.as_u64(),
            "transferable_trx": amount.to_trx().to_string(),
        }))
    })
}

fn cmd_quote(opts: &ParsedArgs) -> Result<Value, String> {
    let usd = Decimal::from_str(opts.arg(0, "usd")?).map_err(|e| format!("Invalid USD amount: {}", e))?;
    let config = config()?;
    let oracle = HttpPriceOracle::new(config.oracle.url.clone(), config.http_timeout).map_err(|e| e.to_string())?;

    block_on(async move {
        let price = oracle.usd_price().await.map_err(|e| e.to_string())?;
        let amount = native_amount(usd, price).map_err(|e| e.to_string())?;
        Ok(json!({
            "usd": usd.to_string(),
            "price": price.to_string(),
            "amount_sun": amount.as_u64(),
            "amount_trx": amount.to_trx().to_string(),
        }))
    })
}

fn cmd_plans() -> Result<Value, String> {
    let ledger = ledger(&config()?)?;
    block_on(async move { to_json(&ledger.plans().await) })
}

/// `add-plan <id> <price-usd> <days> [name]`
fn cmd_add_plan(opts: &ParsedArgs) -> Result<Value, String> {
    let id = opts.arg(0, "id")?.to_string();
    let price_usd = Decimal::from_str(opts.arg(1, "price-usd")?).map_err(|e| format!("Invalid price: {}", e))?;
    if price_usd <= Decimal::ZERO {
        return Err("Plan price must be positive".into());
    }
    let duration_days: i64 = opts.arg(2, "days")?.parse().map_err(|e| format!("Invalid duration: {}", e))?;
    let name = if opts.args.len() > 3 { opts.args[3..].join(" ") } else { id.clone() };
    let ledger = ledger(&config()?)?;

    let plan = Plan { id, name, description: String::new(), price_usd, duration_days };
    block_on(async move {
        ledger.insert_plan(plan.clone()).await.map_err(|e| e.to_string())?;
        to_json(&plan)
    })
}

/// `add-currency [code] [name]`, defaults to native TRX on the configured network.
fn cmd_add_currency(opts: &ParsedArgs) -> Result<Value, String> {
    let config = config()?;
    let code = opts.args.first().cloned().unwrap_or_else(|| paynode::service::DEFAULT_CURRENCY.to_string());
    let name = opts.args.get(1).cloned().unwrap_or_else(|| "Tron".to_string());
    let ledger = ledger(&config)?;

    let currency = Currency {
        code: code.to_uppercase(),
        name,
        network: config.network.to_string(),
        is_token: false,
        contract_address: None,
        enabled: true,
    };
    block_on(async move {
        ledger.insert_currency(currency.clone()).await.map_err(|e| e.to_string())?;
        to_json(&currency)
    })
}

fn print_usage() {
    println!(
        r#"paynode - Custodial TRX deposit engine

USAGE:
    paynode <command> [args] [options]

COMMANDS:
    serve                          Run the reconciliation loop
    tick                           Run one reconciliation pass and exit
    pay <email> <plan> [currency]  Create a payment and its deposit address
    status <payment-id>            Show a payment and its address
    cancel <payment-id>            Cancel a pending payment
    balance <address>              On-chain balance of an address
    transferable <address>         Balance minus sweep fees
    quote <usd>                    Convert USD to TRX at the live price
    gen-key                        Generate a vault key (PAYNODE_VAULT_KEY)
    plans                          List plans in the ledger
    add-plan <id> <usd> <days> [name]
                                   Create or replace a plan
    add-currency [code] [name]     Enable a currency (default: TRX)

OPTIONS:
    --network, -n <net>            mainnet|shasta|nile (env: PAYNODE_NETWORK)
    --ledger, -l <path>            Ledger file (env: PAYNODE_LEDGER_PATH)
    --json                         Compact JSON output
    --pretty                       Pretty-print JSON
    --version, -V                  Print version

ENVIRONMENT:
    PAYNODE_VAULT_KEY              64 hex chars; encrypts deposit keys
    PAYNODE_HOT_WALLET             Sweep destination (base58 T-address)
    PAYNODE_API_KEY                TronGrid API key
    RUST_LOG                       Log filter (default: info)
    PAYNODE_LOG_JSON=1             JSON log lines on stderr

EXAMPLES:
    paynode gen-key
    paynode add-currency
    paynode add-plan monthly 9.99 30 "Monthly"
    paynode pay alice@example.com monthly
    paynode status 5f0c...
    paynode --network mainnet balance TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t
"#
    );
}
