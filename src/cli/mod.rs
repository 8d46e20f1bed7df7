use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::application::{
    ApplyRequest, BalanceResponse, CustomerResponse, ErrorClass, ErrorResponse, LedgerConfig,
    LedgerError, LedgerService, TransactionListResponse, TransactionResponse,
};
use crate::currency::{
    ConversionError, Currency, DEFAULT_EXCHANGE_API_URL, DEFAULT_EXCHANGE_TIMEOUT,
    ExchangeRateApiConverter, REFERENCE_CURRENCY,
};
use crate::domain::{CustomerId, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, TransactionKind, parse_cents};
use crate::storage::StoreConfig;

/// Ledger - customer balances with an append-only transaction journal
#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Maintains customer balances and an immutable history of credits and debits")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "LEDGER_DATABASE", default_value = "ledger.db")]
    pub database: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[command(flatten)]
    pub exchange: ExchangeArgs,

    /// Enable verbose (debug) logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct TuningArgs {
    /// Maximum number of pooled database connections
    #[arg(long, env = "LEDGER_MAX_CONNECTIONS", default_value_t = 8)]
    pub max_connections: u32,

    /// How long a write waits for the database lock, in milliseconds
    #[arg(long, env = "LEDGER_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// How long a transaction waits for the customer's lock, in milliseconds
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", default_value_t = 10_000)]
    pub lock_timeout_ms: u64,
}

#[derive(Args)]
pub struct ExchangeArgs {
    /// API key for exchangerate-api.com, needed for non-USD balances
    #[arg(long, env = "EXCHANGE_RATE_API_KEY", hide_env_values = true)]
    pub exchange_api_key: Option<String>,

    /// Base URL of the exchange rate API
    #[arg(long, env = "EXCHANGE_RATE_API_URL", default_value = DEFAULT_EXCHANGE_API_URL)]
    pub exchange_api_url: String,

    /// Exchange rate request timeout, in seconds
    #[arg(long, env = "EXCHANGE_RATE_TIMEOUT_SECS", default_value_t = DEFAULT_EXCHANGE_TIMEOUT.as_secs())]
    pub exchange_timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Customer account commands
    #[command(subcommand)]
    Customer(CustomerCommands),

    /// Apply a credit or debit to a customer's balance
    Apply {
        /// Customer ID
        customer_id: String,

        /// Transaction type: credit or debit
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Amount (e.g., "200.00" or "200")
        amount: String,

        /// Token that makes retrying this exact request safe
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Show a customer's balance
    Balance {
        /// Customer ID
        customer_id: String,

        /// Display currency: USD, EUR, GBP
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// List a customer's transactions, most recent first
    Transactions {
        /// Customer ID
        customer_id: String,

        /// Page number (1-based)
        #[arg(long, default_value_t = DEFAULT_PAGE, allow_negative_numbers = true)]
        page: i64,

        /// Number of transactions per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, allow_negative_numbers = true)]
        page_size: i64,
    },
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Create a new customer account
    Create {
        /// Customer name
        name: String,

        /// Opening balance (e.g., "1000.00")
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        initial_balance: String,
    },

    /// Show a customer account
    Show {
        /// Customer ID
        customer_id: String,
    },
}

impl Cli {
    /// Install the tracing subscriber. Logs go to stderr; stdout carries command output.
    pub fn init_tracing(&self) {
        let default_directive = if self.verbose { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false);

        if self.log_json {
            builder.json().init();
        } else {
            builder.init();
        }
    }

    fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.database)
            .with_max_connections(self.tuning.max_connections)
            .with_busy_timeout(Duration::from_millis(self.tuning.busy_timeout_ms))
    }

    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            lock_timeout: Duration::from_millis(self.tuning.lock_timeout_ms),
        }
    }

    pub async fn run(self) -> Result<(), LedgerError> {
        let store = self.store_config();
        let config = self.ledger_config();

        match self.command {
            Commands::Init => {
                LedgerService::init_with(&store.create_if_missing(true), config).await?;
                println!("Database initialized: {}", self.database.display());
                Ok(())
            }

            Commands::Customer(cmd) => {
                let service = LedgerService::connect_with(&store, config).await?;
                run_customer_command(&service, cmd).await
            }

            Commands::Apply {
                customer_id,
                kind,
                amount,
                idempotency_key,
            } => {
                let customer_id = parse_customer_id(&customer_id)?;
                let kind = TransactionKind::from_str(&kind).ok_or_else(|| {
                    LedgerError::invalid(format!(
                        "invalid transaction type '{}' (expected credit or debit)",
                        kind
                    ))
                })?;
                let amount_cents = parse_cents(&amount)
                    .map_err(|e| LedgerError::invalid(format!("invalid amount: {}", e)))?;

                let mut request = ApplyRequest::new(customer_id, kind, amount_cents);
                if let Some(key) = idempotency_key {
                    request = request.with_idempotency_key(key);
                }

                let service = LedgerService::connect_with(&store, config).await?;
                let outcome = service.apply(request).await?;
                print_json(&TransactionResponse::from(&outcome))
            }

            Commands::Balance {
                customer_id,
                currency,
            } => {
                let customer_id = parse_customer_id(&customer_id)?;
                let currency = match currency {
                    Some(code) => Currency::parse(&code)
                        .map_err(|e| LedgerError::invalid(e.to_string()))?,
                    None => REFERENCE_CURRENCY,
                };

                let service = LedgerService::connect_with(&store, config).await?;
                if currency == REFERENCE_CURRENCY {
                    let balance = service.get_balance(customer_id).await?;
                    return print_json(&BalanceResponse::in_reference_currency(
                        customer_id,
                        balance,
                    ));
                }

                let converter = self.exchange.converter()?;
                let display = service
                    .get_balance_in(customer_id, currency, &converter)
                    .await?;
                print_json(&BalanceResponse::from(&display))
            }

            Commands::Transactions {
                customer_id,
                page,
                page_size,
            } => {
                let customer_id = parse_customer_id(&customer_id)?;
                let service = LedgerService::connect_with(&store, config).await?;
                let page = service
                    .list_transactions(customer_id, page, page_size)
                    .await?;
                print_json(&TransactionListResponse::from(&page))
            }
        }
    }
}

impl ExchangeArgs {
    fn converter(&self) -> Result<ExchangeRateApiConverter, LedgerError> {
        let api_key = self.exchange_api_key.as_deref().ok_or_else(|| {
            ConversionError::Request(
                "no exchange rate API key configured (set EXCHANGE_RATE_API_KEY)".to_string(),
            )
        })?;
        Ok(ExchangeRateApiConverter::new(
            &self.exchange_api_url,
            api_key,
            Duration::from_secs(self.exchange_timeout_secs),
        )?)
    }
}

async fn run_customer_command(
    service: &LedgerService,
    cmd: CustomerCommands,
) -> Result<(), LedgerError> {
    match cmd {
        CustomerCommands::Create {
            name,
            initial_balance,
        } => {
            let initial_balance_cents = parse_cents(&initial_balance)
                .map_err(|e| LedgerError::invalid(format!("invalid initial balance: {}", e)))?;
            let customer = service.create_account(&name, initial_balance_cents).await?;
            print_json(&CustomerResponse::from(&customer))
        }

        CustomerCommands::Show { customer_id } => {
            let customer = service
                .get_customer(parse_customer_id(&customer_id)?)
                .await?;
            print_json(&CustomerResponse::from(&customer))
        }
    }
}

fn parse_customer_id(input: &str) -> Result<CustomerId, LedgerError> {
    Uuid::parse_str(input.trim())
        .map_err(|_| LedgerError::invalid(format!("invalid customer ID '{}'", input)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), LedgerError> {
    let out = serde_json::to_string_pretty(value).context("Failed to render response")?;
    println!("{}", out);
    Ok(())
}

/// Report a failed command on stderr and pick the process exit code.
pub fn report_error(err: &LedgerError) -> ExitCode {
    let body = serde_json::to_string(&ErrorResponse::from(err)).unwrap_or_else(|_| err.to_string());
    eprintln!("{}", body);
    ExitCode::from(exit_status(err.class()))
}

fn exit_status(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::ServerError => 1,
        ErrorClass::ClientError => 2,
        ErrorClass::NotFound => 3,
    }
}
