use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rolestore::application::orders::{OrderRequest, OrderService};
use rolestore::domain::ids::{OrderId, ProductId, UserId, VariationId};
use rolestore::domain::ports::OrderRepositoryBox;
use rolestore::error::StorefrontError;
use rolestore::infrastructure::in_memory::{
    InMemoryCatalog, InMemoryOrderStore, LogNotifier, RecordingEntitlements,
};
#[cfg(feature = "storage-rocksdb")]
use rolestore::infrastructure::rocksdb::RocksDbOrderStore;
use rolestore::interfaces::csv::command_reader::{AdminCommand, CommandReader, CommandType};
use rolestore::interfaces::csv::order_writer::OrderWriter;
use rolestore::pix::{self, Field, Merchant};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Pix payment codes and role-order administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the copy-and-paste payment code for an amount
    Payload {
        #[arg(long)]
        amount: Decimal,

        /// Reference label; only the first 25 characters are kept
        #[arg(long)]
        txid: String,

        #[command(flatten)]
        merchant: MerchantArgs,
    },
    /// Check a payment code's layout and checksum and print its fields
    Verify { payload: String },
    /// Replay an administrator command CSV and print the resulting orders
    Process {
        /// Commands CSV: type, actor, target, variation
        commands: PathBuf,

        /// Catalog JSON with `products` and `variations`
        #[arg(long)]
        catalog: PathBuf,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Log a sales summary once all commands have run
        #[arg(long)]
        report: bool,

        #[command(flatten)]
        merchant: MerchantArgs,
    },
}

#[derive(Args)]
struct MerchantArgs {
    /// Pix key that receives the payments
    #[arg(long, env = "PIX_KEY")]
    pix_key: String,

    /// Payee name shown by the paying app (clamped to 25 characters)
    #[arg(long, env = "PIX_NAME")]
    pix_name: String,

    /// Payee city (clamped to 15 characters)
    #[arg(long, env = "PIX_CITY", default_value = "Sao Paulo")]
    pix_city: String,

    #[arg(long, env = "PIX_CATEGORY_CODE", default_value = "0000")]
    category_code: String,

    #[arg(long, env = "PIX_CURRENCY", default_value = "986")]
    currency: String,
}

impl MerchantArgs {
    fn into_merchant(self) -> Merchant {
        Merchant::new(self.pix_key, self.pix_name, self.pix_city)
            .with_category_code(self.category_code)
            .with_currency(self.currency)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Payload {
            amount,
            txid,
            merchant,
        } => {
            let payload = pix::encode(&merchant.into_merchant(), amount, &txid).into_diagnostic()?;
            println!("{payload}");
        }
        Command::Verify { payload } => {
            let fields = pix::verify(&payload).into_diagnostic()?;
            print_fields(&fields, 0).into_diagnostic()?;
        }
        Command::Process {
            commands,
            catalog,
            db_path,
            report,
            merchant,
        } => {
            let catalog = InMemoryCatalog::from_reader(File::open(catalog).into_diagnostic()?)
                .await
                .into_diagnostic()?;
            let service = OrderService::new(
                open_store(db_path)?,
                Box::new(catalog),
                Box::new(RecordingEntitlements::new()),
                Box::new(LogNotifier),
                merchant.into_merchant(),
            );

            let file = File::open(commands).into_diagnostic()?;
            for command in CommandReader::new(file).commands() {
                match command {
                    Ok(command) => {
                        if let Err(e) = run(&service, &command).await {
                            error!(?command, error = %e, "command failed");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "unreadable command row");
                    }
                }
            }

            let orders = service.all_orders().await.into_diagnostic()?;
            let stdout = io::stdout();
            OrderWriter::new(stdout.lock())
                .write_orders(&orders)
                .into_diagnostic()?;

            if report {
                let summary = service
                    .sales_report(Utc::now().date_naive())
                    .await
                    .into_diagnostic()?;
                info!(
                    paid_orders = summary.paid_orders,
                    total_revenue = %summary.total_revenue,
                    revenue_today = %summary.revenue_today,
                    undelivered = summary.undelivered,
                    "sales report"
                );
            }
        }
    }

    Ok(())
}

fn open_store(db_path: Option<PathBuf>) -> Result<OrderRepositoryBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Box::new(RocksDbOrderStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Box::new(InMemoryOrderStore::new()))
        }
        None => Ok(Box::new(InMemoryOrderStore::new())),
    }
}

async fn run(service: &OrderService, command: &AdminCommand) -> Result<(), StorefrontError> {
    match command.r#type {
        CommandType::Create => {
            let placed = service
                .create(OrderRequest {
                    purchaser: UserId(command.actor),
                    product: ProductId(command.target),
                    variation: command.variation.map(VariationId),
                    locus: None,
                })
                .await?;
            info!(order = %placed.order.id, payload = %placed.payload, "payment code issued");
        }
        CommandType::Confirm => {
            service
                .confirm(OrderId(command.target), UserId(command.actor))
                .await?;
        }
        CommandType::Cancel => {
            service
                .cancel(OrderId(command.target), UserId(command.actor))
                .await?;
        }
        CommandType::Retry => {
            service
                .retry_entitlement(OrderId(command.target), UserId(command.actor))
                .await?;
        }
    }
    Ok(())
}

fn print_fields(fields: &[Field], depth: usize) -> Result<(), StorefrontError> {
    for field in fields {
        println!(
            "{:indent$}{} {:02} {}",
            "",
            field.tag,
            field.value.len(),
            field.value,
            indent = depth * 2
        );
        if matches!(field.tag.as_str(), "26" | "62") {
            print_fields(&field.children()?, depth + 1)?;
        }
    }
    Ok(())
}
