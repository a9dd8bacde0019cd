use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use zooticket_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    handlers::AppServices,
    services::{
        delivery::{DeliveryOutcome, SweepReport},
        orders::OrderView,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Sweep => handle_sweep(&context, cli.json).await?,
        Commands::Redeliver(args) => handle_redeliver(&context, args, cli.json).await?,
        Commands::Show(args) => handle_show(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "zooticket",
    about = "Operator tools for the zoo ticketing backend",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Run one delivery sweep now
    Sweep,
    /// Provision and email a single paid order
    Redeliver(RedeliverArgs),
    /// Print an order with its ticket lines
    Show(ShowArgs),
}

#[derive(Args)]
struct RedeliverArgs {
    #[arg(long)]
    order_no: String,
    /// Send the email again even if it was already delivered
    #[arg(long, action = ArgAction::SetTrue)]
    resend: bool,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(long)]
    order_no: String,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.server.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            config,
            db: Arc::new(db_pool),
        })
    }

    fn services(&self) -> Result<AppServices> {
        AppServices::from_config(self.db.clone(), &self.config)
            .context("failed to build services")
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("migration failed")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_sweep(context: &CliContext, json: bool) -> Result<()> {
    let services = context.services()?;
    let report = services
        .delivery
        .run_once()
        .await
        .context("sweep failed")?;

    if json {
        print_json(&report)?;
    } else {
        render_report(&report);
    }
    Ok(())
}

#[derive(Serialize)]
struct RedeliverResult<'a> {
    order_no: &'a str,
    outcome: DeliveryOutcome,
}

async fn handle_redeliver(context: &CliContext, args: RedeliverArgs, json: bool) -> Result<()> {
    let services = context.services()?;
    let outcome = services
        .delivery
        .redeliver(&args.order_no, args.resend)
        .await
        .with_context(|| format!("redelivery of {} failed", args.order_no))?;

    if json {
        print_json(&RedeliverResult {
            order_no: &args.order_no,
            outcome,
        })?;
    } else {
        let text = match outcome {
            DeliveryOutcome::Delivered => "tickets emailed",
            DeliveryOutcome::Incomplete => "not all tickets issued yet; try again later",
            DeliveryOutcome::AlreadySent => "already delivered (use --resend to send again)",
        };
        println!("Order {}: {}", args.order_no, text);
    }
    Ok(())
}

async fn handle_show(context: &CliContext, args: ShowArgs, json: bool) -> Result<()> {
    let services = context.services()?;
    let view = services
        .orders
        .view_by_order_no(&args.order_no)
        .await
        .with_context(|| format!("order {} not found", args.order_no))?;

    if json {
        print_json(&view)?;
    } else {
        render_order(&view);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_report(report: &SweepReport) {
    if report.skipped {
        println!("A sweep is already running");
        return;
    }
    println!(
        "Selected {} • delivered {} • incomplete {} • failed {}",
        report.selected, report.delivered, report.incomplete, report.failed
    );
}

fn render_order(order: &OrderView) {
    println!(
        "Order {} (id {}) • {} • total {} • emailed {}",
        order.order_no,
        order.order_id,
        order.transaction_status,
        order.total_amount,
        if order.is_email_sent { "yes" } else { "no" }
    );
    println!(
        "  buyer {} <{}> • paid {}",
        order.buyer_name,
        order.buyer_email,
        if order.transaction_date.is_empty() {
            "-"
        } else {
            order.transaction_date.as_str()
        }
    );
    for line in &order.lines {
        println!(
            "  - {} {} • {} • admit {} • {}",
            line.item_id,
            line.item_desc2,
            line.unit_price,
            line.admit_date,
            line.encrypted_id.as_deref().unwrap_or("not issued")
        );
    }
}
