mod config;
mod render;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use migration::{Migrator, MigratorTrait};
use platform_db::{DbDealStore, DbPool, connect_url};
use platform_obs::{ObsConfig, init_tracing};
use products_crm::{
    BoardState, DealId, DealSort, DealStore, NewDeal, Resolution, StageId, TransitionController,
};
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "pipeline", version, about = "CRM pipeline board")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Insert demo deals into an empty database.
    Seed,
    /// List pipeline stages in column order.
    Stages,
    /// Print the board, one column per stage.
    Board(BoardArgs),
    /// Move a deal to another stage.
    Move(MoveArgs),
    /// Show a deal's stage changes, newest first.
    History {
        #[arg(value_name = "DEAL_ID")]
        deal_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Roll back the most recent migration.
    Down,
    /// Roll back everything and reapply.
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Title,
    Value,
}

impl From<SortArg> for DealSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Title => DealSort::Title,
            SortArg::Value => DealSort::ValueDesc,
        }
    }
}

#[derive(Args, Debug)]
struct BoardArgs {
    /// Only deals whose title or contact contains this text.
    #[arg(long, short, default_value = "")]
    search: String,
    #[arg(long, value_enum)]
    sort: Option<SortArg>,
    /// Print the board as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MoveArgs {
    #[arg(value_name = "DEAL_ID")]
    deal_id: String,
    #[arg(value_name = "STAGE")]
    stage: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(ObsConfig::from_env("pipeline"))?;
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    match cli.command {
        Command::Migrate(action) => migrate(&config, action).await,
        Command::Seed => seed(&config).await,
        Command::Stages => {
            print!("{}", render::stages(&config.registry()?));
            Ok(())
        }
        Command::Board(args) => show_board(&config, args).await,
        Command::Move(args) => move_deal(&config, args).await,
        Command::History { deal_id } => show_history(&config, deal_id).await,
    }
}

async fn setup_pool(config: &AppConfig) -> Result<DbPool> {
    connect_url(&config.database_url).await.map_err(Into::into)
}

async fn open_store(config: &AppConfig) -> Result<DbDealStore> {
    let pool = setup_pool(config).await?;
    let pending = Migrator::get_pending_migrations(&pool).await?;
    if !pending.is_empty() {
        bail!("pending migrations detected; run `pipeline migrate up` first");
    }
    Ok(DbDealStore::new(pool))
}

async fn migrate(config: &AppConfig, action: MigrateCommand) -> Result<()> {
    let pool = setup_pool(config).await?;
    match action {
        MigrateCommand::Up => {
            Migrator::up(&pool, None).await?;
            info!("database migrations applied");
        }
        MigrateCommand::Down => {
            Migrator::down(&pool, Some(1)).await?;
            info!("most recent migration rolled back");
        }
        MigrateCommand::Reset => {
            Migrator::reset(&pool).await?;
            Migrator::up(&pool, None).await?;
            info!("database reset");
        }
    }
    Ok(())
}

const DEMO_DEALS: [(&str, &str, &str, i64); 8] = [
    ("Acme renewal", "jane@acme.test", "Qualification", 500_000),
    ("Globex pilot", "hank@globex.test", "Prospecting", 120_000),
    ("Initech upsell", "bill@initech.test", "Needs Analysis", 85_000),
    ("Hooli expansion", "gavin@hooli.test", "Value Proposition", 1_250_000),
    ("Umbrella audit", "alice@umbrella.test", "Negotiation", 310_000),
    ("Stark retrofit", "pepper@stark.test", "Closed Won", 2_000_000),
    ("Wayne security", "lucius@wayne.test", "Closed Lost", 450_000),
    ("Soylent trial", "", "Prospecting", 0),
];

async fn seed(config: &AppConfig) -> Result<()> {
    let registry = config.registry()?;
    let store = open_store(config).await?;
    if !store.list(None).await?.is_empty() {
        warn!("deals already present; skipping seed");
        return Ok(());
    }
    let fallback = registry
        .ordered_stages()
        .first()
        .context("stage registry is empty")?;
    for (title, contact, stage, value) in DEMO_DEALS {
        // Custom registries may not carry the demo stage names.
        let stage = registry
            .stage_by_id(&StageId::from(stage))
            .unwrap_or(fallback);
        let mut deal = NewDeal::new(title, stage.id.clone(), stage.default_probability)
            .with_value(value)
            .with_attribute("currency", "USD");
        if !contact.is_empty() {
            deal = deal.with_contact(contact);
        }
        store.create(deal).await?;
    }
    info!(deals = DEMO_DEALS.len(), "demo deals seeded");
    Ok(())
}

async fn show_board(config: &AppConfig, args: BoardArgs) -> Result<()> {
    let registry = config.registry()?;
    let store = open_store(config).await?;
    let state = BoardState::load(&store, args.sort.map(DealSort::from)).await?;
    let view = state.view(&registry, &args.search);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render::board(&view));
    }
    Ok(())
}

async fn move_deal(config: &AppConfig, args: MoveArgs) -> Result<()> {
    let registry = Arc::new(config.registry()?);
    let store = Arc::new(open_store(config).await?);
    let mut controller = TransitionController::new(registry.clone(), store.clone());
    if let Some(timeout) = config.commit_timeout {
        controller = controller.with_commit_timeout(timeout);
    }
    let mut state = BoardState::load(store.as_ref(), None).await?;
    let deal_id = DealId::from(args.deal_id);
    let destination = StageId::from(args.stage);

    let Some(pending) = state.drag(&controller, &deal_id, &destination)? else {
        println!("{deal_id} is already in {destination}");
        return Ok(());
    };
    let resolution = state
        .resolve(store.as_ref(), pending.settle().await)
        .await?;
    let deal = state
        .deal(&deal_id)
        .with_context(|| format!("deal {deal_id} disappeared after reload"))?;
    match resolution {
        Resolution::Kept => println!(
            "moved {} to {} ({}%)",
            deal.id, deal.stage, deal.probability
        ),
        Resolution::Reloaded => println!(
            "move not saved; {} is still in {} ({}%)",
            deal.id, deal.stage, deal.probability
        ),
    }
    let view = state.view(&registry, "");
    if let Some(column) = view.column(&deal.stage) {
        println!(
            "{} now holds {} deals worth {}",
            column.stage.name,
            column.count,
            render::amount(column.total_value)
        );
    }
    Ok(())
}

async fn show_history(config: &AppConfig, deal_id: String) -> Result<()> {
    let store = open_store(config).await?;
    let deal_id = DealId::from(deal_id);
    if store.find(&deal_id).await?.is_none() {
        bail!("deal {deal_id} not found");
    }
    print!("{}", render::history(&store.stage_history(&deal_id).await?));
    Ok(())
}
