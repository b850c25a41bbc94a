use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use shopsync_core::models::{Direction, EntityType, ExternalId, InternalId, JobStatus};
use shopsync_core::{JobId, ProductId, ShopId};

#[derive(Parser)]
#[command(name = "shopsync")]
#[command(about = "Synchronize catalog products with external shops")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Engine config file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a sync for one product in one shop
    Request {
        product: ProductId,
        shop: ShopId,
        /// push (catalog to shop) or pull (shop to catalog)
        #[arg(short, long, default_value = "push")]
        direction: Direction,
    },
    /// Show one sync job
    Job {
        id: JobId,
    },
    /// List recent sync jobs
    Jobs {
        /// Only jobs in this status
        #[arg(long)]
        status: Option<JobStatus>,
        /// Only jobs for this product
        #[arg(long)]
        product: Option<ProductId>,
        /// Only jobs for this shop
        #[arg(long)]
        shop: Option<ShopId>,
        /// Number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Cancel a pending job
    Cancel {
        id: JobId,
    },
    /// Queue a fresh job for a failed one
    Retry {
        id: JobId,
    },
    /// Run the sync worker
    Work {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,
    },
    /// Queue scheduled pushes for shops whose schedule is due
    Sweep,
    /// Compare a shop's category selection with the catalog default
    OverrideStatus {
        product: ProductId,
        shop: ShopId,
    },
    /// Edit a shop's category selection for a product
    Override {
        #[command(subcommand)]
        command: OverrideCommands,
    },
    /// Show the latest validation findings for a product in a shop
    Findings {
        product: ProductId,
        shop: ShopId,
    },
    /// Manage identity mappings
    Map {
        #[command(subcommand)]
        command: MapCommands,
    },
    /// Import catalog data from JSON files
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum MapCommands {
    /// Bind a catalog id to a shop id
    Associate {
        /// category, product, price_group, warehouse or tax_rule_group
        entity: EntityType,
        shop: ShopId,
        internal: InternalId,
        external: ExternalId,
    },
    /// Retire the active mapping of a catalog id
    Deactivate {
        entity: EntityType,
        shop: ShopId,
        internal: InternalId,
    },
    /// Look up a mapping in either direction
    Resolve {
        entity: EntityType,
        shop: ShopId,
        /// Catalog id to resolve
        #[arg(long, conflicts_with = "external", required_unless_present = "external")]
        internal: Option<InternalId>,
        /// Shop id to resolve
        #[arg(long)]
        external: Option<ExternalId>,
    },
    /// List every mapping of one type in one shop
    List {
        entity: EntityType,
        shop: ShopId,
    },
}

#[derive(Subcommand)]
pub enum OverrideCommands {
    /// Replace the shop's categories; applied by the next push
    Set {
        product: ProductId,
        shop: ShopId,
        /// Catalog category ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        items: Vec<InternalId>,
        /// Primary category; must be one of the items
        #[arg(long)]
        primary: Option<InternalId>,
    },
}

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Upsert catalog products from a JSON array
    Products {
        file: PathBuf,
    },
    /// Upsert shop definitions from a JSON array
    Shops {
        file: PathBuf,
    },
}
