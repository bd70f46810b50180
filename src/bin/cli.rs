//! Marketdex CLI
//!
//! Command-line interface over a journal-backed engine.

use clap::{Parser, Subcommand};
use marketdex::{
    Config, Coordinator, Engine, IdAllocator, ItemListing, KeywordIndex, PriceIndex, SalesIndex,
    SellerKey,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Marketdex CLI
#[derive(Parser, Debug)]
#[command(name = "marketdex-cli")]
#[command(about = "Product-discovery indexes and item id allocation")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./marketdex_data")]
    data_dir: String,

    /// Max records one command may touch
    #[arg(long, default_value = "64")]
    max_batch_records: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the id allocator
    Init {
        /// Ids per chunk (defaults to the configured chunk size)
        #[arg(long)]
        chunk_size: Option<u32>,
    },

    /// Register a seller and open its first id chunk
    RegisterSeller {
        /// Seller handle
        name: String,
    },

    /// Create an item and index it
    CreateItem {
        /// Seller handle
        #[arg(short, long)]
        seller: String,

        /// Price in minor units
        #[arg(short, long)]
        price: u64,

        /// Units sold so far
        #[arg(long, default_value = "0")]
        sales: u32,

        /// Keywords to index the item under
        #[arg(required = true)]
        keywords: Vec<String>,
    },

    /// List items tagged with a keyword
    Keyword {
        keyword: String,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List items priced within [min, max]
    Price {
        #[arg(long)]
        min: u64,

        #[arg(long)]
        max: u64,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Best-selling items
    TopSales {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Verify both range trees
    Check,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,marketdex=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::info!("Marketdex v{}", marketdex::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    if let Err(e) = run(args) {
        tracing::error!(kind = ?e.kind(), "{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> marketdex::Result<()> {
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .max_batch_records(args.max_batch_records);
    if let Commands::Init {
        chunk_size: Some(size),
    } = args.command
    {
        builder = builder.chunk_size(size);
    }
    let engine = Engine::open(builder.build())?;

    match args.command {
        Commands::Init { .. } => {
            let chunk_size = engine.config().chunk_size;
            engine.transact(|batch| IdAllocator::initialize(batch, chunk_size))?;
            println!("allocator initialized (chunk size {})", chunk_size);
        }
        Commands::RegisterSeller { name } => {
            let seller = SellerKey::from_name(&name);
            let (state, chunk) = engine.transact(|batch| IdAllocator::register_seller(batch, &seller))?;
            println!(
                "seller {} registered as #{} (ids {}..={})",
                name, state.seller_id, chunk.start_id, chunk.end_id
            );
        }
        Commands::CreateItem {
            seller,
            price,
            sales,
            keywords,
        } => {
            let seller = SellerKey::from_name(&seller);
            let listing = ItemListing::new(keywords, price, sales);
            let item_id = engine.transact(|batch| Coordinator::create_item(batch, &seller, &listing))?;
            println!("{}", item_id);
        }
        Commands::Keyword {
            keyword,
            offset,
            limit,
        } => {
            for id in KeywordIndex::items(engine.store(), &keyword, offset, limit)? {
                println!("{}", id);
            }
        }
        Commands::Price {
            min,
            max,
            offset,
            limit,
        } => {
            for id in PriceIndex::query(engine.store(), min, max, offset, limit)? {
                println!("{}", id);
            }
        }
        Commands::TopSales { limit } => {
            for entry in SalesIndex::top(engine.store(), limit)? {
                println!("{}\t{}", entry.item_id, entry.metric);
            }
        }
        Commands::Check => {
            let price = PriceIndex::check(engine.store())?;
            let sales = SalesIndex::check(engine.store())?;
            println!(
                "price tree: {} nodes, {} items, height {}",
                price.nodes, price.items, price.height
            );
            println!(
                "sales tree: {} nodes, {} items, height {}",
                sales.nodes, sales.items, sales.height
            );
        }
    }

    engine.close()
}
