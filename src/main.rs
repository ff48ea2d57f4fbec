//! pagedb demo - builds a table heap with a B+Tree index on a scratch file,
//! or reports on the one a previous `--keep` run left behind

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;

use pagedb::buffer::BufferPoolManager;
use pagedb::catalog::{Catalog, DataType, PageCatalog, Schema};
use pagedb::common::{ReplacerPolicy, StorageConfig};
use pagedb::index::BTreeIndex;
use pagedb::storage::disk::DiskManager;
use pagedb::storage::table::TableHeap;
use pagedb::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file to create
    #[arg(long, default_value = "pagedb_demo.db")]
    db: PathBuf,

    /// Number of buffer pool frames
    #[arg(long, default_value_t = pagedb::common::DEFAULT_BUFFER_POOL_SIZE)]
    pool_size: usize,

    /// Max entries per B+Tree node
    #[arg(long, default_value_t = 32)]
    order: usize,

    /// Number of records to insert
    #[arg(long, default_value_t = 1000)]
    records: i64,

    /// Use LRU-K eviction with this k instead of plain LRU
    #[arg(long)]
    lru_k: Option<usize>,

    /// Keep the database file after the run
    #[arg(long)]
    keep: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = StorageConfig::default()
        .with_pool_size(args.pool_size)
        .with_btree_order(args.order)
        .with_replacer(match args.lru_k {
            Some(k) => ReplacerPolicy::LruK(k),
            None => ReplacerPolicy::Lru,
        });

    run(&args, &config)?;

    if !args.keep {
        std::fs::remove_file(&args.db)?;
    }
    Ok(())
}

fn run(args: &Args, config: &StorageConfig) -> Result<()> {
    let disk_manager = Arc::new(DiskManager::new(&args.db)?);
    let bpm = Arc::new(BufferPoolManager::from_config(config, disk_manager)?);
    info!(
        "opened {} with {} frames ({:?})",
        args.db.display(),
        bpm.pool_size(),
        config.replacer
    );

    let catalog = PageCatalog::open_or_create(Arc::clone(&bpm))?;
    if catalog.list_tables().contains(&"users".to_string()) {
        return report_existing(&catalog, &bpm, config);
    }

    let heap = TableHeap::create(Arc::clone(&bpm))?;
    catalog.create_table(
        "users",
        Schema::default()
            .column("id", DataType::BigInt)
            .column("name", DataType::VarChar(255)),
        heap.first_page_id(),
    )?;

    let mut index = BTreeIndex::create(Arc::clone(&bpm), config.btree_order)?;
    catalog.create_index("users_id", "users", "id", index.root_page_id())?;

    for id in 0..args.records {
        let record = format!("{}:user-{}", id, id);
        let rid = heap.insert(record.as_bytes())?;
        index.insert(id, rid)?;
    }
    catalog.set_index_root("users_id", index.root_page_id())?;
    info!(
        "inserted {} records into {} heap pages, index height {}",
        args.records,
        heap.page_ids()?.len(),
        index.height()?
    );

    // Drop every third record from both the heap and the index.
    let mut removed = 0;
    for id in (0..args.records).step_by(3) {
        for rid in index.search(id)? {
            heap.delete(rid)?;
            index.delete(id, rid)?;
            removed += 1;
        }
    }

    // Grow a few records until they no longer fit their page. A record
    // that moves gets a new RID, and its index entry has to follow it.
    let mut relocated = 0;
    for id in (1..args.records).step_by(97) {
        let record = format!("{}:user-{}:{}", id, id, "x".repeat(200));
        for rid in index.search(id)? {
            match heap.update(rid, record.as_bytes())? {
                Some(new_rid) if new_rid != rid => {
                    index.delete(id, rid)?;
                    index.insert(id, new_rid)?;
                    relocated += 1;
                }
                _ => {}
            }
        }
    }
    catalog.set_index_root("users_id", index.root_page_id())?;
    index.check_integrity()?;
    info!(
        "removed {} records, relocated {}, index height {}",
        removed,
        relocated,
        index.height()?
    );

    let high = args.records.min(10);
    for entry in index.range_search(0, high)? {
        let (key, rid) = entry?;
        if let Some(bytes) = heap.get(rid)? {
            info!("key {} at {}: {}", key, rid, String::from_utf8_lossy(&bytes));
        }
    }

    bpm.flush_all_pages()?;
    let dm = bpm.disk_manager();
    info!(
        "{} live records, {} pages on disk ({} free), {} reads, {} writes",
        heap.record_count()?,
        dm.get_num_pages(),
        dm.get_num_free_pages(),
        dm.get_num_reads(),
        dm.get_num_writes()
    );
    Ok(())
}

/// Reopens the table and index a previous `--keep` run left behind.
fn report_existing(
    catalog: &PageCatalog,
    bpm: &Arc<BufferPoolManager>,
    config: &StorageConfig,
) -> Result<()> {
    let table = catalog.table("users")?;
    let index_info = catalog.index("users_id")?;

    let heap = TableHeap::open(Arc::clone(bpm), table.first_page_id);
    let index = BTreeIndex::open(Arc::clone(bpm), index_info.root_page_id, config.btree_order)?;
    index.check_integrity()?;

    info!(
        "found table {} ({} columns) with {} live records, index {} of height {}",
        table.name,
        table.schema.column_count(),
        heap.record_count()?,
        index_info.name,
        index.height()?
    );
    Ok(())
}
