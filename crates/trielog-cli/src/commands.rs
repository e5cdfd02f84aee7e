use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use colored::Colorize;
use serde_json::json;
use tracing::debug;
use trielog_crypto::{ContentHasher, NodeHasher};
use trielog_index::FileIndex;
use trielog_log::FileLog;
use trielog_store::{BatchOutcome, NodeStore};
use trielog_types::NodeKey;

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let data_dir = config.data_dir(cli.data_dir.clone());
    let store = open_store(&config, &data_dir)?;

    let result = match cli.command {
        Command::Put(args) => cmd_put(&store, args, cli.format),
        Command::Get(args) => cmd_get(&store, args, cli.format),
        Command::Count => cmd_count(&store, cli.format),
        Command::Replay(args) => cmd_replay(&store, args, cli.format),
        Command::Stats => cmd_stats(&store, cli.format),
    };
    let stopped = store.stop().context("stopping node store");
    result.and(stopped)
}

fn open_store(config: &CliConfig, data_dir: &Path) -> anyhow::Result<NodeStore> {
    let log_dir = data_dir.join("log");
    let log = FileLog::open(&log_dir, config.log.clone())
        .with_context(|| format!("opening log in {}", log_dir.display()))?;
    let journal = data_dir.join("index.journal");
    let index = FileIndex::open(&journal, config.index.clone())
        .with_context(|| format!("opening index {}", journal.display()))?;
    debug!(log = %log_dir.display(), index = %journal.display(), "opening node store");
    let store = NodeStore::open(
        config.store.clone(),
        Arc::new(log),
        Box::new(index),
        Arc::new(ContentHasher::PLAIN),
    )?;
    Ok(store)
}

fn cmd_put(store: &NodeStore, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut nodes = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let key = ContentHasher::PLAIN.hash(&data);
        nodes.push((key, Bytes::from(data)));
    }

    let report = store.update(&[], &nodes)?;

    match format {
        OutputFormat::Json => {
            let batches: Vec<_> = report
                .batches
                .iter()
                .map(|b| match &b.outcome {
                    BatchOutcome::Committed {
                        first_offset,
                        last_offset,
                    } => json!({
                        "records": b.records,
                        "size": b.size,
                        "first_offset": first_offset,
                        "last_offset": last_offset,
                    }),
                    BatchOutcome::Failed { error } => json!({
                        "records": b.records,
                        "size": b.size,
                        "error": error,
                    }),
                })
                .collect();
            let keys: Vec<String> = nodes.iter().map(|(key, _)| key.to_hex()).collect();
            println!(
                "{}",
                json!({
                    "keys": keys,
                    "batches": batches,
                    "already_present": report.already_present,
                    "index_entries_written": report.index_entries_written,
                })
            );
        }
        OutputFormat::Text => {
            for ((key, _), path) in nodes.iter().zip(&args.files) {
                println!("{}  {}", key.to_hex().yellow(), path.display());
            }
            for (i, batch) in report.batches.iter().enumerate() {
                match &batch.outcome {
                    BatchOutcome::Committed {
                        first_offset,
                        last_offset,
                    } => println!(
                        "{} batch {}: {} nodes at offsets {}..={} ({} bytes)",
                        "✓".green(),
                        i + 1,
                        batch.records,
                        first_offset,
                        last_offset,
                        batch.size
                    ),
                    BatchOutcome::Failed { error } => println!(
                        "{} batch {}: {} nodes not stored: {}",
                        "✗".red(),
                        i + 1,
                        batch.records,
                        error.red()
                    ),
                }
            }
            if report.already_present > 0 {
                println!("  {} already stored", report.already_present.to_string().bold());
            }
        }
    }

    if !report.is_complete() {
        bail!(
            "{} of {} batches failed",
            report.failed_batches().count(),
            report.batches.len()
        );
    }
    Ok(())
}

fn cmd_get(store: &NodeStore, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let key = NodeKey::from_hex(&args.key).with_context(|| format!("invalid key {:?}", args.key))?;
    let Some(found) = store.get_with_offset(&key, args.skip_cache)? else {
        bail!("node {key} not found");
    };

    if let Some(out) = &args.out {
        std::fs::write(out, &found.value).with_context(|| format!("writing {}", out.display()))?;
    }
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": key.to_hex(), "offset": found.offset, "size": found.len() })
        ),
        OutputFormat::Text => {
            println!("{} {}", "key:".bold(), key.to_hex().yellow());
            println!("{} {}", "offset:".bold(), found.offset);
            println!("{} {} bytes", "size:".bold(), found.len());
            if let Some(out) = &args.out {
                println!("{} wrote {}", "✓".green(), out.display());
            }
        }
    }
    Ok(())
}

fn cmd_count(store: &NodeStore, format: OutputFormat) -> anyhow::Result<()> {
    let count = store.count()?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "count": count })),
        OutputFormat::Text => println!("{count}"),
    }
    Ok(())
}

fn cmd_replay(store: &NodeStore, args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let limit = args.limit.unwrap_or(usize::MAX);
    let mut from = args.from;
    let mut listed = 0usize;
    let mut rows = Vec::new();

    while listed < limit {
        let (next, nodes) = store.read_batch(from, args.max_bytes)?;
        if nodes.is_empty() && next == from {
            break;
        }
        let page_len = nodes.len();
        let take = page_len.min(limit - listed);
        for (key, value, offset) in nodes.into_iter().take(take) {
            listed += 1;
            from = offset + 1;
            match format {
                OutputFormat::Json => {
                    rows.push(json!({ "offset": offset, "key": key.to_hex(), "size": value.len() }))
                }
                OutputFormat::Text => println!(
                    "{:>10}  {}  {} bytes",
                    offset,
                    key.to_hex().yellow(),
                    value.len()
                ),
            }
        }
        if take == page_len {
            from = next;
        }
    }

    if format == OutputFormat::Json {
        println!("{}", json!({ "nodes": rows, "next_offset": from }));
    }
    Ok(())
}

fn cmd_stats(store: &NodeStore, format: OutputFormat) -> anyhow::Result<()> {
    let count = store.count()?;
    let stats = store.read_stats();
    let average_nanos = stats.average().map(|d| d.as_nanos() as u64);
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "stream": store.config().stream,
                "end_offset": count,
                "index_entries": store.index_len(),
                "cache_hit_rate": store.cache_hit_rate(),
                "cache_reads": store.cache_read_count(),
                "reads": stats.reads,
                "average_read_nanos": average_nanos,
            })
        ),
        OutputFormat::Text => {
            println!("{} {}", "stream:".bold(), store.config().stream.cyan());
            println!("{} {}", "end offset:".bold(), count);
            println!("{} {}", "index entries:".bold(), store.index_len());
            println!(
                "{} {:.1}% of {} reads",
                "cache hit rate:".bold(),
                store.cache_hit_rate() * 100.0,
                store.cache_read_count()
            );
        }
    }
    Ok(())
}
