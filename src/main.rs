use std::env;

use anyhow::Result;
use blocklist_index::{
    actions::record_action_table,
    config::Config,
    debounce::Debouncer,
    history::CommandHistory,
    record_store::{load_history_export, load_records, write_history_export},
    SearchIndex,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blocklist_index=info".into()),
        )
        .init();

    let config = Config::from_env();

    let records = load_records(&config.records_path).await?;
    let mut index = SearchIndex::new();
    index.build_index(records);

    let stats = index.get_stats();
    info!(
        total = stats.total,
        blocked = stats.blocked,
        allowed = stats.allowed,
        new = stats.new,
        groups = stats.unique_groups,
        tags = stats.unique_tags,
        "Records loaded from {}",
        config.records_path.display()
    );
    for duplicate in index.get_duplicate_keys() {
        warn!(key = %duplicate.key, count = duplicate.count, "Duplicate record key");
    }
    for group in index.get_top_groups(config.top_groups_limit) {
        let risk = index.get_group_risk(&group.group);
        info!(
            group = %group.group,
            total = group.total_count,
            blocked = group.blocked_count,
            risk = ?risk.risk_level,
            score = risk.risk_score,
            "Top group"
        );
    }

    if let Some(path) = &config.history_export_path {
        if let Some(export) = load_history_export(path).await? {
            let mut history =
                CommandHistory::with_max_size(record_action_table(), config.history_max_size);
            let depth = history.import_history(export);
            let compressed = history.compress();
            info!(depth, compressed, "History export loaded from {}", path.display());
            if compressed > 0 {
                write_history_export(path, &history.export_history()).await?;
            }
        }
    }

    let query = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !query.trim().is_empty() {
        print_ranked(&index, &query)?;
        return Ok(());
    }

    let (mut debouncer, mut settled) = Debouncer::new(config.search_debounce);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => debouncer.push(line),
                None => break,
            },
            Some(query) = settled.recv() => print_ranked(&index, &query)?,
        }
    }

    if debouncer.is_pending() {
        if let Some(query) = settled.recv().await {
            print_ranked(&index, &query)?;
        }
    }

    Ok(())
}

fn print_ranked(index: &SearchIndex, query: &str) -> Result<()> {
    let results = index.search_with_ranking(query);
    info!(query = %query, hits = results.len(), "Ranked search");
    println!("{}", serde_json::to_string(&results)?);
    Ok(())
}
