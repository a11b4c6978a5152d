use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rk_core::{ColumnId, RankingId};
use rk_model::{Column, ColumnKind};
use rk_provider::{load_rows, DataProvider, ProviderSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Rank tabular rows by their columns and print the result
#[derive(Debug, Parser)]
#[command(name = "rankview", version)]
struct Cli {
    /// Rows to rank (.csv or .json)
    #[arg(long)]
    data: PathBuf,

    /// Provider settings as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sort by a column label, `label:desc` for descending
    #[arg(long)]
    sort: Option<String>,

    /// Group by a column label
    #[arg(long)]
    group: Option<String>,

    /// Write the session dump here after ranking
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Restore a session dump instead of building the default ranking
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Extra text token read as a missing value (repeatable)
    #[arg(long = "missing", value_name = "TOKEN")]
    missing: Vec<String>,
}

fn parse_sort(value: &str) -> (&str, bool) {
    match value.rsplit_once(':') {
        Some((label, "desc")) => (label, false),
        Some((label, "asc")) => (label, true),
        _ => (value, true),
    }
}

fn find_column(provider: &DataProvider, ranking: &RankingId, label: &str) -> Result<ColumnId> {
    provider
        .ranking(ranking)?
        .flat_columns()
        .into_iter()
        .find(|c| c.label() == label)
        .map(|c| c.id().clone())
        .ok_or_else(|| anyhow!("no column labelled '{label}'"))
}

fn is_numeric(column: &Column) -> bool {
    matches!(
        column.kind(),
        ColumnKind::Number(_) | ColumnKind::Stack(_) | ColumnKind::Reduce(_) | ColumnKind::Script(_)
    )
}

fn print_ranking(provider: &DataProvider, ranking: &RankingId) -> Result<()> {
    let current = provider.ranking(ranking)?;
    let columns: Vec<&Column> = current.columns().iter().filter(|c| !c.is_hidden()).collect();

    println!("== {ranking}");
    let header: Vec<&str> = columns.iter().map(|c| c.label()).collect();
    for group in current.groups() {
        println!("\n[{}] {} rows", group.group.name, group.order.len());
        println!("  {}", header.join(" | "));
        for &row in &group.order {
            let cells = columns
                .iter()
                .map(|c| provider.label(ranking, c.id(), row))
                .collect::<rk_provider::Result<Vec<_>>>()?;
            println!("  {}", cells.join(" | "));
        }
    }

    for column in columns.iter().filter(|c| is_numeric(c)) {
        let stats = match provider.stats(ranking, column.id()) {
            Ok(stats) => stats,
            Err(e) => {
                warn!(column = %column.id(), "no summary: {e}");
                continue;
            }
        };
        if let Some(box_plot) = stats.box_plot() {
            if box_plot.is_empty() {
                continue;
            }
            println!(
                "\n{}: min {:.3} q1 {:.3} median {:.3} q3 {:.3} max {:.3} ({} missing)",
                column.label(),
                box_plot.min(),
                box_plot.q1(),
                box_plot.median(),
                box_plot.q3(),
                box_plot.max(),
                box_plot.missing(),
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => ProviderSettings::from_json_file(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => ProviderSettings::default(),
    };
    settings.nulls = std::mem::take(&mut settings.nulls).with_tokens(cli.missing.iter().cloned());

    let rows = load_rows(&cli.data)
        .await
        .with_context(|| format!("loading rows from {}", cli.data.display()))?;
    info!(rows = rows.len(), "loaded {}", cli.data.display());
    let mut provider = DataProvider::from_rows(rows, settings);

    let ranking = match &cli.restore {
        Some(path) => {
            provider
                .load_dump(path)
                .with_context(|| format!("restoring {}", path.display()))?;
            provider
                .rankings()
                .first()
                .map(|r| r.id().clone())
                .ok_or_else(|| anyhow!("dump {} holds no ranking", path.display()))?
        }
        None => provider.push_default_ranking()?,
    };

    if let Some(sort) = &cli.sort {
        let (label, asc) = parse_sort(sort);
        let column = find_column(&provider, &ranking, label)?;
        provider.sort_by(&ranking, &column, asc)?;
    }
    if let Some(label) = &cli.group {
        let column = find_column(&provider, &ranking, label)?;
        provider.group_by(&ranking, Some(&column))?;
    }

    provider.resort_all().await?;
    for id in provider.rankings().iter().map(|r| r.id().clone()).collect::<Vec<_>>() {
        print_ranking(&provider, &id)?;
    }

    if let Some(path) = &cli.dump {
        match provider.save_dump(path) {
            Ok(()) => info!("session written to {}", path.display()),
            Err(e) => {
                warn!("cannot write session: {e}");
                return Err(e.into());
            }
        }
    }
    Ok(())
}
