//! Shelfwise CLI: load store data, run the layout pipeline and inspect its output

mod import;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use shelfwise::pipeline::{
    build_transition_graph, cluster_products, detect_section_communities, optimize_layout,
};
use shelfwise::simulate::{simulate, SimulationConfig};
use shelfwise::{LayoutStorage, Pipeline, PipelineConfig, ProductId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shelfwise", version, about = "Movement-driven retail layout optimizer")]
struct Cli {
    /// Store directory (overrides `data_path` from the config file)
    #[arg(long, global = true, env = "SHELFWISE_DATA")]
    data: Option<PathBuf>,

    /// YAML config file; a missing file means defaults
    #[arg(long, default_value = "shelfwise.yaml", global = true, env = "SHELFWISE_CONFIG")]
    config: PathBuf,

    /// Random seed (overrides `seed` from the config file)
    #[arg(long, global = true, env = "SHELFWISE_SEED")]
    seed: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum StageName {
    Aggregate,
    Communities,
    Clusters,
    Layout,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the store contents with seeded synthetic data
    Simulate {
        #[arg(long, default_value_t = 10_000)]
        sessions: usize,
        #[arg(long, default_value_t = 100)]
        products: usize,
    },
    /// Replace the store contents with CSV files
    Import {
        /// section_id,name,x,y
        #[arg(long)]
        sections: PathBuf,
        /// product_id,name,category,current_section_id
        #[arg(long)]
        products: PathBuf,
        /// session_id,step_order,section_id,timestamp
        #[arg(long)]
        movements: PathBuf,
    },
    /// Run the full pipeline
    Run,
    /// Run a single stage against the current store
    Stage {
        #[arg(value_enum)]
        name: StageName,
    },
    /// Table counts and the latest run
    Status,
    /// Section communities
    Communities,
    /// Product affinity clusters
    Clusters,
    /// Transition edges, heaviest first
    Edges {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Placement recommendations, best score first
    Recommendations {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run history
    Runs,
    /// Move every product to its recommended section
    Apply,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(&cli.config)?;
    if let Some(data) = &cli.data {
        config.data_path = data.clone();
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn open_storage(path: &Path) -> Result<LayoutStorage> {
    LayoutStorage::open(path)
        .with_context(|| format!("Failed to open store at {}", path.display()))
}

fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let storage = open_storage(&config.data_path)?;
    let format = &cli.format;

    match cli.command {
        Commands::Simulate { sessions, products } => {
            let data = simulate(&SimulationConfig {
                sessions,
                products,
                seed: config.seed,
            })?;
            storage.clear_inputs()?;
            storage.put_sections(&data.sections)?;
            storage.put_products(&data.products)?;
            storage.put_movements(&data.movements)?;
            storage.flush()?;
            println!(
                "Loaded {} sections, {} products, {} movement events",
                data.sections.len(),
                data.products.len(),
                data.movements.len()
            );
        }
        Commands::Import {
            sections,
            products,
            movements,
        } => {
            let batch = import::load_batch(&sections, &products, &movements)?;
            storage.clear_inputs()?;
            storage.put_sections(&batch.sections)?;
            storage.put_products(&batch.products)?;
            storage.put_movements(&batch.movements)?;
            storage.flush()?;
            info!("Import complete");
            println!(
                "Imported {} sections, {} products, {} movement events",
                batch.sections.len(),
                batch.products.len(),
                batch.movements.len()
            );
        }
        Commands::Run => run_pipeline(&storage, config, format)?,
        Commands::Stage { name } => run_stage(&storage, &config, name)?,
        Commands::Status => show_status(&storage, format)?,
        Commands::Communities => show_communities(&storage, format)?,
        Commands::Clusters => show_clusters(&storage, format)?,
        Commands::Edges { limit } => show_edges(&storage, limit, format)?,
        Commands::Recommendations { limit } => show_recommendations(&storage, limit, format)?,
        Commands::Runs => show_runs(&storage, format)?,
        Commands::Apply => {
            let moved = storage.apply_recommendations()?;
            storage.flush()?;
            println!("{} products moved to their recommended sections", moved);
        }
    }

    Ok(())
}

fn run_pipeline(storage: &LayoutStorage, config: PipelineConfig, format: &OutputFormat) -> Result<()> {
    let report = Pipeline::new(storage, config)?.run()?;
    storage.flush()?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = report
        .timings
        .iter()
        .map(|t| {
            vec![
                t.stage.number().to_string(),
                t.stage.name().to_string(),
                format!("{:.3}", t.elapsed.as_secs_f64()),
            ]
        })
        .collect();
    render(format, &["stage", "name", "seconds"], rows)?;

    println!();
    println!("Run:             {}", report.run.run_id);
    println!("Edges:           {}", report.store.edges);
    println!("Communities:     {}", report.store.communities);
    println!("Clusters:        {}", report.store.clusters);
    println!("Recommendations: {}", report.store.recommendations);
    println!("Total time:      {:.2}s", report.total_elapsed().as_secs_f64());
    Ok(())
}

fn run_stage(storage: &LayoutStorage, config: &PipelineConfig, name: StageName) -> Result<()> {
    match name {
        StageName::Aggregate => {
            let summary = build_transition_graph(storage)?;
            println!(
                "{} edges from {} sessions ({} transitions)",
                summary.edges, summary.sessions, summary.total_transitions
            );
        }
        StageName::Communities => {
            let summary = detect_section_communities(storage, &config.communities, config.seed)?;
            println!(
                "{} communities (modularity {:.4})",
                summary.community_count, summary.modularity
            );
        }
        StageName::Clusters => {
            let summary = cluster_products(storage, &config.clustering, config.seed)?;
            println!(
                "{} products in {} clusters",
                summary.eligible_products, summary.cluster_count
            );
        }
        StageName::Layout => {
            let summary = optimize_layout(storage, &config.layout)?;
            println!(
                "{} recommendations (total cost {:.2})",
                summary.recommendations.len(),
                summary.total_cost
            );
        }
    }
    storage.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct Status {
    version: &'static str,
    store: shelfwise::StoreSummary,
    latest_run: Option<shelfwise::RunRecord>,
}

fn show_status(storage: &LayoutStorage, format: &OutputFormat) -> Result<()> {
    let status = Status {
        version: shelfwise::version(),
        store: storage.summary()?,
        latest_run: storage.latest_run()?,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => {
            let s = &status.store;
            println!("Version:         {}", status.version);
            println!("Sections:        {}", s.sections);
            println!("Products:        {}", s.products);
            println!("Movements:       {}", s.movements);
            println!("Edges:           {}", s.edges);
            println!("Communities:     {}", s.communities);
            println!("Clusters:        {}", s.clusters);
            println!("Recommendations: {}", s.recommendations);
            println!("Runs:            {}", s.runs);
            if let Some(run) = &status.latest_run {
                println!("Latest run:      #{} {}", run.run_id, run.notes);
            }
        }
    }
    Ok(())
}

fn show_communities(storage: &LayoutStorage, format: &OutputFormat) -> Result<()> {
    let groups = storage.communities_by_id()?;
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    let rows = groups
        .iter()
        .map(|(community, sections)| {
            let ids: Vec<&str> = sections.iter().map(|s| s.as_str()).collect();
            vec![community.to_string(), sections.len().to_string(), ids.join(" ")]
        })
        .collect();
    render(format, &["community", "size", "sections"], rows)
}

fn product_names(storage: &LayoutStorage) -> Result<HashMap<ProductId, String>> {
    Ok(storage
        .scan_products()?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect())
}

fn show_clusters(storage: &LayoutStorage, format: &OutputFormat) -> Result<()> {
    let mut clusters = storage.scan_clusters()?;
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    }

    let names = product_names(storage)?;
    clusters.sort_by_key(|c| (c.cluster, c.product));
    let rows = clusters
        .iter()
        .map(|c| {
            vec![
                c.cluster.to_string(),
                c.product.to_string(),
                names.get(&c.product).cloned().unwrap_or_default(),
            ]
        })
        .collect();
    render(format, &["cluster", "product_id", "name"], rows)
}

fn show_edges(storage: &LayoutStorage, limit: Option<usize>, format: &OutputFormat) -> Result<()> {
    let mut edges = storage.scan_edges()?;
    edges.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| (&a.source, &a.target).cmp(&(&b.source, &b.target)))
    });
    edges.truncate(limit.unwrap_or(edges.len()));

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&edges)?);
        return Ok(());
    }

    let rows = edges
        .iter()
        .map(|e| vec![e.source.to_string(), e.target.to_string(), e.weight.to_string()])
        .collect();
    render(format, &["source", "target", "weight"], rows)
}

fn show_recommendations(
    storage: &LayoutStorage,
    limit: Option<usize>,
    format: &OutputFormat,
) -> Result<()> {
    let mut recommendations = storage.scan_recommendations()?;
    recommendations.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.product.cmp(&b.product))
    });
    recommendations.truncate(limit.unwrap_or(recommendations.len()));

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
        return Ok(());
    }

    let rows = recommendations
        .iter()
        .map(|r| {
            vec![
                r.product.to_string(),
                r.section.to_string(),
                format!("{:.2}", r.score),
                r.rationale.clone(),
            ]
        })
        .collect();
    render(format, &["product_id", "section", "score", "rationale"], rows)
}

fn show_runs(storage: &LayoutStorage, format: &OutputFormat) -> Result<()> {
    let runs = storage.scan_runs()?;
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    let rows = runs
        .iter()
        .map(|r| {
            let when = chrono::DateTime::from_timestamp_millis(r.created_at)
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| r.created_at.to_string());
            vec![r.run_id.to_string(), when, r.notes.clone()]
        })
        .collect();
    render(format, &["run_id", "created_at", "notes"], rows)
}

/// Print rows as a table or CSV
fn render(format: &OutputFormat, header: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(header)?;
            for row in &rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        _ => {
            if rows.is_empty() {
                println!("(no results)");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(header);
            let count = rows.len();
            for row in rows {
                table.add_row(row);
            }

            println!("{}", table);
            println!("{} row(s)", count);
        }
    }
    Ok(())
}
