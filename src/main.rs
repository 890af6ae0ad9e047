use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use stock_weeks_builder::utils::parse_period_stem;
use stock_weeks_builder::{
    prune_year_in_file, Brand, Category, Grouping, Period, PipelineConfig, SourceAggregator,
    SourceKind, SourceLayout, StockWeeksProcessor,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stock-weeks")]
#[command(about = "Inventory weeks-of-supply reports from monthly stock and sales extracts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build one JSON report per brand
    Build {
        /// Folder holding the per-source extract folders
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Folder the reports are written to
        #[arg(long, default_value = "public/data")]
        out_dir: PathBuf,

        /// Brand to build (repeatable); defaults to the configured brands
        #[arg(long = "brand")]
        brands: Vec<String>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the warehouse look-ahead window
        #[arg(long)]
        n_weeks: Option<f64>,

        /// Build the operation-basis reports instead
        #[arg(long)]
        operation: bool,
    },

    /// Remove one year from existing reports
    PruneYear {
        #[arg(long)]
        year: i32,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the aggregated amounts of one source-month
    Inspect {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        #[arg(long, value_enum)]
        source: SourceArg,

        /// Extract period as YYYY.MM
        #[arg(long)]
        period: String,

        #[arg(long)]
        brand: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the JSON schema of the configuration file
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    AgencyStock,
    DirectStock,
    Sales,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::AgencyStock => SourceKind::AgencyStock,
            SourceArg::DirectStock => SourceKind::DirectStock,
            SourceArg::Sales => SourceKind::Sales,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn build(
    data_dir: PathBuf,
    out_dir: PathBuf,
    brands: Vec<String>,
    config: Option<PathBuf>,
    n_weeks: Option<f64>,
    operation: bool,
) -> Result<()> {
    let mut config = load_config(config.as_ref())?;

    if !brands.is_empty() {
        config.brands = brands
            .iter()
            .map(|name| name.parse::<Brand>())
            .collect::<stock_weeks_builder::Result<Vec<_>>>()?;
    }
    if let Some(n_weeks) = n_weeks {
        config.n_weeks = n_weeks;
    }

    let processor = StockWeeksProcessor::new(config, data_dir)?;
    let written = if operation {
        processor.build_all_operation(&out_dir)
    } else {
        processor.build_all(&out_dir)
    }
    .with_context(|| format!("writing reports to {}", out_dir.display()))?;

    info!("{} reports written", written.len());
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn inspect(
    data_dir: PathBuf,
    source: SourceArg,
    period: &str,
    brand: Option<String>,
    category: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let (year, month) = parse_period_stem(period)?;
    let period = Period::new(year, month)?;
    let kind = SourceKind::from(source);

    let brand = brand.map(|b| b.parse::<Brand>()).transpose()?;
    let category = category
        .map(|c| Category::parse(&c).with_context(|| format!("unknown category '{}'", c)))
        .transpose()?;

    let layout = SourceLayout::new(data_dir, config.sources.clone());
    let path = layout.file_for(kind, period);
    let table = SourceAggregator::new(kind, Grouping::Subcategory, period, &config)?
        .aggregate_file(&path)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut total = 0.0;
    for (key, amount) in &table.amounts {
        if brand.is_some_and(|b| b != key.dimension.brand)
            || category.is_some_and(|c| c != key.dimension.category)
        {
            continue;
        }
        total += amount;
        println!("{}\t{:.0}", key, amount);
    }

    println!(
        "{} {}: {} rows read, {} kept, {} rejected, {} amounts coerced; shown total {:.0}",
        period,
        kind,
        table.stats.rows_read,
        table.stats.rows_kept,
        table.stats.rows_rejected,
        table.stats.amounts_coerced,
        total
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Build {
            data_dir,
            out_dir,
            brands,
            config,
            n_weeks,
            operation,
        } => build(data_dir, out_dir, brands, config, n_weeks, operation),
        Command::PruneYear { year, files } => {
            for path in &files {
                let removed = prune_year_in_file(path, year)
                    .with_context(|| format!("pruning {}", path.display()))?;
                println!("{}: {} entries removed", path.display(), removed);
            }
            Ok(())
        }
        Command::Inspect {
            data_dir,
            source,
            period,
            brand,
            category,
            config,
        } => inspect(data_dir, source, &period, brand, category, config),
        Command::Schema => {
            println!("{}", PipelineConfig::schema_as_json()?);
            Ok(())
        }
    }
}
