use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use uni_enrich::config::{Config, ConfigOverrides};
use uni_enrich::db::Database;
use uni_enrich::model::FieldKey;
use uni_enrich::output::csv::{analyze_to_csv, schedule_to_csv, stats_to_csv};
use uni_enrich::output::json::{analyze_to_json, render_json};
use uni_enrich::output::table::{
    render_analyze_table, render_fields_table, render_schedule_table, render_stats_table,
};
use uni_enrich::runner::{
    AnalyzeReport, ImportSource, RefreshMode, RunStats, Runner, ScheduleReport,
};
use uni_enrich::schedule;
use uni_enrich::staleness::Priority;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RankingSource {
    Qs,
    The,
}

impl From<RankingSource> for ImportSource {
    fn from(value: RankingSource) -> Self {
        match value {
            RankingSource::Qs => ImportSource::Qs,
            RankingSource::The => ImportSource::The,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UpdateMode {
    Full,
    Incremental,
    Field,
}

impl From<UpdateMode> for RefreshMode {
    fn from(value: UpdateMode) -> Self {
        match value {
            UpdateMode::Full => RefreshMode::Full,
            UpdateMode::Incremental => RefreshMode::Incremental,
            UpdateMode::Field => RefreshMode::Field,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Tier {
    Critical,
    High,
    Medium,
    Low,
}

impl From<Tier> for Priority {
    fn from(value: Tier) -> Self {
        match value {
            Tier::Critical => Priority::Critical,
            Tier::High => Priority::High,
            Tier::Medium => Priority::Medium,
            Tier::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "uni-enrich", about = "Multi-source university data enrichment")]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// Seconds between outbound request groups.
    #[arg(long)]
    rate_limit: Option<f64>,
    #[arg(long)]
    database_url: Option<String>,
    /// Evaluate everything but write nothing.
    #[arg(long)]
    dry_run: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a world ranking table into the directory.
    Import {
        #[arg(value_enum)]
        source: RankingSource,
        /// Read this CSV instead of downloading the dataset.
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        force_download: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Import US institutions from the College Scorecard API.
    ImportScorecard {
        /// Two-letter state code filter.
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Seed rows from the public university directory API.
    SeedDirectory {
        #[arg(long)]
        country: Option<String>,
    },
    /// Fill one still-empty column across a page of rows.
    Fill {
        field: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        country: Option<String>,
    },
    /// Staleness-driven refresh of tracked columns.
    Refresh {
        #[arg(long, value_enum, default_value_t = UpdateMode::Incremental)]
        mode: UpdateMode,
        #[arg(long)]
        field: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Tier>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long)]
        country: Option<String>,
    },
    /// Per-column null counts and coverage.
    Analyze,
    /// Projected re-scrape workload per priority tier.
    Schedule,
    /// Run the scheduled updater daemon.
    Serve,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        rate_limit_secs: cli.rate_limit,
        database_url: cli.database_url.clone(),
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }

    let db = Database::from_env(&config.database)?;

    if matches!(cli.command, Commands::Serve) {
        return schedule::run(&config, &db, cli.dry_run).await;
    }

    let runner = Runner::new(&config, &db, cli.dry_run)?;

    match &cli.command {
        Commands::Import {
            source,
            csv,
            force_download,
            limit,
        } => {
            let stats = runner
                .import((*source).into(), csv.as_deref(), *force_download, *limit)
                .await?;
            print_stats(&stats, cli.output)?;
        }
        Commands::ImportScorecard { state, limit } => {
            let stats = runner.import_scorecard(state.as_deref(), *limit).await?;
            print_stats(&stats, cli.output)?;
        }
        Commands::SeedDirectory { country } => {
            let stats = runner.seed_directory(country.as_deref()).await?;
            print_stats(&stats, cli.output)?;
        }
        Commands::Fill {
            field,
            limit,
            country,
        } => {
            let field = FieldKey::from_str(field)?;
            let stats = runner.fill(field, country.as_deref(), *limit).await?;
            print_stats(&stats, cli.output)?;
        }
        Commands::Refresh {
            mode,
            field,
            priority,
            limit,
            country,
        } => {
            let field = field.as_deref().map(FieldKey::from_str).transpose()?;
            let stats = runner
                .refresh(
                    (*mode).into(),
                    field,
                    priority.map(Into::into),
                    country.as_deref(),
                    *limit,
                )
                .await?;
            print_stats(&stats, cli.output)?;
        }
        Commands::Analyze => {
            let report = runner.analyze().await?;
            print_analyze(&report, cli.output)?;
        }
        Commands::Schedule => {
            let report = runner.schedule_report().await?;
            print_schedule(&report, cli.output)?;
        }
        Commands::Config { .. } => {}
        Commands::Serve => unreachable!("serve command handled before dispatch"),
    }

    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn print_stats(stats: &RunStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_stats_table(stats));
            if !stats.fields_updated.is_empty() {
                println!("{}", render_fields_table(stats));
            }
        }
        OutputFormat::Json => println!("{}", render_json(stats)?),
        OutputFormat::Csv => println!("{}", stats_to_csv(stats)?),
    }
    Ok(())
}

fn print_analyze(report: &AnalyzeReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_analyze_table(report));
            println!("{} rows in the table", report.total_rows);
        }
        OutputFormat::Json => println!("{}", analyze_to_json(report)?),
        OutputFormat::Csv => println!("{}", analyze_to_csv(report)?),
    }
    Ok(())
}

fn print_schedule(report: &ScheduleReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_schedule_table(report));
            println!("{} rows in the table", report.total_rows);
        }
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => println!("{}", schedule_to_csv(report)?),
    }
    Ok(())
}
