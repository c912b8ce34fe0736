//! DalmatinerDB Query CLI
//!
//! Command-line interface for building and running queries:
//! - Render query text or its JSON encoding
//! - Execute a query and print the decoded series
//! - Generate a default config file

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use dalmatiner_query::config::{generate_default_config, Config};
use dalmatiner_query::query::{parse_duration, parse_time};
use dalmatiner_query::{Arg, Confidence, ExecOptions, Query, Selection};

#[derive(Parser)]
#[command(name = "dql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and run DalmatinerDB queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the query text
    Render {
        #[command(flatten)]
        query: QueryArgs,
        /// Print the JSON encoding instead of the query text
        #[arg(long)]
        json: bool,
    },

    /// Execute the query and print the decoded series as JSON
    Exec {
        #[command(flatten)]
        query: QueryArgs,
        /// Endpoint URL (default: from config)
        #[arg(long)]
        url: Option<String>,
        /// Confidence channels: off, on, aligned
        #[arg(long)]
        confidence: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// A single-collection query described on the command line
#[derive(Args)]
pub struct QueryArgs {
    /// Collection (organisation) to select from
    #[arg(short, long)]
    pub from: String,
    /// Metric path, dot-separated (e.g. base.cpu.system) or ALL; repeatable
    #[arg(short, long, required = true)]
    pub select: Vec<String>,
    /// Function applied to every selection, as fn or fn:arg1,arg2; repeatable
    #[arg(short, long)]
    pub apply: Vec<String>,
    /// Tag annotation as ns:name or name; repeatable
    #[arg(long)]
    pub annotate: Vec<String>,
    /// Label for every selection
    #[arg(long)]
    pub label: Option<String>,
    /// Relative range (e.g. 10m, 1h, 1d)
    #[arg(short, long)]
    pub last: Option<String>,
    /// Absolute range start (e.g. "2016-11-08 12:00")
    #[arg(long)]
    pub beginning: Option<String>,
    /// Absolute range end
    #[arg(long)]
    pub ending: Option<String>,
    /// Variable binding as name=value; repeatable
    #[arg(long = "var")]
    pub vars: Vec<String>,
}

impl QueryArgs {
    fn build(&self) -> anyhow::Result<Query> {
        let mut query = Query::new().from(&self.from);

        for metric in &self.select {
            let selection = if metric.eq_ignore_ascii_case("all") {
                query.select_all()?
            } else {
                query.select(metric.split('.').collect::<Vec<_>>())?
            };
            query = self.decorate(selection)?.into_query();
        }

        if let Some(last) = &self.last {
            query = query.last(parse_duration(last)?);
        }
        if let Some(beginning) = &self.beginning {
            query = query.beginning_at(parse_time(beginning)?);
        }
        if let Some(ending) = &self.ending {
            query = query.ending_at(parse_time(ending)?);
        }

        for binding in &self.vars {
            let Some((name, value)) = binding.split_once('=') else {
                bail!("Invalid variable binding: {}. Use: name=value", binding);
            };
            query = query.with(name, value);
        }

        Ok(query)
    }

    fn decorate(&self, mut selection: Selection) -> anyhow::Result<Selection> {
        for spec in &self.apply {
            let (fun, args) = match spec.split_once(':') {
                Some((fun, args)) => (fun, args.split(',').map(Arg::from).collect()),
                None => (spec.as_str(), Vec::new()),
            };
            selection = selection.apply(fun, args);
        }
        if !self.annotate.is_empty() {
            selection = selection.annotate_with(self.annotate.iter().map(String::as_str))?;
        }
        if let Some(label) = &self.label {
            selection = selection.label_by(label.as_str());
        }
        Ok(selection)
    }
}

fn parse_confidence(s: &str) -> anyhow::Result<Confidence> {
    match s.to_lowercase().as_str() {
        "off" | "false" => Ok(Confidence::Off),
        "on" | "true" => Ok(Confidence::On),
        "aligned" => Ok(Confidence::Aligned),
        _ => bail!("Invalid confidence mode: {}. Use: off, on, aligned", s),
    }
}

/// Execution options from config, with command-line overrides applied
fn exec_options(
    config: &Config,
    url: Option<String>,
    confidence: Option<&str>,
) -> anyhow::Result<ExecOptions> {
    let mut options = config.client.exec_options();
    if let Some(url) = url {
        options = options.url(url);
    }
    if let Some(confidence) = confidence {
        options = options.apply_confidence(parse_confidence(confidence)?);
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    config.logging.init()?;

    match cli.command {
        Commands::Render { query, json } => {
            let query = query.build()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&query.to_json()?)?);
            } else {
                println!("{}", query.render()?);
            }
        }

        Commands::Exec {
            query,
            url,
            confidence,
        } => {
            let query = query.build()?;
            let options = exec_options(&config, url, confidence.as_deref())?;
            let url = options.endpoint().to_string();

            let transport = config.client.transport()?;
            let execution = query.exec(&transport, options)?;
            tracing::info!("Running: {}", execution.query());

            let response = execution
                .await
                .with_context(|| format!("query against {} failed", url))?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("failed to write {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}
