//! reqbind CLI - bind a described request into a record described in YAML

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use reqbind::binding::{Binder, Binding, Route};
use reqbind::config::BinderConfig;
use reqbind::dynamic::{DynRecord, RecordSpec};
use reqbind::error::{BindError, FixSuggestion};
use reqbind::tag;
use reqbind::validate::Validator;

#[derive(Parser)]
#[command(name = "reqbind")]
#[command(about = "reqbind - bind query, form, multipart, header and path values into typed records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind a request into a record and print it as JSON
    Bind(BindArgs),

    /// Parse a binding tag and show its parts
    Tag {
        /// Raw tag value, e.g. "size,default=10"
        raw: String,
    },
}

#[derive(Args)]
struct BindArgs {
    /// Path to the record schema (.yaml)
    #[arg(short, long)]
    schema: PathBuf,

    /// HTTP method (defaults to POST with a body, GET without)
    #[arg(short = 'X', long)]
    method: Option<String>,

    /// Request target, path and query
    #[arg(short, long, default_value = "/")]
    url: String,

    /// Matched route pattern (e.g. /users/:id)
    #[arg(short, long, default_value = "")]
    route: String,

    /// Path parameter extracted by the router, as key=value
    #[arg(short, long = "param")]
    params: Vec<String>,

    /// Request header, as 'Name: value'
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long, conflicts_with = "data_file")]
    data: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Use this binding instead of selecting one (json, xml, form, form-urlencoded,
    /// multipart/form-data, query, uri, header)
    #[arg(short, long)]
    binding: Option<String>,

    /// Binder configuration file
    #[arg(short, long, default_value = "reqbind.toml")]
    config: PathBuf,
}

fn main() {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Bind(args) => args.run(),
        Commands::Tag { raw } => {
            show_tag(&raw);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.downcast_ref::<BindError>().and_then(|b| b.fix_suggestion()) {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

impl BindArgs {
    fn run(self) -> anyhow::Result<()> {
        let config = BinderConfig::load(&self.config)?.with_env()?;
        let spec = RecordSpec::load(&self.schema)
            .with_context(|| format!("Failed to load schema {}", self.schema.display()))?;
        let mut record = DynRecord::from_spec(&spec)?;

        let body = match (&self.data, &self.data_file) {
            (Some(data), _) => Bytes::from(data.clone()),
            (None, Some(path)) => Bytes::from(
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
            ),
            (None, None) => Bytes::new(),
        };

        let method = match &self.method {
            Some(m) => m.to_ascii_uppercase(),
            None if body.is_empty() => "GET".to_string(),
            None => "POST".to_string(),
        };

        let mut builder = http::Request::builder().method(method.as_str()).uri(self.url.as_str());
        for raw in &self.headers {
            let (name, value) = raw
                .split_once(':')
                .ok_or_else(|| anyhow!("Header '{}' must look like 'Name: value'", raw))?;
            builder = builder.header(name.trim(), value.trim());
        }
        let req = builder.body(body).context("Invalid request")?;

        let mut route = Route::new(&self.route);
        for raw in &self.params {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| anyhow!("Param '{}' must look like key=value", raw))?;
            route = route.param(key, value);
        }

        let binder = Binder::new(config);
        let validator = Validator::new();
        let binding = match &self.binding {
            Some(name) => {
                let Some(binding) = Binding::from_name(name) else {
                    bail!("Unknown binding '{}'", name);
                };
                binder.bind_as(binding, &req, &route, &mut record, &validator)?;
                binding
            }
            None => binder.bind_with(&req, &route, &mut record, &validator)?,
        };

        eprintln!(
            "{} {} via {}",
            "→".cyan(),
            spec.name.bold(),
            binding.name().cyan()
        );
        println!("{}", serde_json::to_string_pretty(&record.to_json())?);
        Ok(())
    }
}

fn show_tag(raw: &str) {
    let parsed = tag::parse(raw);
    if parsed.skip {
        println!("{} field is skipped", "✓".green());
        return;
    }

    let name = if parsed.name.is_empty() {
        "(field name)".dimmed().to_string()
    } else {
        parsed.name.clone()
    };
    let default = parsed
        .options
        .default
        .as_deref()
        .map(|d| format!("{:?}", d))
        .unwrap_or_else(|| "(none)".dimmed().to_string());

    println!("  Name: {}", name);
    println!("  Default: {}", default);
}
