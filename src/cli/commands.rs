use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use http::Method;

use crate::manifest::RouteManifest;
use crate::otel::{self, LogConfig};
use crate::router::ParamValue;

/// Command-line interface for razor route manifests
#[derive(Parser, Debug)]
#[command(name = "razor")]
#[command(about = "Check and inspect razor route manifests", long_about = None)]
pub struct Cli {
    /// Route manifest (YAML)
    #[arg(short, long, env = "RAZOR_MANIFEST", global = true, default_value = "routes.yaml")]
    pub manifest: PathBuf,

    /// Emit debug logs to stdout
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Compile every route and report compile errors and duplicates
    Check,
    /// List the route table
    Routes,
    /// Resolve a request against the route table
    Match {
        /// HTTP method, e.g. GET
        method: String,
        /// Request path, e.g. /shop/books/12.html
        path: String,
    },
}

/// Parse process arguments and run.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read, `check` finds problems,
/// or `match` is given an invalid method.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let _guard = if cli.verbose {
        otel::init_logging(&LogConfig::dev())?
    } else {
        None
    };
    let stdout = io::stdout();
    execute(&cli, &mut stdout.lock())
}

/// Run `cli` writing its report to `out`.
pub fn execute(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let manifest = RouteManifest::load(&cli.manifest)?;
    let (router, issues) = manifest.build_router();

    match &cli.command {
        Commands::Check => {
            for issue in &issues {
                writeln!(out, "error: {issue}")?;
            }
            if !issues.is_empty() {
                return Err(anyhow!(
                    "{} route error(s) in {}",
                    issues.len(),
                    cli.manifest.display()
                ));
            }
            writeln!(
                out,
                "ok: {} routes ({} generic)",
                router.len(),
                router.generic_len()
            )?;
        }
        Commands::Routes => {
            for issue in &issues {
                writeln!(out, "skipped: {issue}")?;
            }
            for route in router.routes() {
                writeln!(
                    out,
                    "{:<6} {:<40} {}",
                    route.verb().as_str(),
                    route.full_path(),
                    route.target()
                )?;
            }
        }
        Commands::Match { method, path } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method '{method}'"))?;
            match router.resolve(path, &method) {
                Some(matched) => {
                    writeln!(out, "{} -> {}", matched.route.hash_key(), matched.target())?;
                    for param in &matched.params {
                        let kind = match param.value {
                            ParamValue::Int(_) => "int",
                            ParamValue::Str(_) => "string",
                        };
                        writeln!(out, "  {} ({kind}) = {}", param.name, param.value)?;
                    }
                }
                None => writeln!(out, "no match for {method} {path}")?,
            }
        }
    }
    Ok(())
}
