//! Berth - validating loader for multi-service deployment descriptors
//!
//! This is the main CLI entry point for Berth.

use anyhow::{Context, Result};
use berth::descriptor::digest::descriptor_digests;
use berth::descriptor::parser::escape_value;
use berth::descriptor::{PortMapping, StartupPlan};
use berth::{BerthError, LoaderOptions, Project};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Berth - deployment descriptor loader and validator
#[derive(Parser)]
#[command(name = "berth")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Validate and inspect multi-service deployment descriptors", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Descriptor file; repeat to overlay files in order
    #[arg(short, long = "file", global = true)]
    files: Vec<PathBuf>,

    /// Project directory (defaults to the first file's directory)
    #[arg(long, global = true)]
    project_directory: Option<PathBuf>,

    /// Do not substitute ${VAR} references
    #[arg(long, global = true)]
    no_interpolate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a descriptor and report every problem found
    Validate {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
        /// Require referenced env files to exist and parse
        #[arg(long)]
        check_env_files: bool,
        /// Only report problems
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the merged, interpolated descriptor
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
        /// Print service names only
        #[arg(long)]
        services: bool,
        /// Print volume names only
        #[arg(long)]
        volumes: bool,
        /// Print a configuration hash per service
        #[arg(long)]
        hash: bool,
    },

    /// Show the order services would be started in
    Order {
        /// Group services into stages that can start together
        #[arg(long)]
        stages: bool,
        /// Show the stop order instead
        #[arg(long, conflicts_with = "stages")]
        shutdown: bool,
        /// Limit to these services and their dependencies
        services: Vec<String>,
    },

    /// List resolved port mappings
    Ports {
        /// Limit to these services
        services: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let base_dir = match (&cli.project_directory, cli.files.first()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(file)) => file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
        (None, None) => std::env::current_dir().context("Failed to read current directory")?,
    };

    let options = LoaderOptions::from_env(&base_dir)
        .with_context(|| format!("Failed to load environment for {}", base_dir.display()))?
        .interpolate(!cli.no_interpolate);

    match cli.command {
        Commands::Validate {
            strict,
            check_env_files,
            quiet,
        } => {
            let options = options.strict(strict).check_env_files(check_env_files);
            let project = Project::open(&options, &cli.files)?;
            let report = project.diagnose(&options);

            for warning in &report.warnings {
                eprintln!("Warning: {}", warning);
            }
            for error in &report.errors {
                eprintln!("Error: {}", error);
            }

            let errors = report.errors.len();
            let warnings = report.warnings.len();
            if errors > 0 || (strict && warnings > 0) {
                return Err(BerthError::Validation { errors, warnings }.into());
            }

            if !quiet {
                println!(
                    "{}: descriptor is valid ({} services, {} volumes)",
                    project.name,
                    project.descriptor.services.len(),
                    project.descriptor.volumes.len()
                );
            }
        }

        Commands::Config {
            format,
            services,
            volumes,
            hash,
        } => {
            let project = load(&options, &cli.files)?;
            let descriptor = &project.descriptor;

            if services {
                for name in descriptor.services.keys() {
                    println!("{}", name);
                }
            } else if volumes {
                for name in descriptor.volumes.keys() {
                    println!("{}", name);
                }
            } else if hash {
                for (name, digest) in descriptor_digests(descriptor)? {
                    println!("{} {}", name, digest);
                }
            } else {
                let mut document = serde_yaml::to_value(descriptor).map_err(BerthError::from)?;
                // keep literal dollars literal when the output is loaded again
                if !cli.no_interpolate {
                    escape_value(&mut document);
                }
                let rendered = match format {
                    OutputFormat::Yaml => {
                        serde_yaml::to_string(&document).map_err(BerthError::from)?
                    }
                    OutputFormat::Json => {
                        serde_json::to_string_pretty(&document).map_err(BerthError::from)?
                    }
                };
                print!("{}", rendered);
                if !rendered.ends_with('\n') {
                    println!();
                }
            }
        }

        Commands::Order {
            stages,
            shutdown,
            services,
        } => {
            let project = load(&options, &cli.files)?;
            let plan = if services.is_empty() {
                StartupPlan::new(&project.descriptor)?
            } else {
                StartupPlan::for_services(&project.descriptor, &services)?
            };

            if stages {
                for (index, stage) in plan.stages().iter().enumerate() {
                    println!("{}: {}", index + 1, stage.join(" "));
                }
            } else if shutdown {
                for name in plan.shutdown_order() {
                    println!("{}", name);
                }
            } else {
                for name in plan.order() {
                    println!("{}", name);
                }
            }
        }

        Commands::Ports { services } => {
            let project = load(&options, &cli.files)?;
            for name in &services {
                if !project.descriptor.services.contains_key(name) {
                    return Err(BerthError::ServiceNotFound(name.clone()).into());
                }
            }

            for (name, service) in project.descriptor.services.iter() {
                if !services.is_empty() && !services.iter().any(|s| s == name) {
                    continue;
                }
                for port in service.ports.iter().flatten() {
                    let mapping = PortMapping::from_config(name, port)?;
                    println!("{}\t{}", name, mapping);
                }
            }
        }
    }

    Ok(())
}

/// Load and validate, printing warnings to stderr
fn load(options: &LoaderOptions, files: &[PathBuf]) -> Result<Project> {
    let project = Project::load(options, files).context("Invalid descriptor")?;
    for warning in &project.warnings {
        eprintln!("Warning: {}", warning);
    }
    Ok(project)
}
