//! Side-restricted extension filtering.
//!
//! Reads side markers from compiled classes and rewrites extension module
//! registration lists so classes meant for the other side are never handed
//! to the module loader.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use sidecheck::core::classify::MarkerHit;
use sidecheck::core::side::Side;
use sidecheck::exit_codes;
use sidecheck::filter::SideFilter;
use sidecheck::hooks::{
    DESCRIPTOR_PATH, DescriptorModuleFactory, ExtensionModule, ModuleFactory, SidedModuleFactory,
    filter_extension_record,
};
use sidecheck::io::config::{CONFIG_FILE, SidecheckConfig, load_config, write_config};
use sidecheck::io::properties::{PropertiesRecord, load_properties, write_properties};
use sidecheck::io::resolver::{Classpath, JarResolver};
use sidecheck::logging;
use sidecheck::scan::{ScanFailure, SideScanner, settle};

#[derive(Parser)]
#[command(
    name = "sidecheck",
    version,
    about = "Filter side-restricted extension classes using their compiled markers"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Config file (defaults to `sidecheck.toml` in the working directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Side to check against: controller|client|worker|server.
    #[arg(long, global = true)]
    side: Option<Side>,

    /// Class directory or jar to search. Repeatable; searched before config entries.
    #[arg(short = 'c', long = "classpath", global = true)]
    classpath: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter `sidecheck.toml` from the global flags.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Report whether each type may run on the side.
    Scan {
        /// Fully qualified type names.
        #[arg(required = true)]
        types: Vec<String>,

        /// Print a JSON report instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Filter a registration list and print the rewritten list.
    Filter {
        /// Type names separated by commas, semicolons or whitespace.
        raw: String,
    },
    /// Filter an extension module descriptor (file or jar).
    Module {
        /// Descriptor file, or a jar containing one.
        path: PathBuf,

        /// Rewrite the descriptor file in place.
        #[arg(long)]
        write: bool,

        /// Print the resulting module as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.global, force),
        Command::Scan { types, json } => cmd_scan(&cli.global, &types, json),
        Command::Filter { raw } => cmd_filter(&cli.global, &raw),
        Command::Module { path, write, json } => cmd_module(&cli.global, &path, write, json),
    }
}

fn config_path(global: &GlobalArgs) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Load the config file and apply the global flags on top of it.
fn load_settings(global: &GlobalArgs) -> Result<SidecheckConfig> {
    let path = config_path(global);
    if global.config.is_some() && !path.exists() {
        bail!("config file {} not found", path.display());
    }
    let mut cfg = load_config(&path)?;
    if global.side.is_some() {
        cfg.side = global.side;
    }
    let mut classpath = global.classpath.clone();
    classpath.append(&mut cfg.classpath);
    cfg.classpath = classpath;
    Ok(cfg)
}

fn require_side(cfg: &SidecheckConfig) -> Result<Side> {
    cfg.side
        .context("no side given: pass --side or set `side` in sidecheck.toml")
}

fn cmd_init(global: &GlobalArgs, force: bool) -> Result<i32> {
    let path = config_path(global);
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let cfg = SidecheckConfig {
        side: global.side,
        classpath: global.classpath.clone(),
        ..SidecheckConfig::default()
    };
    write_config(&path, &cfg)?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// One line of `sidecheck scan` output.
#[derive(Debug, Serialize)]
struct ScanReport {
    type_name: String,
    side: Side,
    permitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    restricted_to: Option<Side>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    markers: Vec<MarkerHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl ScanReport {
    fn render(&self) -> String {
        let verdict = if self.permitted {
            "permitted"
        } else {
            "excluded"
        };
        match (&self.failure, self.restricted_to) {
            (Some(failure), _) => format!("{}: {verdict} ({failure})", self.type_name),
            (None, Some(only)) => format!("{}: {verdict} ({only} only)", self.type_name),
            (None, None) => format!("{}: {verdict}", self.type_name),
        }
    }
}

fn cmd_scan(global: &GlobalArgs, types: &[String], json: bool) -> Result<i32> {
    let cfg = load_settings(global)?;
    let side = require_side(&cfg)?;
    let registry = cfg.registry();
    let classpath = Classpath::from_paths(&cfg.classpath)?;
    let scanner = SideScanner::new(&registry);

    let reports: Vec<ScanReport> = types
        .iter()
        .map(|type_name| {
            let outcome = scanner.inspect(type_name, &classpath, &side);
            let permitted = settle(type_name, &outcome);
            match outcome {
                Ok(classification) => ScanReport {
                    type_name: type_name.clone(),
                    side,
                    permitted,
                    restricted_to: classification.restricted_to(),
                    markers: classification.markers,
                    failure: None,
                },
                Err(err) => ScanReport {
                    type_name: type_name.clone(),
                    side,
                    permitted,
                    restricted_to: None,
                    markers: Vec::new(),
                    failure: Some(match err {
                        ScanFailure::NotFound => "not found".to_string(),
                        other => other.to_string(),
                    }),
                },
            }
        })
        .collect();

    if json {
        let payload = serde_json::to_string_pretty(&reports).context("serialize scan report")?;
        println!("{payload}");
    } else {
        for report in &reports {
            println!("{}", report.render());
        }
    }

    if reports.iter().all(|report| report.permitted) {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::EXCLUDED)
    }
}

fn cmd_filter(global: &GlobalArgs, raw: &str) -> Result<i32> {
    let cfg = load_settings(global)?;
    let side = require_side(&cfg)?;
    let registry = cfg.registry();
    let classpath = Classpath::from_paths(&cfg.classpath)?;
    let filter = SideFilter::new(SideScanner::new(&registry), &classpath, &side);
    println!("{}", filter.filter(raw));
    Ok(exit_codes::OK)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

fn cmd_module(global: &GlobalArgs, path: &Path, write: bool, json: bool) -> Result<i32> {
    let cfg = load_settings(global)?;
    let side = require_side(&cfg)?;
    let registry = cfg.registry();

    let mut classpath = Classpath::new();
    let mut record = if is_archive(path) {
        if write {
            bail!("--write needs a descriptor file, not an archive ({})", path.display());
        }
        let jar = JarResolver::open(path)?;
        let bytes = jar
            .read_entry(DESCRIPTOR_PATH)?
            .with_context(|| format!("{} has no {DESCRIPTOR_PATH}", path.display()))?;
        classpath.push(jar);
        // descriptors are read as ISO-8859-1, like java.util.Properties
        let contents: String = bytes.iter().copied().map(char::from).collect();
        PropertiesRecord::parse(&contents)
    } else {
        load_properties(path)?
    };
    for entry in &cfg.classpath {
        classpath.push_path(entry)?;
    }

    if write {
        let filter = SideFilter::new(SideScanner::new(&registry), &classpath, &side);
        filter_extension_record(&mut record, &filter);
        write_properties(path, &record)?;
        println!("rewrote {}", path.display());
        return Ok(exit_codes::OK);
    }

    let factory = SidedModuleFactory::with_registry(DescriptorModuleFactory, side, registry);
    let module = factory.new_module(record, &classpath)?;
    if json {
        let payload = serde_json::to_string_pretty(&module).context("serialize module")?;
        println!("{payload}");
    } else {
        print_module(&module);
    }
    Ok(exit_codes::OK)
}

fn print_module(module: &ExtensionModule) {
    let list = |classes: &[String]| {
        if classes.is_empty() {
            "(none)".to_string()
        } else {
            classes.join(", ")
        }
    };
    println!("module {} {}", module.name, module.version);
    println!("instance: {}", list(&module.instance_classes));
    println!("static: {}", list(&module.static_classes));
}
