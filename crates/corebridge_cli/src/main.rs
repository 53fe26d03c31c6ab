use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use corebridge_config::{BridgeConfig, env};
use corebridge_runtime::CoreVal;
use corebridge_runtime::bridge::{
    BIND_EXPORTS_FUNCTION, CoreSignature, InitError, Runtime, RuntimeConfig, UnlinkedImports,
    parse_return,
};
use corebridge_runtime::engine::{Engine, GuestMemory};
use corebridge_runtime::local::{LocalEngine, Value};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Inspect and smoke-test core ABI bridge manifests.
#[derive(Parser)]
#[command(name = "corebridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the export table of a manifest against stub exports.
    Check {
        #[command(flatten)]
        source: ManifestSource,
        /// Also drive one call/post_call cycle per export.
        #[arg(long)]
        call: bool,
    },
    /// Print the core signature of every export.
    Signatures {
        #[command(flatten)]
        source: ManifestSource,
    },
    /// Report which manifest environment variables are set.
    Doctor {
        /// Show the decoded manifest when it is complete.
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct ManifestSource {
    /// Path to the manifest YAML file.
    config: Option<PathBuf>,
    /// Read the manifest from environment variables.
    #[arg(long, conflicts_with = "config")]
    env: bool,
}

impl ManifestSource {
    fn load(&self) -> Result<BridgeConfig> {
        match (&self.config, self.env) {
            (_, true) => BridgeConfig::from_env().context("Failed to read manifest from env"),
            (Some(path), false) => BridgeConfig::load(path)
                .with_context(|| format!("Failed to load manifest {}", path.display())),
            (None, false) => anyhow::bail!("no manifest given. pass a path or --env"),
        }
    }
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "corebridge_runtime=info,corebridge_cli=info") };
    }

    let subscriber = tracing_subscriber::Registry::default()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::from_default_env());
    if let Err(err) = subscriber.try_init() {
        eprintln!("failed to install logger: {err}");
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Check { source, call } => check(&source, call),
        Command::Signatures { source } => signatures(&source),
        Command::Doctor { verbose } => Ok(doctor(verbose)),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn check(source: &ManifestSource, call: bool) -> Result<ExitCode> {
    let manifest = source.load()?;
    let config = RuntimeConfig::create_from_bridge_config(&manifest);

    let mut runtime = Runtime::initialize(stub_engine(&config), &config, &mut UnlinkedImports)?;
    let init = runtime.check_init();
    if init != InitError::None {
        // Re-parse to name the offending export.
        for export in &config.exports {
            if let Err(err) = CoreSignature::parse(&export.args, &export.ret, export.retsize) {
                println!("{}: {err}", export.name);
                break;
            }
        }
        println!("init failed: {init:?} ({})", init as u32);
        return Ok(ExitCode::FAILURE);
    }

    if call {
        for index in 0..runtime.functions().len() {
            let index = index as u32;
            let argptr = zeroed_args(&mut runtime, index)?;
            let ret = runtime.call(index, argptr)?;
            runtime.post_call(index)?;
            tracing::debug!("[{index}] returned {ret:#x}");
        }
        let leaked = runtime.engine().memory().live_allocations();
        if leaked != 0 {
            println!("{leaked} allocation(s) outlived their call");
            return Ok(ExitCode::FAILURE);
        }
    }

    println!("ok: {} export(s) bound", runtime.functions().len());
    Ok(ExitCode::SUCCESS)
}

fn signatures(source: &ManifestSource) -> Result<ExitCode> {
    let manifest = source.load()?;
    let mut has_error = false;
    for (index, (name, export)) in manifest.exports.iter().enumerate() {
        match CoreSignature::parse(&export.args, &export.ret, export.retsize) {
            Ok(sig) => println!("[{index}] {name} {sig} (retsize {})", sig.retsize),
            Err(err) => {
                println!("[{index}] {name} <{err}>");
                has_error = true;
            }
        }
    }

    if has_error {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn doctor(verbose: bool) -> ExitCode {
    let mut has_error = false;

    println!("corebridge {}", env!("CARGO_PKG_VERSION"));

    for key in [
        env::SOURCE_NAME,
        env::DEBUG,
        env::FEATURE_CLOCKS,
        env::IMPORT_CNT,
        env::EXPORT_CNT,
    ] {
        match std::env::var(key) {
            Ok(v) => println!("{key}: {v}"),
            Err(_) => {
                println!("{key}: not set");
                has_error = true;
            }
        }
    }

    if has_error {
        println!("  - note: the env manifest is incomplete, pass a YAML manifest instead");
        return ExitCode::FAILURE;
    }

    match BridgeConfig::from_env() {
        Ok(manifest) => {
            println!(
                "manifest: {} import(s), {} export(s)",
                manifest.imports.len(),
                manifest.exports.len()
            );
            if verbose {
                for (name, import) in &manifest.imports {
                    println!("  - import {name} (argcnt {})", import.argcnt);
                }
                for (name, export) in &manifest.exports {
                    println!("  - export {name} ({}) -> {}", export.args, export.ret);
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("manifest: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Engine whose `bindExports` binds every configured export to an async stub
/// resolving to a zero of the declared return kind.
fn stub_engine(config: &RuntimeConfig) -> LocalEngine {
    let exports: Vec<(String, Value)> = config
        .exports
        .iter()
        .map(|export| {
            let zero = match parse_return(&export.ret) {
                Ok((_, Some(CoreVal::I64))) => Value::BigInt(0),
                Ok((false, Some(_))) => Value::number(0.0),
                _ => Value::Undefined,
            };
            (export.name.clone(), zero)
        })
        .collect();

    let mut engine = LocalEngine::new();
    engine.on_pre_initialize(move |engine| {
        engine.define_function(BIND_EXPORTS_FUNCTION, move |engine, _args| {
            for (name, zero) in &exports {
                let zero = zero.clone();
                engine.define_async_function(name.clone(), move |_engine, _args| Ok(zero.clone()));
            }
            Ok(Value::Undefined)
        });
        Ok(())
    });
    engine
}

/// Lower a zero-filled argument buffer for export `index`.
fn zeroed_args(runtime: &mut Runtime<LocalEngine>, index: u32) -> Result<u32> {
    let sig = &runtime.functions()[index as usize].sig;
    if sig.paramptr || sig.params.is_empty() {
        return Ok(0);
    }
    let size: u32 = sig.params.iter().map(|kind| kind.byte_width()).sum();
    let argptr = runtime.cabi_realloc(0, 0, 8, size)?;
    runtime
        .engine_mut()
        .memory_mut()
        .write(argptr, &vec![0; size as usize])?;
    Ok(argptr)
}
