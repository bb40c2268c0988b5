// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command definitions and dispatch.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use varlog_config::{ConfigStore, EngineSettings, Overrides};
use varlog_config_fs::FsConfigStore;
use varlog_core::{extract_blocks, parse_block, Engine, EngineConfig, ParsedBlock};

use crate::render;
use crate::transcript::{load_transcript, read_input, StateFile};

#[derive(Parser)]
#[command(name = "varlog")]
#[command(version, about = "Apply, replay and inspect varlog state blocks")]
struct Cli {
    /// Directory holding `engine.json` (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    /// Override the block tag
    #[arg(long, global = true)]
    tag: Option<String>,
    /// Emit JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a transcript (JSON array of messages) floor by floor
    Apply {
        /// Transcript path, or `-` for stdin
        transcript: PathBuf,
        /// Load and save engine state (variables + history) here
        #[arg(long)]
        state: Option<PathBuf>,
        /// Checkpoint interval (0 disables)
        #[arg(long)]
        checkpoint_every: Option<u64>,
        /// After applying, drop history at and after this floor
        #[arg(long)]
        trim_from: Option<u64>,
        /// After applying (and trimming), rebuild state as of this floor
        #[arg(long, allow_hyphen_values = true)]
        restore_to: Option<i64>,
    },
    /// Print the blocks, rules and ops found in a text file
    Parse {
        /// Message text path, or `-` for stdin
        input: PathBuf,
    },
    /// Show or save the effective engine configuration
    Config {
        /// Write the effective configuration back to the config store
        #[arg(long)]
        save: bool,
    },
}

/// Parses arguments and runs the selected command.
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = FsConfigStore::open(cli.config_dir.as_deref());
    if let Err(err) = &store {
        tracing::warn!(%err, "config store unavailable; using defaults");
    }
    let settings = store.ok().map(EngineSettings::new);
    let mut overrides = Overrides {
        block_tag: cli.tag,
        checkpoint_every: None,
    };
    if let Commands::Apply {
        checkpoint_every, ..
    } = &cli.command
    {
        overrides.checkpoint_every = *checkpoint_every;
    }
    let config = resolve_config(settings.as_ref(), &overrides);

    match cli.command {
        Commands::Apply {
            transcript,
            state,
            trim_from,
            restore_to,
            ..
        } => run_apply(
            config,
            &transcript,
            state.as_deref(),
            trim_from,
            restore_to,
            cli.json,
        ),
        Commands::Parse { input } => run_parse(&config, &input, cli.json),
        Commands::Config { save } => {
            if save {
                save_config(settings.as_ref(), &config)?;
            }
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
            Ok(())
        }
    }
}

/// Stored settings plus overrides; defaults when no store could be opened.
fn resolve_config<S: ConfigStore>(
    settings: Option<&EngineSettings<S>>,
    overrides: &Overrides,
) -> EngineConfig {
    settings.map_or_else(
        || {
            let mut config = EngineConfig::default();
            overrides.apply(&mut config);
            config
        },
        |settings| settings.resolve(overrides),
    )
}

fn save_config<S: ConfigStore>(
    settings: Option<&EngineSettings<S>>,
    config: &EngineConfig,
) -> Result<()> {
    settings
        .context("config store unavailable")?
        .save(config)
        .context("save engine config")
}

fn run_apply(
    config: EngineConfig,
    transcript: &Path,
    state_path: Option<&Path>,
    trim_from: Option<u64>,
    restore_to: Option<i64>,
    as_json: bool,
) -> Result<()> {
    let messages = load_transcript(transcript)?;
    let state = match state_path {
        Some(path) => StateFile::load(path)?,
        None => StateFile::default(),
    };
    let (vars, meta) = state.into_hosts();
    let mut engine = Engine::new(config, vars, meta);

    let mut outcomes = Vec::with_capacity(messages.len());
    for (floor, text) in &messages {
        let outcome = engine
            .apply_floor(*floor, text)
            .with_context(|| format!("apply floor {floor}"))?;
        outcomes.push((*floor, outcome));
    }
    let trim = trim_from
        .map(|floor| engine.trim_from_floor(floor))
        .transpose()
        .context("trim history")?;
    let restore = restore_to
        .map(|floor| engine.restore_to_floor(floor))
        .transpose()
        .context("restore state")?;

    let vars = engine.snapshot_vars();
    let digest = engine.state_digest();
    let wal = engine.wal_floors()?;
    let checkpoints = engine.checkpoint_floors()?;

    let mut out = std::io::stdout().lock();
    if as_json {
        let floors: Vec<_> = outcomes
            .iter()
            .map(|(floor, outcome)| json!({"floor": floor, "outcome": outcome}))
            .collect();
        let doc = json!({
            "floors": floors,
            "trim": trim,
            "restore": restore,
            "state": vars,
            "digest": digest,
            "wal": wal,
            "checkpoints": checkpoints,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
    } else {
        writeln!(out, "{}", render::outcomes(&outcomes))?;
        if let Some(trim) = trim {
            writeln!(
                out,
                "trimmed: {} wal record(s), {} checkpoint(s)",
                trim.wal_removed, trim.checkpoints_removed
            )?;
        }
        if let Some(restore) = restore {
            let from = restore
                .used_checkpoint
                .map_or_else(|| "empty baseline".to_string(), |f| format!("checkpoint {f}"));
            writeln!(
                out,
                "restored from {from}, replayed {} floor(s)",
                restore.replayed
            )?;
        }
        writeln!(out, "{}", render::state(&vars))?;
        writeln!(out, "digest: {digest}")?;
    }

    if let Some(path) = state_path {
        let (vars, meta) = engine.into_parts();
        StateFile::from_hosts(vars, meta).save(path)?;
    }
    Ok(())
}

fn run_parse(config: &EngineConfig, input: &Path, as_json: bool) -> Result<()> {
    let text = read_input(input)?;
    let blocks = extract_blocks(&text, &config.block_tag);
    let parsed: Vec<ParsedBlock> = blocks.iter().copied().map(parse_block).collect();

    let mut out = std::io::stdout().lock();
    if as_json {
        let doc: Vec<_> = blocks
            .iter()
            .zip(&parsed)
            .map(|(inner, block)| {
                json!({
                    "text": inner,
                    "rules": block.rules,
                    "ops": block.ops,
                    "warnings": block.warnings,
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
        return Ok(());
    }
    if parsed.is_empty() {
        writeln!(out, "no <{}> blocks found", config.block_tag)?;
    }
    for (i, block) in parsed.iter().enumerate() {
        writeln!(out, "block {i}")?;
        if !block.rules.is_empty() {
            writeln!(out, "{}", render::rules(&block.rules))?;
        }
        writeln!(out, "{}", render::ops(&block.ops))?;
        for warning in &block.warnings {
            writeln!(out, "warning: {warning}")?;
        }
    }
    Ok(())
}
