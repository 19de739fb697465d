//! amr-machine CLI: oracle derivation and action replay over files.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use transition_amr::errors::{AmrError, Result};
use transition_amr::graph::gold::GoldGraph;
use transition_amr::pipeline::{derive_corpus, replay};
use transition_amr::types::{Action, MachineConfig, ReduceMode};
use transition_amr::vocab::VocabStats;

#[derive(Parser)]
#[command(name = "amr-machine", version, about = "Transition-based AMR oracle and replay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive oracle action sequences from aligned gold graphs.
    Oracle {
        /// JSON-lines file, one aligned gold graph per line.
        #[arg(long)]
        in_aligned_amr: PathBuf,

        /// Output: tab separated actions, one sentence per line.
        #[arg(long)]
        out_actions: PathBuf,

        /// Output: tab separated tokens, one sentence per line.
        #[arg(long)]
        out_tokens: PathBuf,

        /// Output: machine configuration as JSON.
        #[arg(long)]
        out_machine_config: Option<PathBuf>,

        /// Output prefix for `<prefix>.nodes` and `<prefix>.others` vocabulary counts.
        #[arg(long)]
        out_stats_vocab: Option<PathBuf>,

        /// Arc pointers are node ids instead of relative stack positions.
        #[arg(long)]
        absolute_stack_positions: bool,

        /// Use COPY for nodes whose label equals their token.
        #[arg(long)]
        use_copy: bool,

        /// Node reduction mode.
        #[arg(long, value_parser = ["all"])]
        reduce_nodes: Option<String>,
    },

    /// Rebuild graphs from tokens and action sequences.
    Play {
        /// Machine configuration written by `oracle`.
        #[arg(long)]
        in_machine_config: PathBuf,

        /// Tab separated tokens, one sentence per line.
        #[arg(long)]
        in_tokens: PathBuf,

        /// Tab separated actions, one sentence per line.
        #[arg(long)]
        in_actions: PathBuf,

        /// Output: JSON-lines file, one decoded graph per line.
        #[arg(long)]
        out_amr: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Oracle {
            in_aligned_amr,
            out_actions,
            out_tokens,
            out_machine_config,
            out_stats_vocab,
            absolute_stack_positions,
            use_copy,
            reduce_nodes,
        } => {
            let config = MachineConfig::default()
                .with_reduce_nodes(reduce_nodes.map(|_| ReduceMode::All))
                .with_absolute_stack_pos(absolute_stack_positions)
                .with_use_copy(use_copy);
            run_oracle(
                &in_aligned_amr,
                &out_actions,
                &out_tokens,
                out_machine_config.as_deref(),
                out_stats_vocab.as_deref(),
                config,
            )
        }
        Commands::Play {
            in_machine_config,
            in_tokens,
            in_actions,
            out_amr,
        } => run_play(&in_machine_config, &in_tokens, &in_actions, &out_amr),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line?);
    }
    Ok(lines)
}

fn write_lines(path: &Path, lines: impl IntoIterator<Item = String>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn run_oracle(
    input: &Path,
    out_actions: &Path,
    out_tokens: &Path,
    out_machine_config: Option<&Path>,
    out_stats_vocab: Option<&Path>,
    config: MachineConfig,
) -> Result<()> {
    let graphs = read_lines(input)?
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| GoldGraph::from_json_str(line))
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(sentences = graphs.len(), "loaded gold graphs");

    let mut runs = Vec::with_capacity(graphs.len());
    for (idx, result) in derive_corpus(&graphs, config).into_iter().enumerate() {
        let run = result.inspect_err(|_| tracing::error!(sentence = idx, "oracle failed"))?;
        runs.push(run);
    }

    let degraded = runs.iter().filter(|r| r.repair.is_degraded()).count();
    let inexact = runs.iter().filter(|r| !r.report.is_exact()).count();
    tracing::info!(
        sentences = runs.len(),
        force_aligned = degraded,
        not_reconstructed = inexact,
        "oracle finished"
    );

    write_lines(out_actions, runs.iter().map(|r| r.action_strings().join("\t")))?;
    write_lines(out_tokens, runs.iter().map(|r| r.tokens.join("\t")))?;

    if let Some(path) = out_machine_config {
        config.save(path)?;
    }

    if let Some(prefix) = out_stats_vocab {
        let mut stats = VocabStats::new(config, true);
        for run in &runs {
            stats.update_all(run.action_strings().iter().map(String::as_str));
        }
        stats.write(prefix)?;
        tracing::info!("{stats}");
    }

    Ok(())
}

fn split_tabs(line: &str) -> impl Iterator<Item = &str> {
    line.split('\t').filter(|s| !s.is_empty())
}

fn run_play(config_path: &Path, tokens_path: &Path, actions_path: &Path, out: &Path) -> Result<()> {
    let config = MachineConfig::load(config_path)?;
    let token_lines = read_lines(tokens_path)?;
    let action_lines = read_lines(actions_path)?;
    if token_lines.len() != action_lines.len() {
        return Err(AmrError::io(format!(
            "{} token lines but {} action lines",
            token_lines.len(),
            action_lines.len()
        )));
    }

    let mut graphs = Vec::with_capacity(token_lines.len());
    for (idx, (tokens, actions)) in token_lines.iter().zip(&action_lines).enumerate() {
        let actions = split_tabs(actions)
            .map(str::parse::<Action>)
            .collect::<Result<Vec<_>>>()?;
        let machine = replay(split_tabs(tokens), actions, config)
            .inspect_err(|_| tracing::error!(sentence = idx, "replay failed"))?;
        graphs.push(serde_json::to_string(&machine.graph())?);
    }

    tracing::info!(sentences = graphs.len(), "replayed action sequences");
    write_lines(out, graphs)
}
