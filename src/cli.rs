//! CLI argument parsing.
//!
//! The binary is a thin wrapper over the library: every subcommand reads
//! JSON inputs, calls one engine entry point, and prints or writes JSON.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "patchgen",
    version,
    about = "Repair-candidate generation from learned and hand-written transforms",
    after_help = "Commands:\n  init                                   Write a default config\n  learn --pairs <file> --out <dir>       Generalize training pairs into a corpus\n  inspect --corpus <dir>                 Summarize transforms\n  generate --bundle <name> --site <file> Print candidates for a site\n  localize --project <dir> --failures <file>  Rank suspicious lines\n\nLogging is controlled by PATCHGEN_LOG (default: warn).",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Config file (default: <config dir>/patchgen/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Learn(LearnArgs),
    Inspect(InspectArgs),
    Generate(GenerateArgs),
    Localize(LocalizeArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Write a default config file")]
pub struct InitArgs {
    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Generalize training pairs and write every learned transform as a corpus")]
pub struct LearnArgs {
    /// JSON array of {"site": ..., "after": [...]} training pairs
    #[arg(long, value_name = "FILE")]
    pub pairs: PathBuf,

    /// Corpus directory to write
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Provenance recorded on each transform (default: the pairs file stem)
    #[arg(long, value_name = "NAME")]
    pub provenance: Option<String>,
}

/// Where transforms come from; exactly one source.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Corpus directory written by `learn`
    #[arg(long, value_name = "DIR")]
    pub corpus: Option<PathBuf>,

    /// Built-in template bundle (condition, null_guard, off_by_one, early_exit)
    #[arg(long, value_name = "NAME")]
    pub bundle: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize the transforms in a corpus or bundle")]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Apply a search space to one or more sites and print candidates")]
pub struct GenerateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// JSON site, or a JSON array of sites
    #[arg(long, value_name = "FILE")]
    pub site: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Rank suspicious source lines from failing-test stack traces")]
pub struct LocalizeArgs {
    /// Project root
    #[arg(long, value_name = "DIR")]
    pub project: PathBuf,

    /// JSON array of {"test": ..., "text": ...} captured failures
    #[arg(long, value_name = "FILE", required_unless_present = "rerun")]
    pub failures: Option<PathBuf>,

    /// Re-execute these failing tests in a scratch copy first (needs test_command)
    #[arg(long, value_name = "TEST", num_args = 1..)]
    pub rerun: Vec<String>,

    /// Keep at most this many locations
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
