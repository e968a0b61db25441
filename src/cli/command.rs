use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::services::terms::DEFAULT_MIN_FREQUENCY;

#[derive(Debug, Parser)]
#[command(name = "mod-localizer")]
#[command(about = "Localize Factorio mod text with an AI translation API")]
#[command(version)]
pub struct Cli {
    /// Mod root (the directory holding info.json and locale/)
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Config file [default: <root>/localizer.toml]
    #[arg(long, global = true, env = "LOCALIZER_CONFIG")]
    pub config: Option<PathBuf>,

    /// More logging: -v debug, -vv trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Translate missing or stale target-locale entries
    Translate(TranslateArgs),
    /// Copy source keys missing from the target files, untranslated
    Merge(MergeArgs),
    /// List frequent terms as glossary candidates
    Terms(TermsArgs),
    /// Report missing, untranslated or broken target entries
    Check(CheckArgs),
    /// Build the release zip
    Package(PackageArgs),
    /// Copy the mod into the local Factorio mods directory
    Install(InstallArgs),
}

#[derive(Debug, Args)]
pub struct TranslateArgs {
    /// Only this file of the source locale directory
    #[arg(long)]
    pub file: Option<String>,

    /// Do not write .backup copies of changed files
    #[arg(long)]
    pub no_backup: bool,

    /// Neither read nor update the translation memory
    #[arg(long)]
    pub no_memory: bool,

    /// List pending entries without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Override translation.batch_size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override translation.max_workers
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Do not write .backup copies of changed files
    #[arg(long)]
    pub no_backup: bool,
}

#[derive(Debug, Args)]
pub struct TermsArgs {
    /// Minimum number of occurrences
    #[arg(long, default_value_t = DEFAULT_MIN_FREQUENCY)]
    pub min_frequency: usize,

    /// Rows to print
    #[arg(long, default_value_t = 30)]
    pub top: usize,

    /// Translate candidates missing from the glossary and write them out
    #[arg(long)]
    pub translate: bool,

    /// Where translated candidates are written (relative to the mod root)
    #[arg(long, default_value = "glossary_candidates.txt")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Exit with an error when any issue is found
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct PackageArgs {
    /// Output directory [default: package.output_dir or the mod root]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip the mod structure check
    #[arg(long)]
    pub no_validate: bool,

    /// Package even when the structure check fails
    #[arg(long)]
    pub force: bool,

    /// Print the files that would be packed and stop
    #[arg(long)]
    pub list_files: bool,
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Factorio mods directory [default: <data dir>/Factorio/mods]
    #[arg(long)]
    pub mods_dir: Option<PathBuf>,

    /// Create the mods directory when it does not exist
    #[arg(long)]
    pub create: bool,
}
