use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Converge local users, groups, SSH keys, linger and quotas to a declarative config",
    long_about = None
)]
#[command(subcommand_negates_reqs = true)]
pub struct Cli {
    /// Desired-state document (JSON, or TOML by extension); `-` reads JSON from stdin
    #[arg(
        short,
        long,
        env = "PROVISIONER_CONFIG",
        value_name = "PATH",
        required_unless_present = "print_schema"
    )]
    pub config: Option<String>,

    /// Show the changes without applying them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Apply without asking for confirmation
    #[arg(short = 'y', long)]
    pub no_confirm: bool,

    /// Log every action and show SSH key diffs
    #[arg(short, long)]
    pub debug: bool,

    /// Parallel operations inside one phase
    #[arg(short, long, default_value = "4", value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: u16,

    /// With --dry-run, print the change set as JSON
    #[arg(long, requires = "dry_run")]
    pub json: bool,

    /// Print the configuration schema and exit
    #[arg(long)]
    pub print_schema: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
