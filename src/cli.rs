//! CLI argument definitions using clap derive macros.

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Universal file downloader.
///
/// uget resolves submitted URLs, including one-click-hoster and mirror
/// pages, through pluggable providers into concrete files and downloads
/// them concurrently, with resume and skip semantics.
#[derive(Parser, Debug)]
#[command(name = "uget")]
#[command(author, version, about)]
#[command(
    after_help = "Exit codes:\n  0 = success\n  1 = operational failure (a download or resolve errored)\n  2 = usage error\n  3 = unimplemented"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and download the given URLs or URL-list files.
    Get(GetArgs),
    /// Resolve only: print length, name, URL and optional checksum.
    #[command(alias = "resolve")]
    Meta(MetaArgs),
    /// Manage provider accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
    /// Start the HTTP frontend.
    Server(ServerArgs),
    /// Spawn the HTTP frontend as a detached child, logging to server.log.
    Daemon(ServerArgs),
    /// Submit URLs to a running server.
    Push(PushArgs),
    /// List the files queued on a running server.
    Ps(HostArgs),
    /// Remove/cancel a file on a running server by id.
    Rm(RmArgs),
    /// Print the version.
    Version,
}

/// Arguments for `uget get`.
#[derive(ClapArgs, Debug, Clone)]
pub struct GetArgs {
    /// Treat the arguments as URLs rather than files containing URLs.
    #[arg(short = 'i', long)]
    pub inline: bool,

    /// Print what would be fetched instead of downloading.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not resume partial local files; start over from offset zero.
    #[arg(short = 'C', long)]
    pub no_continue: bool,

    /// Do not skip files whose local size already matches; delete and
    /// fetch them again.
    #[arg(short = 'S', long)]
    pub no_skip: bool,

    /// Number of concurrent download jobs.
    #[arg(short = 'j', long, default_value_t = 3, value_name = "N")]
    pub jobs: usize,

    /// URLs (with -i) or files containing one URL per line; `-` or no
    /// arguments reads from standard input.
    #[arg(value_name = "urls/files")]
    pub args: Vec<String>,
}

/// Arguments for `uget meta` (alias `resolve`).
#[derive(ClapArgs, Debug, Clone)]
pub struct MetaArgs {
    /// Treat the arguments as URLs rather than files containing URLs.
    #[arg(short = 'i', long)]
    pub inline: bool,

    /// Compare each resolved file against a local file of the same name,
    /// by size first and checksum second.
    #[arg(short = 'c', long)]
    pub compare: bool,

    /// With --compare: delete the local file on mismatch.
    #[arg(short = 'r', long, requires = "compare")]
    pub remove: bool,

    /// URLs (with -i) or files containing one URL per line; `-` or no
    /// arguments reads from standard input.
    #[arg(value_name = "urls/files")]
    pub args: Vec<String>,
}

/// Account management commands.
#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    /// Interactively add an account for a provider.
    Add {
        /// Provider name; prompted for when omitted.
        provider: Option<String>,
    },
    /// List stored accounts, marking disabled ones.
    List {
        /// Restrict the listing to one provider.
        provider: Option<String>,
    },
    /// Re-enable a disabled account.
    Enable {
        /// Provider name; prompted for when omitted.
        provider: Option<String>,
    },
    /// Disable an account without deleting it.
    Disable {
        /// Provider name; prompted for when omitted.
        provider: Option<String>,
    },
}

/// Arguments for `uget server` and `uget daemon`.
#[derive(ClapArgs, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on. Click'n'Load v2 helpers expect 9666.
    #[arg(short = 'p', long, default_value_t = 9666)]
    pub port: u16,

    /// Address to bind. Non-loopback clients are rejected regardless.
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    pub bind: String,
}

/// Arguments for `uget push`.
#[derive(ClapArgs, Debug, Clone)]
pub struct PushArgs {
    /// Server to talk to.
    #[arg(long, default_value = "localhost:9666")]
    pub host: String,

    /// Treat the arguments as URLs rather than files containing URLs.
    #[arg(short = 'i', long)]
    pub inline: bool,

    /// URLs (with -i) or files containing one URL per line; `-` or no
    /// arguments reads from standard input.
    #[arg(value_name = "urls/files")]
    pub args: Vec<String>,
}

/// Arguments for commands that only need a server address.
#[derive(ClapArgs, Debug, Clone)]
pub struct HostArgs {
    /// Server to talk to.
    #[arg(long, default_value = "localhost:9666")]
    pub host: String,
}

/// Arguments for `uget rm`.
#[derive(ClapArgs, Debug, Clone)]
pub struct RmArgs {
    /// Server to talk to.
    #[arg(long, default_value = "localhost:9666")]
    pub host: String,

    /// File id (or unique prefix of at least four characters).
    pub id: String,
}
