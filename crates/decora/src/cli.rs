//! Clap derive structures for the `decora` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// decora -- control Leviton Decora Smart Wi-Fi devices
#[derive(Debug, Parser)]
#[command(
    name = "decora",
    version,
    about = "Control Leviton Decora Smart Wi-Fi devices from the command line",
    long_about = "Talks to the My Leviton cloud: log in once, then list,\n\
        inspect, switch, and dim your devices, or watch live state changes.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DECORA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, env = "DECORA_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in to the My Leviton cloud and store the session
    Login(LoginArgs),

    /// Forget the stored session
    Logout,

    /// List all devices
    #[command(alias = "ls")]
    Devices,

    /// Show one device in detail
    Get(GetArgs),

    /// Change device state (power, brightness, fan speed)
    Set(SetArgs),

    /// Stream live device state changes to the terminal
    Watch,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Account email (prompted when omitted)
    #[arg(long, short = 'e', env = "DECORA_EMAIL")]
    pub email: Option<String>,

    /// Two-factor authentication code, if the account requires one
    #[arg(long)]
    pub code: Option<String>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Device id
    pub device: String,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Device id
    pub device: String,

    /// Turn the device on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Turn the device off
    #[arg(long, conflicts_with_all = ["on", "brightness", "fan_speed"])]
    pub off: bool,

    /// Brightness level 0-100 (dimmers; implies --on)
    #[arg(long, short = 'b')]
    pub brightness: Option<i64>,

    /// Fan speed level (fan controllers; implies --on)
    #[arg(long)]
    pub fan_speed: Option<i64>,
}
