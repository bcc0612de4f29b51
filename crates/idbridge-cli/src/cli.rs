use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "idbridge")]
#[command(about = "idbridge CLI: cached user, group and password lookups against an identity realm")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML configuration (defaults to ./idbridge.toml when present)
    #[arg(short, long, global = true, env = "IDBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find users
    Users(UsersArgs),
    /// Find groups
    Groups(GroupsArgs),
    /// Check a user's password
    CheckPassword(CheckPasswordArgs),
}

#[derive(clap::Args, Default)]
pub struct UsersArgs {
    /// User id (interpreted per `user_id_attribute`)
    #[arg(long)]
    pub id: Option<String>,
    /// Exact e-mail address
    #[arg(long)]
    pub email: Option<String>,
    /// First name pattern, `%` matches any run of characters
    #[arg(long)]
    pub first_name_like: Option<String>,
    /// Last name pattern, `%` matches any run of characters
    #[arg(long)]
    pub last_name_like: Option<String>,
    /// Only members of this group
    #[arg(long)]
    pub group: Option<String>,
    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(clap::Args, Default)]
pub struct GroupsArgs {
    /// Group id (or path when `group_path_as_id` is set)
    #[arg(long)]
    pub id: Option<String>,
    /// Name pattern, `%` matches any run of characters
    #[arg(long)]
    pub name_like: Option<String>,
    /// Only groups of this user
    #[arg(long)]
    pub member: Option<String>,
    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(clap::Args, Default)]
pub struct PageArgs {
    /// Index of the first result
    #[arg(long, default_value_t = 0)]
    pub first: usize,
    /// Maximum number of results
    #[arg(long)]
    pub max: Option<usize>,
    /// Print only the number of matches
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args)]
pub struct CheckPasswordArgs {
    /// User id (interpreted per `user_id_attribute`)
    pub user_id: String,
    /// Password to check
    #[arg(long, env = "IDBRIDGE_PASSWORD", hide_env_values = true)]
    pub password: String,
}
