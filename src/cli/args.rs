//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::domain::{Level, SiteId, UserId};

/// Partner tree queries, qualification checks and performance reports
#[derive(Parser, Debug)]
#[command(name = "ptree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Partner feed (`[[partner]]` tables), overrides `feed_path`
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub feed: Option<PathBuf>,

    /// Ledger (`[[sale]]`/`[[bonus]]` tables), overrides `ledger_path`
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub ledger: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List team members below a partner
    Family {
        user_id: UserId,
        /// Direct recruits only
        #[arg(long)]
        direct: bool,
        /// Include the partner itself
        #[arg(long = "self")]
        include_self: bool,
    },

    /// List recruits at or above the partner's level
    Surpassed {
        user_id: UserId,
        #[arg(long)]
        direct: bool,
    },

    /// List surpassed recruits together with their teams
    #[command(name = "surpassed-team")]
    SurpassedTeam {
        user_id: UserId,
        #[arg(long)]
        direct: bool,
        /// Team levels below each surpassed recruit, 0 for all (default: config)
        #[arg(long)]
        depth: Option<usize>,
    },

    /// List recruits at BQ level (or another level with --level)
    Bq {
        user_id: UserId,
        #[arg(long)]
        direct: bool,
        /// Leave out recruits that surpassed the partner
        #[arg(long)]
        ignore_surpassed: bool,
        #[arg(long, value_enum, default_value_t = LevelArg::Bq)]
        level: LevelArg,
    },

    /// Show the recruiter chain up to the root
    #[command(name = "bred-by")]
    BredBy { user_id: UserId },

    /// List the performance team of a partner
    Team {
        user_id: UserId,
        #[arg(long)]
        direct: bool,
        #[arg(long)]
        exclude_self: bool,
    },

    /// Show one partner's state as TOML
    Show { user_id: UserId },

    /// Render a subtree (all roots if no id is given)
    Tree {
        user_id: Option<UserId>,
        /// Maximum depth to render
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Group partners by master site
    Sites {
        /// Only these master sites
        #[arg(long = "master", value_delimiter = ',')]
        masters: Vec<SiteId>,
        /// Only these slave sites
        #[arg(long = "slave", value_delimiter = ',')]
        slaves: Vec<SiteId>,
        /// Only partners that joined in the window
        #[arg(long)]
        new: bool,
        /// Also sum GMV per site over the window
        #[arg(long)]
        gmv: bool,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Run a qualification checker pass against the loaded tree
    Upgrade {
        #[arg(value_enum)]
        level: UpgradeTarget,
    },

    /// GMV per partner, or per team with --team
    Gmv {
        #[arg(required = true, value_delimiter = ',')]
        user_ids: Vec<UserId>,
        #[arg(long)]
        team: bool,
        #[arg(long)]
        exclude_self: bool,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Bonus received per category
    Bonus {
        #[arg(required = true, value_delimiter = ',')]
        user_ids: Vec<UserId>,
        /// Recruitment bonus generated by these partners only (single recipient)
        #[arg(long = "bred-from", value_delimiter = ',')]
        bred_from: Vec<UserId>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Compare a team's newly joined partners against the whole team
    Cohort {
        user_id: UserId,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,
}

/// Calendar-day window; `--month` wins over `--from/--to`, the default is the
/// trailing 30 days.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// First day, YYYY-MM-DD
    #[arg(long, requires = "to")]
    pub from: Option<String>,
    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long, requires = "from")]
    pub to: Option<String>,
    /// Whole calendar month, YYYY-MM
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub month: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelArg {
    None,
    Bq,
    B1,
    B2,
}

impl From<LevelArg> for Level {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::None => Level::None,
            LevelArg::Bq => Level::BQ,
            LevelArg::B1 => Level::B1,
            LevelArg::B2 => Level::B2,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeTarget {
    Bq,
    B1,
    B2,
    /// BQ, then B1, then B2
    All,
}

impl UpgradeTarget {
    pub fn levels(self) -> Vec<Level> {
        match self {
            UpgradeTarget::Bq => vec![Level::BQ],
            UpgradeTarget::B1 => vec![Level::B1],
            UpgradeTarget::B2 => vec![Level::B2],
            UpgradeTarget::All => vec![Level::BQ, Level::B1, Level::B2],
        }
    }
}
