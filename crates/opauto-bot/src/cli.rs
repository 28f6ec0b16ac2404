//! Command-line interface.

use clap::{Args as ClapArgs, Parser, Subcommand};
use opauto_core::{parse_plan_date, RunParams};

use crate::error::AppResult;

/// Production-order round automation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Configuration file path (can also be set via OPAUTO_CONFIG env var)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// `serve` when no subcommand is given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the operator dashboard
    Serve,
    /// Create orders for a range of rounds from the console
    Run(RunArgs),
    /// Check the planning database and ERP connections
    Check,
    /// Count pending planning records
    Count(RangeArgs),
}

/// Day, line and rounds a command applies to.
#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct RangeArgs {
    /// Plan date, YYYY-MM-DD or DD/MM/YYYY
    #[arg(long)]
    pub date: String,
    /// Production line
    #[arg(long)]
    pub line: i32,
    /// First round
    #[arg(long)]
    pub from: i32,
    /// Last round (inclusive)
    #[arg(long)]
    pub to: i32,
}

impl RangeArgs {
    pub fn to_params(&self) -> AppResult<RunParams> {
        let plan_date = parse_plan_date(&self.date)?;
        Ok(RunParams::new(plan_date, self.line, self.from, self.to)?)
    }
}

#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    #[command(flatten)]
    pub range: RangeArgs,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
