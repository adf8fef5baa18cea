use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Most frequent recent senders in a mail folder", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the ranked sender histogram once
    List(ListArgs),
    /// Keep the histogram current and answer JSON requests on stdin
    Serve(SourceArgs),
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Directory tree of RFC 822 message files (overrides the config file)
    #[arg(short, long)]
    pub maildir: Option<PathBuf>,

    /// Config file to use instead of the platform default
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Lookback window in days for this run only
    #[arg(short, long)]
    pub lookback: Option<i64>,

    /// Show at most this many senders
    #[arg(short, long)]
    pub top: Option<usize>,

    /// Print the histogram as JSON
    #[arg(long)]
    pub json: bool,
}
