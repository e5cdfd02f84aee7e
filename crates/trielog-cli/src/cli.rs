use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "trielog",
    about = "trielog: content-addressed trie node store on an append-only log",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory; overrides `data_dir` from the config file.
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store files as nodes keyed by their content hash
    Put(PutArgs),
    /// Look up a node by key
    Get(GetArgs),
    /// Number of records in the store's stream
    Count,
    /// List stored nodes in log order
    Replay(ReplayArgs),
    /// Show cache, index and log statistics
    Stats,
}

#[derive(Args)]
pub struct PutArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Node key as hex, with or without `0x`.
    pub key: String,
    /// Do not add the node to the read cache.
    #[arg(long)]
    pub skip_cache: bool,
    /// Write the node's bytes to this file.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReplayArgs {
    #[arg(long, default_value = "0")]
    pub from: u64,
    /// Byte budget per log read.
    #[arg(long, default_value = "1048576")]
    pub max_bytes: usize,
    /// Stop after this many nodes.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_put() {
        let cli = Cli::try_parse_from(["trielog", "put", "a.bin", "b.bin"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.files, vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn put_requires_files() {
        assert!(Cli::try_parse_from(["trielog", "put"]).is_err());
    }

    #[test]
    fn parse_get_with_flags() {
        let cli = Cli::try_parse_from([
            "trielog",
            "--data-dir",
            "/tmp/nodes",
            "get",
            "0xabcd",
            "--skip-cache",
            "--out",
            "node.bin",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/nodes")));
        if let Command::Get(args) = cli.command {
            assert_eq!(args.key, "0xabcd");
            assert!(args.skip_cache);
            assert_eq!(args.out, Some(PathBuf::from("node.bin")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_replay_defaults() {
        let cli = Cli::try_parse_from(["trielog", "replay", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        if let Command::Replay(args) = cli.command {
            assert_eq!(args.from, 0);
            assert_eq!(args.max_bytes, 1024 * 1024);
            assert_eq!(args.limit, None);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_count_and_stats() {
        assert!(matches!(
            Cli::try_parse_from(["trielog", "count"]).unwrap().command,
            Command::Count
        ));
        assert!(matches!(
            Cli::try_parse_from(["trielog", "-v", "stats"]).unwrap().command,
            Command::Stats
        ));
    }
}
