use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(version = "0.1.0")]
#[command(about = "Autonomous strategy scan scheduler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one scan cycle over all active strategies
    Scan,
    /// Run scan cycles on the configured period until interrupted
    Daemon,
    /// Confirm the pending trade of a session
    Confirm {
        /// Session id holding the pending trade
        session: String,
    },
    /// List active strategies and their recent runs
    Strategies {
        /// User whose strategies to list
        #[arg(short, long)]
        user: String,
        /// Number of recent run records to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
}
