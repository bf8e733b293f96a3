//! CLI command definitions using clap.
//!
//! - show: visible messages of a conversation
//! - loops: persisted loop statuses
//! - recover: seal loops orphaned by a crashed process
//! - render: render a delegation record stored as JSON

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Convoy - execution-loop coordination for multi-agent conversations
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the messages of finished loops
    Show {
        /// Conversation id
        conversation: String,

        /// Include messages of loops that have not finished
        #[arg(short, long)]
        all: bool,
    },

    /// List loops recorded in a conversation
    Loops {
        /// Conversation id
        conversation: String,
    },

    /// Seal loops left running by a crashed process
    Recover {
        /// Conversation id
        conversation: String,
    },

    /// Render a delegation record as XML
    Render {
        /// JSON file holding one delegation record
        file: PathBuf,

        /// Tag elements with abbreviated event ids
        #[arg(short, long)]
        debug: bool,
    },
}
