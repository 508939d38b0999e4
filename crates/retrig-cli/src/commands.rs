//! CLI command definitions.

use clap::Subcommand;
use retrig_core::Revision;

#[derive(Subcommand)]
pub enum Commands {
    /// Trigger a builder on one revision
    Trigger {
        /// Builder name
        builder: String,

        /// Revision to trigger on
        revision: Revision,

        /// Number of runs wanted
        #[arg(short, long, default_value_t = 1)]
        times: u32,

        /// Artifact URLs to run with instead of the build's
        #[arg(long, num_args = 1..)]
        files: Vec<String>,

        /// Do not trigger the build when it is missing
        #[arg(long)]
        no_build: bool,

        /// Log what would be requested without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Get a builder to a number of runs on every revision of a range
    Range {
        /// Builder name
        builder: String,

        /// First revision of the range
        #[arg(long)]
        from: Revision,

        /// Last revision of the range
        #[arg(long)]
        to: Revision,

        /// Number of runs wanted on each revision
        #[arg(short, long, default_value_t = 1)]
        times: u32,

        /// Log what would be requested without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Trigger a builder on the pushes before a revision that lack it
    Backfill {
        /// Builder name
        builder: String,

        /// Revision to backfill from
        revision: Revision,

        /// Maximum number of pushes to look at
        #[arg(short, long, default_value_t = 20)]
        max_revisions: usize,

        /// Stop at the last successful job and include the revision itself
        #[arg(long)]
        auto: bool,

        /// Log what would be requested without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Trigger every builder of a repository missing on a revision
    Missing {
        /// Repository name
        repo: String,

        /// Revision to fill in
        revision: Revision,

        /// Log what would be requested without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Trigger every builder of a test suite on a revision
    Suite {
        /// Repository name
        repo: String,

        /// Revision to trigger on
        revision: Revision,

        /// Suite name, e.g. talos
        suite: String,

        /// Number of runs wanted
        #[arg(short, long, default_value_t = 1)]
        times: u32,

        /// Log what would be requested without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Cancel a build request
    Cancel {
        /// Repository name
        repo: String,

        /// Backend request ID
        request_id: String,
    },

    /// List known builders
    Builders {
        /// Only list builders whose name contains this
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// List the revisions between two pushes
    Revisions {
        /// Repository name
        repo: String,

        /// First revision
        from: Revision,

        /// Last revision
        to: Revision,
    },

    /// Print the JSON schema of snapshot files
    Schema,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
