use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vnetctl")]
#[command(version)]
#[command(about = "Create, list and delete virtual network adapters", long_about = None)]
pub(crate) struct Cli {
    /// Verbose diagnostic output on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create a new virtual network adapter
    Create {
        /// Adapter name. Fails if an adapter with this name already exists
        /// under the same hardware ID. Without it the backend picks a
        /// default name.
        #[arg(long)]
        name: Option<String>,

        /// Adapter hardware ID. Defaults to the legacy driver family
        /// (root\tap0901); use "Wintun" for the dynamic backend.
        #[arg(long)]
        hwid: Option<String>,
    },

    /// List virtual network adapters
    List {
        /// Limit the listing to one hardware ID. By default both legacy
        /// spellings and the dynamic family are listed.
        #[arg(long)]
        hwid: Option<String>,
    },

    /// Delete the specified adapter
    Delete {
        /// Adapter GUID or adapter name
        target: String,
    },
}
