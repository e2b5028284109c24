use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "murmur")]
#[command(about = "Read and publish on nostr relays from the command line")]
pub struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pub pretty: bool,

    /// Path to JSON config file (relays, dataDir, timeouts, credentials)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Keep the session in the OS keychain
    #[arg(long)]
    pub keyring: bool,

    /// Encrypt the key at rest on login (NIP-49), or unlock a stored one
    #[arg(long)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// Log in with a secret key, or generate a new identity when none is given
    Login {
        /// nsec or 64-char hex secret key
        key: Option<String>,
        /// Treat KEY as a public key and open a read-only session
        #[arg(long, requires = "key")]
        read_only: bool,
    },

    /// Forget the stored session
    Logout,

    /// Show the current session
    Whoami,

    /// Recent notes, or notes from people you follow
    Timeline {
        #[arg(long)]
        following: bool,
    },

    /// People you exchanged direct messages with
    Contacts,

    /// Profile metadata
    Profile {
        /// npub or hex public key
        pubkey: String,
    },

    /// Notes written by one author
    Notes {
        /// npub or hex public key
        pubkey: String,
    },

    /// Trending hashtags and who to follow
    Trending,

    /// Search recent notes and their authors' profiles ("a+b" requires both)
    Search { query: String },

    /// Mentions, reactions, reposts and follows aimed at you
    Notifications,

    /// Direct message thread with one person
    Conversation {
        /// npub or hex public key
        pubkey: String,
    },

    /// Publish a text note
    Post { content: String },

    /// React to a note
    React {
        /// Note id (hex or note1...)
        event_id: String,
        /// Reaction content, "+" when omitted
        #[arg(default_value = "+")]
        symbol: String,
    },

    /// Repost a note
    Repost {
        /// Note id (hex or note1...)
        event_id: String,
    },

    /// Send an encrypted direct message
    Dm {
        /// npub or hex public key
        pubkey: String,
        content: String,
    },

    /// Follow someone
    Follow {
        /// npub or hex public key
        pubkey: String,
    },

    /// Stop following someone
    Unfollow {
        /// npub or hex public key
        pubkey: String,
    },
}

impl CliCommand {
    /// Session commands work offline; everything else needs relays.
    pub fn needs_relays(&self) -> bool {
        !matches!(
            self,
            CliCommand::Login { .. } | CliCommand::Logout | CliCommand::Whoami
        )
    }
}
