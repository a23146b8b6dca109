use clap::{Parser, Subcommand};
use uuid::Uuid;

use coursegate::auth::kind::PrincipalKind;

/// coursegate: course marketplace API with revocable sessions
#[derive(Parser)]
#[command(name = "coursegate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (overrides COURSEGATE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Mint or inspect session tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Inspect or reset a principal's revoked tokens
    Revocation {
        #[command(subcommand)]
        command: RevocationCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a token for an existing principal
    Issue {
        #[arg(long)]
        principal: Uuid,
        /// user or admin
        #[arg(long)]
        kind: PrincipalKind,
    },
    /// Verify a token against both kinds and print its claims
    Verify { token: String },
}

#[derive(Subcommand)]
pub enum RevocationCommands {
    /// List revoked tokens that have not yet expired
    Show {
        #[arg(long)]
        principal: Uuid,
        #[arg(long)]
        kind: PrincipalKind,
    },
    /// Forget every revocation of a principal
    Clear {
        #[arg(long)]
        principal: Uuid,
        #[arg(long)]
        kind: PrincipalKind,
    },
}
