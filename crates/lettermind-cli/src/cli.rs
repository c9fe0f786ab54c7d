//! Command-line arguments.
//!
//! Subcommands:
//! - `login`, `register`, `demo`, `google` - sign in
//! - `logout` - forget the saved session
//! - `status` - show who is signed in
//! - `keys show` / `keys set` - per-provider API keys

use clap::{Parser, Subcommand};
use lettermind_core::Provider;

#[derive(Parser, Debug)]
#[command(name = "lettermind")]
#[command(author, version, about = "Account and API key management for lettermind", long_about = None)]
pub struct Cli {
    /// Backend URL (overrides the config file)
    #[arg(long, env = "LETTERMIND_BACKEND_URL")]
    pub backend_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email (defaults to the last one used)
        #[arg(short, long)]
        email: Option<String>,
        /// Password; prompted for when not set
        #[arg(long, env = "LETTERMIND_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        /// Providers to enter an API key for during sign-up
        #[arg(short, long = "key", value_name = "PROVIDER")]
        keys: Vec<Provider>,
    },

    /// Sign in as a demo user
    Demo {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },

    /// Sign in with a Google identity token
    Google {
        #[arg(long, env = "LETTERMIND_GOOGLE_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Sign out and remove the saved session
    Logout,

    /// Show the signed-in user
    #[command(alias = "whoami")]
    Status,

    /// API key management
    #[command(subcommand)]
    Keys(KeysCommands),
}

#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Show which providers have a key configured
    Show,

    /// Enter new keys for one or more providers
    Set {
        /// Providers to update (gemini, openai, anthropic, openrouter)
        #[arg(required = true, value_name = "PROVIDER")]
        providers: Vec<Provider>,
    },

    /// Set only the Gemini key, through its dedicated endpoint
    Gemini,
}
