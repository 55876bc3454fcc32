//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};

use campus_session::DEFAULT_PROXY_BASE;

/// Authenticate against campus web portals and keep the sessions alive.
///
/// Sessions (cookies) and optionally credentials are persisted encrypted
/// under the user config directory, so later invocations re-login
/// automatically.
#[derive(Parser, Debug)]
#[command(name = "campus-session")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Which portal a command targets.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalKind {
    /// The teaching-affairs system.
    Eas,
    /// The unified campus SSO ("pass") portal.
    Sso,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in to a portal and persist the session cookies.
    Login {
        /// Portal to log in to.
        #[arg(long, value_enum, default_value = "sso")]
        portal: PortalKind,

        /// Login name.
        #[arg(short, long)]
        username: String,

        /// Password.
        #[arg(short, long)]
        password: String,

        /// Route traffic through the VPN gateway.
        #[arg(long)]
        vpn: bool,

        /// Persist the credentials for automatic re-login.
        #[arg(long)]
        remember: bool,
    },

    /// Check whether the persisted sessions are still live.
    Status,

    /// Clear the persisted sessions for both portals.
    Logout,

    /// Issue an authenticated GET and print the response body.
    Fetch {
        /// Portal to fetch from.
        #[arg(long, value_enum, default_value = "sso")]
        portal: PortalKind,

        /// Path (or absolute URL) to fetch.
        path: String,
    },

    /// Print the VPN-rewritten form of a URL.
    ProxyUrl {
        /// The URL to rewrite.
        url: String,

        /// VPN gateway base URL.
        #[arg(long, default_value = DEFAULT_PROXY_BASE)]
        base: String,
    },
}
