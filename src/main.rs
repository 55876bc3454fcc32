//! CLI entry point for the campus-session tool.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};

use campus_session::{
    Account, Credentials, FileStore, HttpTransport, PortalAccount, SessionConfig, SsoAccount,
    to_proxy_url,
};

mod cli;

use cli::{Args, Command, PortalKind};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // proxy-url is a pure rewrite; it never touches the store.
    if let Command::ProxyUrl { url, base } = &args.command {
        let rewritten = to_proxy_url(base, url)?;
        println!("{rewritten}");
        return Ok(());
    }

    let store = Arc::new(FileStore::open().context("failed to open the session store")?);
    let transport = Arc::new(HttpTransport::new());
    let mut config = SessionConfig::load(store.as_ref());

    match args.command {
        Command::Login {
            portal,
            username,
            password,
            vpn,
            remember,
        } => {
            config.use_vpn = config.use_vpn || vpn;
            let credentials = Credentials::new(username, password);

            let logged_in = match portal {
                PortalKind::Sso => {
                    let mut account = SsoAccount::new(store.clone(), transport, &config);
                    let logged_in = account.login(Some(credentials), remember).await?;
                    // A direct login that only succeeded through the VPN
                    // fallback flips the mode; remember it.
                    config.use_vpn = account.uses_vpn();
                    logged_in
                }
                PortalKind::Eas => {
                    let mut account = PortalAccount::new(store.clone(), transport, &config);
                    account.login(Some(credentials), remember).await?
                }
            };

            if !logged_in {
                bail!("login failed; check the account, password, and network");
            }
            if let Err(error) = config.save(store.as_ref()) {
                warn!(%error, "failed to persist session configuration");
            }
            info!("login succeeded");
            println!("logged in");
        }

        Command::Status => {
            let mut sso = SsoAccount::new(store.clone(), transport.clone(), &config);
            let mut eas = PortalAccount::new(store.clone(), transport, &config);

            let sso_live = sso.ensure_logged_in().await.unwrap_or(false);
            let eas_live = eas.ensure_logged_in().await.unwrap_or(false);

            println!("sso: {}", if sso_live { "logged in" } else { "needs login" });
            println!("eas: {}", if eas_live { "logged in" } else { "needs login" });
        }

        Command::Logout => {
            let mut sso = SsoAccount::new(store.clone(), transport.clone(), &config);
            let mut eas = PortalAccount::new(store.clone(), transport, &config);
            sso.logout();
            eas.logout();
            println!("sessions cleared");
        }

        Command::Fetch { portal, path } => {
            let body = match portal {
                PortalKind::Sso => {
                    let mut account = SsoAccount::new(store.clone(), transport, &config);
                    account.authenticated_get(&path).await?.body
                }
                PortalKind::Eas => {
                    let mut account = PortalAccount::new(store.clone(), transport, &config);
                    account.authenticated_get(&path).await?.body
                }
            };
            println!("{body}");
        }

        Command::ProxyUrl { .. } => unreachable!("handled before the store is opened"),
    }

    Ok(())
}
