//! Console session example
//!
//! Signs in to the admin panel, mounts a gate on a protected page and keeps
//! the session alive until interrupted.
//!
//! Usage:
//!   API_URL=localhost:8080 ADMIN_USERNAME=admin ADMIN_PASSWORD=secret \
//!     cargo run --example console_session

use panel_session::{ConsoleConfig, ConsolePanels, FileStorage, GateView};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration
    let console = match std::env::var("CONSOLE_CONFIG") {
        Ok(path) => ConsoleConfig::load(std::path::Path::new(&path))?,
        Err(_) => ConsoleConfig::from_env()?,
    };
    let username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("ADMIN_PASSWORD").unwrap_or_default();
    let storage_path = std::env::var("SESSION_FILE")
        .unwrap_or_else(|_| ".panel-session/session.json".to_string());

    println!("=== Panel Session Example ===");
    println!("API URL: {}", console.api_url);
    println!("Session file: {}", storage_path);
    println!();

    let panels = ConsolePanels::new(&console, Arc::new(FileStorage::new(storage_path)))?;
    let admin = panels.admin;

    if admin.has_active_session() {
        println!("Reusing stored admin session");
    } else {
        println!("Signing in as {}...", username);
        if let Err(e) = admin.sign_in(&username, &password).await {
            println!("! {}", e);
            return Ok(());
        }
        println!("Signed in");
    }
    println!();

    let (navigator, mut redirects) = mpsc::unbounded_channel::<String>();
    let gate = admin.mount("/admin/users", Arc::new(navigator.clone()), None);
    let mut states = gate.subscribe();

    println!("Session checks run every {:?}", admin.config().check_interval());
    println!("Press Ctrl+C to log out and exit");
    println!();

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match gate.view() {
                    GateView::Loading(text) => println!("[{:?}] {}", state, text),
                    GateView::Children => println!("[{:?}] rendering {}", state, gate.pathname()),
                }
            }
            Some(path) = redirects.recv() => {
                println!("Redirected to {}", path);
                if path == admin.config().sign_in_path {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                admin.logout(&navigator);
                println!("Logged out");
                break;
            }
        }
    }

    gate.unmount();
    Ok(())
}
