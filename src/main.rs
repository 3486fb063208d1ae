mod api;
mod clipboard;
mod composer;
mod config;
mod error;
mod keymap;
mod logging;
mod model;
mod names;
mod reconcile;
mod render;
mod search;
mod session;
mod tui;

use anyhow::{Context, Result};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    // Load config
    let mut config = config::Config::load()?;

    // A relay URL on the command line wins over the config file
    if let Some(url) = std::env::args().nth(1) {
        config.server.base_url = url;
    }
    info!(server = %config.server.base_url, "starting");

    let api = api::ApiClient::new(&config.server)?;
    if let Some(username) = config.server.username.clone() {
        let password = config.server.password()?.unwrap_or_default();
        api.login(&username, &password)
            .await
            .with_context(|| format!("login to {} failed", api.base_url()))?;
        info!(username, "logged in");
    }

    tui::run(tui::App::new(api, config)).await
}
