mod app;
mod auth;
mod display;
mod drive;
mod error;
mod image_ops;
mod poller;
mod settings;
mod slideshow;
#[cfg(test)]
mod test_support;
mod theme;
mod tracker;

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};

use crate::auth::{Authenticator, FileTokenStore};
use crate::display::UiSurface;
use crate::drive::DriveClient;
use crate::poller::Poller;
use crate::slideshow::{Slideshow, SystemClock, Timing};
use crate::tracker::ImageTracker;

fn main() -> Result<()> {
    // Loaded before the subscriber so RUST_LOG may come from .env.
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remem=info".into()),
        )
        .with_target(false)
        .init();

    if let Err(err) = dotenv {
        if !err.not_found() {
            tracing::warn!("ignoring .env: {err}");
        }
    }
    let config = settings::load().resolve(|key| std::env::var(key).ok())?;

    let tracker = ImageTracker::open(&config.image_folder)?;
    tracing::info!(
        "Found {} images in {}",
        tracker.len(),
        config.image_folder.display()
    );

    let auth = Authenticator::new(
        FileTokenStore::new(&config.token_file),
        &config.client_secret_file,
        config.redirect_port,
    )?;
    let credentials = auth.authorize().context("Google Drive authorization failed")?;
    tracing::info!("Google Drive authentication successful.");

    let poller = Poller::new(DriveClient::new(auth, credentials), config.drive_folder_id);
    let (surface, display_loop) = UiSurface::new();
    let timing = Timing {
        poll_interval: config.poll_interval,
        cooldown: config.cooldown,
    };
    let slideshow = Slideshow::new(tracker, Arc::new(surface), poller, SystemClock, timing);

    // Windows belong to the main thread; the cycle runs beside it.
    let worker = thread::Builder::new()
        .name("slideshow".into())
        .spawn(move || slideshow.run())
        .context("failed to spawn slideshow thread")?;
    display_loop.run();

    worker
        .join()
        .map_err(|_| anyhow!("slideshow thread panicked"))?
}
