//! The endless select → display → detect → cooldown cycle.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::display::DisplaySurface;
use crate::drive::{RemoteFileRecord, RemoteListing};
use crate::poller::{Poller, detect_new_file};
use crate::tracker::ImageTracker;

/// Source of blocking sleeps.
pub trait Clock: Send {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Delay between two remote snapshots while an image is up.
    pub poll_interval: Duration,
    /// Dark period after an upload was detected.
    pub cooldown: Duration,
}

/// Thread blocked on the current display session.
type DisplayThread = JoinHandle<()>;

/// Where the cycle currently is.
#[derive(Debug)]
pub enum Phase {
    SelectImage,
    Display(PathBuf),
    Watching {
        display: DisplayThread,
        initial: Vec<RemoteFileRecord>,
    },
    DetectedChange {
        display: DisplayThread,
        record: RemoteFileRecord,
    },
    Cooldown,
}

/// Orchestrates the tracker, the display surface and the poller.
pub struct Slideshow<D, L, C> {
    tracker: ImageTracker,
    surface: Arc<D>,
    poller: Poller<L>,
    clock: C,
    timing: Timing,
    /// Images that failed to display since the last one that worked.
    unshowable: BTreeSet<PathBuf>,
}

impl<D, L, C> Slideshow<D, L, C>
where
    D: DisplaySurface + 'static,
    L: RemoteListing,
    C: Clock,
{
    pub fn new(
        tracker: ImageTracker,
        surface: Arc<D>,
        poller: Poller<L>,
        clock: C,
        timing: Timing,
    ) -> Self {
        Self {
            tracker,
            surface,
            poller,
            clock,
            timing,
            unshowable: BTreeSet::new(),
        }
    }

    /// Cycle forever; only returns on a fatal error.
    pub fn run(mut self) -> Result<()> {
        let mut phase = Phase::SelectImage;
        loop {
            phase = self.step(phase)?;
        }
    }

    /// Perform one transition of the cycle.
    pub fn step(&mut self, phase: Phase) -> Result<Phase> {
        match phase {
            Phase::SelectImage => {
                let name = self.tracker.next()?;
                tracing::info!("Displaying image: {}", name.to_string_lossy());
                Ok(Phase::Display(self.tracker.path_of(&name)))
            }
            Phase::Display(path) => {
                let session = match self.surface.begin(&path) {
                    Ok(session) => session,
                    Err(err) => {
                        tracing::error!("cannot display {}: {err:#}", path.display());
                        self.unshowable.insert(path);
                        if self.unshowable.len() >= self.tracker.len() {
                            bail!(
                                "none of the {} images could be displayed",
                                self.tracker.len()
                            );
                        }
                        return Ok(Phase::SelectImage);
                    }
                };
                self.unshowable.clear();
                let display = thread::Builder::new()
                    .name("display-session".into())
                    .spawn(move || session.wait())
                    .context("failed to spawn display thread")?;

                let initial = self.poller.snapshot();
                tracing::info!("Current files in Drive folder: {}", initial.len());
                tracing::info!("Waiting for new file to be uploaded...");
                Ok(Phase::Watching { display, initial })
            }
            Phase::Watching { display, initial } => {
                self.clock.sleep(self.timing.poll_interval);
                if display.is_finished() {
                    join_display(display)?;
                    tracing::warn!("display closed on its own, moving to the next image");
                    return Ok(Phase::SelectImage);
                }
                let current = self.poller.snapshot();
                match detect_new_file(&initial, &current) {
                    Some(record) => Ok(Phase::DetectedChange {
                        display,
                        record: record.clone(),
                    }),
                    None => Ok(Phase::Watching { display, initial }),
                }
            }
            Phase::DetectedChange { display, record } => {
                tracing::info!("New file detected: {}", record.name);
                self.surface.close();
                join_display(display)?;
                Ok(Phase::Cooldown)
            }
            Phase::Cooldown => {
                tracing::info!(
                    "Starting {} wait period...",
                    describe(self.timing.cooldown)
                );
                self.clock.sleep(self.timing.cooldown);
                tracing::info!("Cooldown has passed. Starting next cycle...");
                Ok(Phase::SelectImage)
            }
        }
    }
}

fn join_display(display: DisplayThread) -> Result<()> {
    display
        .join()
        .map_err(|_| anyhow!("display thread panicked"))
}

fn describe(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (count, unit) = if secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    match count {
        1 => format!("one {unit}"),
        n => format!("{n} {unit}s"),
    }
}
