//! Random image rotation without repeats inside a cycle.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaChaRng;

use crate::image_ops::collect_image_names;

/// Tracks which images of a fixed set have been shown in the current cycle.
#[derive(Debug)]
pub struct ImageTracker {
    folder: PathBuf,
    all: BTreeSet<OsString>,
    shown: BTreeSet<OsString>,
    rng: ChaChaRng,
}

impl ImageTracker {
    /// Scan `folder` once; the image set stays fixed for the life of the tracker.
    pub fn open(folder: &Path) -> Result<Self> {
        let names = collect_image_names(folder)?;
        Self::with_rng(folder, names, ChaChaRng::from_entropy())
    }

    /// Build a tracker over an explicit set of names.
    pub fn with_rng(folder: &Path, names: BTreeSet<OsString>, rng: ChaChaRng) -> Result<Self> {
        if names.is_empty() {
            bail!("no supported images found in {}", folder.display());
        }
        Ok(Self {
            folder: folder.to_path_buf(),
            all: names,
            shown: BTreeSet::new(),
            rng,
        })
    }

    /// Pick a random image not yet shown this cycle, starting a new cycle when all were shown.
    pub fn next(&mut self) -> Result<OsString> {
        if self.all.is_empty() {
            bail!("image set is empty");
        }
        // Shown is always a subset of all, so equal sizes mean the cycle is complete.
        if self.shown.len() >= self.all.len() {
            tracing::info!("All images have been shown. Resetting tracking...");
            self.shown.clear();
        }
        let available: Vec<&OsString> = self.all.difference(&self.shown).collect();
        let choice = available
            .choose(&mut self.rng)
            .map(|name| (*name).clone())
            .ok_or_else(|| anyhow!("no images available"))?;
        self.shown.insert(choice.clone());
        Ok(choice)
    }

    pub fn path_of(&self, name: &OsStr) -> PathBuf {
        self.folder.join(name)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Names already shown in the current cycle.
    #[cfg(test)]
    pub fn shown(&self) -> &BTreeSet<OsString> {
        &self.shown
    }
}
