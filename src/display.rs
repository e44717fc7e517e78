//! Fullscreen display sessions owned by the UI thread.
//!
//! The main thread is the only one that creates, paints or destroys a window.
//! Other threads talk to it through a request channel (open this image) and a
//! [`SessionGate`] (close it, tell me when it is gone).

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow, bail};
use eframe::egui;

use crate::app::ViewerApp;
use crate::image_ops::{ViewerImage, load_viewer_image};

/// Title of the fullscreen window.
pub const WINDOW_TITLE: &str = "Current Prompt Image";

/// Lifecycle of the single display session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing on screen; a new session may start.
    Idle,
    /// A window is (or is about to be) showing this image.
    Showing(PathBuf),
    /// A close was requested and the UI thread has not finished tearing down.
    Closing,
}

type Waker = Box<dyn Fn() + Send + Sync>;

struct GateInner {
    state: SessionState,
    waker: Option<Waker>,
}

/// Shared state machine between the UI thread and everyone else.
pub struct SessionGate {
    inner: Mutex<GateInner>,
    changed: Condvar,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: SessionState::Idle,
                waker: None,
            }),
            changed: Condvar::new(),
        }
    }
}

impl SessionGate {
    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn is_closing(&self) -> bool {
        self.lock().state == SessionState::Closing
    }

    /// `Idle -> Showing`. Fails while a previous session is still live.
    pub fn begin(&self, path: &Path) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            bail!("a display session is still live ({:?})", inner.state);
        }
        inner.state = SessionState::Showing(path.to_path_buf());
        self.changed.notify_all();
        Ok(())
    }

    /// `Showing -> Closing` and wake the UI thread. No-op in any other state.
    ///
    /// Returns whether a transition happened.
    pub fn request_close(&self) -> bool {
        let mut inner = self.lock();
        if !matches!(inner.state, SessionState::Showing(_)) {
            return false;
        }
        inner.state = SessionState::Closing;
        self.changed.notify_all();
        if let Some(wake) = &inner.waker {
            wake();
        }
        true
    }

    /// Teardown finished: back to `Idle`, releasing every waiter.
    pub fn finish(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::Idle;
        inner.waker = None;
        self.changed.notify_all();
    }

    /// Block until the gate is `Idle`.
    pub fn wait_idle(&self) {
        let mut inner = self.lock();
        while inner.state != SessionState::Idle {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Install the callback that nudges the UI thread on close requests.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.lock().waker = Some(Box::new(waker));
    }
}

/// Handle to one live session; waiting on it blocks until it is torn down.
#[must_use]
pub struct DisplaySession {
    gate: Arc<SessionGate>,
}

impl DisplaySession {
    pub fn new(gate: Arc<SessionGate>) -> Self {
        Self { gate }
    }

    pub fn wait(self) {
        self.gate.wait_idle();
    }
}

/// Something that can put one image on screen at a time.
pub trait DisplaySurface: Send + Sync {
    /// Start showing `path` and return the session handle. The surface is
    /// reserved before this returns, so a following [`close`](Self::close) is never lost.
    fn begin(&self, path: &Path) -> Result<DisplaySession>;

    /// Ask the current session to close. Safe to call at any time, any number of times.
    fn close(&self);

    #[cfg(test)]
    fn state(&self) -> SessionState;

    /// Show `path`, blocking until the session is closed.
    #[cfg(test)]
    fn show(&self, path: &Path) -> Result<()> {
        self.begin(path)?.wait();
        Ok(())
    }
}

struct ShowRequest {
    path: PathBuf,
    image: ViewerImage,
}

/// [`DisplaySurface`] backed by eframe windows on the UI thread.
pub struct UiSurface {
    gate: Arc<SessionGate>,
    requests: Sender<ShowRequest>,
}

/// The UI thread's side of a [`UiSurface`].
pub struct DisplayLoop {
    gate: Arc<SessionGate>,
    requests: Receiver<ShowRequest>,
}

impl UiSurface {
    pub fn new() -> (Self, DisplayLoop) {
        let gate = Arc::new(SessionGate::default());
        let (tx, rx) = mpsc::channel();
        (
            Self {
                gate: Arc::clone(&gate),
                requests: tx,
            },
            DisplayLoop { gate, requests: rx },
        )
    }
}

impl DisplaySurface for UiSurface {
    fn begin(&self, path: &Path) -> Result<DisplaySession> {
        // Decode on the caller's thread so a bad file never reaches the gate.
        let image = load_viewer_image(path)?;
        self.gate.begin(path)?;
        let request = ShowRequest {
            path: path.to_path_buf(),
            image,
        };
        if self.requests.send(request).is_err() {
            self.gate.finish();
            return Err(anyhow!("display thread has exited"));
        }
        Ok(DisplaySession::new(Arc::clone(&self.gate)))
    }

    fn close(&self) {
        self.gate.request_close();
    }

    #[cfg(test)]
    fn state(&self) -> SessionState {
        self.gate.state()
    }
}

impl DisplayLoop {
    /// Serve show requests until every [`UiSurface`] handle is gone. Must run on the main thread.
    pub fn run(self) {
        for request in self.requests.iter() {
            if self.gate.is_closing() {
                // Closed before the window ever opened.
                self.gate.finish();
                continue;
            }
            tracing::debug!("opening window for {}", request.path.display());
            let gate = Arc::clone(&self.gate);
            let image = request.image;
            let result = eframe::run_native(
                WINDOW_TITLE,
                native_options(),
                Box::new(move |cc| Box::new(ViewerApp::new(cc, image, gate))),
            );
            if let Err(err) = result {
                tracing::error!("display of {} failed: {err}", request.path.display());
            }
            self.gate.finish();
        }
    }
}

fn native_options() -> eframe::NativeOptions {
    eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_fullscreen(true)
            .with_decorations(false)
            .with_window_level(egui::WindowLevel::AlwaysOnTop),
        run_and_return: true,
        ..Default::default()
    }
}

/// Surface that never opens a window; closing tears the session down at once.
#[cfg(test)]
#[derive(Default)]
pub struct HeadlessSurface {
    gate: Arc<SessionGate>,
    pub shown: Mutex<Vec<PathBuf>>,
}

#[cfg(test)]
impl DisplaySurface for HeadlessSurface {
    fn begin(&self, path: &Path) -> Result<DisplaySession> {
        self.gate.begin(path)?;
        self.shown.lock().unwrap().push(path.to_path_buf());
        Ok(DisplaySession::new(Arc::clone(&self.gate)))
    }

    fn close(&self) {
        if self.gate.request_close() {
            self.gate.finish();
        }
    }

    fn state(&self) -> SessionState {
        self.gate.state()
    }
}
