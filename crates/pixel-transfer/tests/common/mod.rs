//! Shared fixtures: a recording GL context and helpers to stall or drain the
//! transfer thread.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use pixel_transfer::{TransferConfig, TransferWorker};
use pixel_transfer_core::{
    ContextFactory, GpuPreference, HeapSharedMemory, MemoryParams, OffscreenSurface, ShareGroup,
    TexImage2DParams, TexSubImage2DParams, TextureId, TransferContext,
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadKind {
    Define { width: i32, height: i32 },
    SubImage { x: i32, y: i32, width: i32, height: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub texture: TextureId,
    pub kind: UploadKind,
    pub pixels: Vec<u8>,
}

#[derive(Default)]
pub struct Recorder {
    uploads: Mutex<Vec<RecordedUpload>>,
    flushes: Mutex<usize>,
    refuse: AtomicBool,
    hold: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

/// Keeps the next upload blocked inside the GL call until released.
pub struct HeldUpload {
    entered: mpsc::Receiver<()>,
    release: Option<mpsc::Sender<()>>,
}

impl HeldUpload {
    /// Wait until the transfer thread is inside the upload.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(TIMEOUT)
            .expect("upload reached the GL call");
    }

    pub fn release(mut self) {
        self.release.take();
    }
}

impl Drop for HeldUpload {
    fn drop(&mut self) {
        self.release.take();
    }
}

impl Recorder {
    /// Make every later upload fail the way GL refuses a bad buffer.
    pub fn refuse_uploads(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn hold_next_upload(&self) -> HeldUpload {
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        *self.hold.lock() = Some((entered_tx, release_rx));
        HeldUpload {
            entered,
            release: Some(release),
        }
    }

    fn upload(&self, upload: RecordedUpload) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            bail!("pixel data too short for {}", upload.texture);
        }
        self.uploads.lock().push(upload);
        let held = self.hold.lock().take();
        if let Some((entered, release)) = held {
            let _ = entered.send(());
            // Returns once the sender is dropped.
            let _ = release.recv();
        }
        Ok(())
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().clone()
    }

    pub fn uploads_for(&self, texture: TextureId) -> Vec<RecordedUpload> {
        self.uploads
            .lock()
            .iter()
            .filter(|u| u.texture == texture)
            .cloned()
            .collect()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock()
    }
}

struct Surface((u32, u32));

impl OffscreenSurface for Surface {
    fn size(&self) -> (u32, u32) {
        self.0
    }
}

struct RecordingContext {
    recorder: Arc<Recorder>,
}

impl TransferContext for RecordingContext {
    fn make_current(&mut self, _surface: &dyn OffscreenSurface) -> Result<()> {
        Ok(())
    }

    fn tex_image_2d(
        &mut self,
        texture: TextureId,
        params: &TexImage2DParams,
        pixels: &[u8],
    ) -> Result<()> {
        self.recorder.upload(RecordedUpload {
            texture,
            kind: UploadKind::Define {
                width: params.width,
                height: params.height,
            },
            pixels: pixels.to_vec(),
        })
    }

    fn tex_sub_image_2d(
        &mut self,
        texture: TextureId,
        params: &TexSubImage2DParams,
        pixels: &[u8],
    ) -> Result<()> {
        self.recorder.upload(RecordedUpload {
            texture,
            kind: UploadKind::SubImage {
                x: params.xoffset,
                y: params.yoffset,
                width: params.width,
                height: params.height,
            },
            pixels: pixels.to_vec(),
        })
    }

    fn flush(&mut self) {
        *self.recorder.flushes.lock() += 1;
    }
}

pub struct RecordingFactory {
    pub recorder: Arc<Recorder>,
}

impl ContextFactory for RecordingFactory {
    fn create_offscreen_surface(&mut self, size: (u32, u32)) -> Result<Box<dyn OffscreenSurface>> {
        Ok(Box::new(Surface(size)))
    }

    fn create_shared_context(
        &mut self,
        _share_group: &ShareGroup,
        _surface: &dyn OffscreenSurface,
        _preference: GpuPreference,
    ) -> Result<Box<dyn TransferContext>> {
        Ok(Box::new(RecordingContext {
            recorder: self.recorder.clone(),
        }))
    }
}

pub fn init_logging() {
    pixel_transfer_core::logging::init_for_tests();
}

/// A dedicated worker backed by a fresh [`Recorder`].
pub fn spawn_worker(config: &TransferConfig) -> (Arc<TransferWorker>, Arc<Recorder>) {
    init_logging();
    let recorder = Arc::new(Recorder::default());
    let worker = TransferWorker::spawn(
        Some(ShareGroup::new("main")),
        RecordingFactory {
            recorder: recorder.clone(),
        },
        config,
    )
    .expect("recording worker starts");
    (worker, recorder)
}

/// Holds the transfer thread inside a task until opened (or dropped).
pub struct Gate {
    release: Option<mpsc::Sender<()>>,
}

impl Gate {
    pub fn close(worker: &TransferWorker) -> Self {
        let (release, wait) = mpsc::channel::<()>();
        worker.post_task(move |_| {
            let _ = wait.recv();
        });
        Self {
            release: Some(release),
        }
    }

    pub fn open(mut self) {
        self.release.take();
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        self.release.take();
    }
}

/// Wait until every task posted so far has run.
pub fn drain(worker: &TransferWorker) {
    let (tx, rx) = mpsc::channel();
    worker.post_task(move |_| {
        let _ = tx.send(());
    });
    rx.recv_timeout(TIMEOUT).expect("transfer thread drained");
}

/// Memory params covering all of `bytes`.
pub fn memory(bytes: Vec<u8>) -> MemoryParams {
    MemoryParams::whole(HeapSharedMemory::shared(bytes))
}

/// `width`x`height` RGBA pixels filled with `value`.
pub fn rgba(width: usize, height: usize, value: u8) -> Vec<u8> {
    vec![value; width * height * 4]
}
