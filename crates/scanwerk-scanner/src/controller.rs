// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The scanner controller — serializes all access to the physical device.
//
// At most one caller may hold the device open and only one batch scan may be
// in flight. Concurrent callers are linearized through the backend lock; the
// `scanning` flag is held for the entire lifetime of a page stream and a
// second scan attempt fails with `Busy`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{Device, ScanOptions};
use scanwerk_jobs::Page;

use crate::backend::{is_end_of_feed, OptionValue, ScanBackend};

/// Buffered pages between the read loop and the consumer.
const PAGE_STREAM_BUFFER: usize = 4;

#[derive(Debug, Default)]
struct ControllerState {
    devices: Vec<Device>,
    connected: bool,
    device_name: String,
    /// Token driving the in-flight scan, so `close` can release it.
    active_scan: Option<CancellationToken>,
}

/// Process-wide owner of the scanner handle.
pub struct ScanController {
    backend: Arc<Mutex<Box<dyn ScanBackend>>>,
    state: Arc<Mutex<ControllerState>>,
    scanning: Arc<AtomicBool>,
    configured_device: String,
    auto_open: bool,
}

impl ScanController {
    pub fn new(device: impl Into<String>, auto_open: bool, backend: Box<dyn ScanBackend>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            state: Arc::new(Mutex::new(ControllerState::default())),
            scanning: Arc::new(AtomicBool::new(false)),
            configured_device: device.into(),
            auto_open,
        }
    }

    /// Initialize the access layer, enumerate devices, and optionally open
    /// the configured (or first) device. Enumeration and open failures are
    /// logged, never fatal; `is_connected` simply reports false.
    pub fn init(&self) -> Result<()> {
        {
            let mut backend = self.backend.lock().unwrap();
            backend
                .init()
                .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;
        }

        let devices = {
            let mut backend = self.backend.lock().unwrap();
            match backend.list_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    warn!(error = %e, "failed to list scanner devices");
                    Vec::new()
                }
            }
        };
        info!(count = devices.len(), "scanner devices found");
        self.state.lock().unwrap().devices = devices.clone();

        if self.auto_open && !devices.is_empty() {
            let name = if self.configured_device.is_empty() {
                devices[0].name.clone()
            } else {
                self.configured_device.clone()
            };
            if let Err(e) = self.open(&name) {
                warn!(device = %name, error = %e, "failed to auto-open scanner");
            }
        }

        Ok(())
    }

    /// Rescan for devices and refresh the cached list.
    pub fn discover(&self) -> Result<Vec<Device>> {
        let devices = self
            .backend
            .lock()
            .unwrap()
            .list_devices()
            .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;
        self.state.lock().unwrap().devices = devices.clone();
        Ok(devices)
    }

    /// Last known device list (cached at init or by `discover`).
    pub fn list_devices(&self) -> Vec<Device> {
        self.state.lock().unwrap().devices.clone()
    }

    pub fn get_device(&self, name: &str) -> Option<Device> {
        self.state
            .lock()
            .unwrap()
            .devices
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    /// Connect to a device. Idempotent.
    pub fn open(&self, device_name: &str) -> Result<()> {
        self.backend
            .lock()
            .unwrap()
            .open(device_name)
            .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;

        let mut state = self.state.lock().unwrap();
        state.connected = true;
        state.device_name = device_name.to_string();
        info!(device = %device_name, "scanner opened");
        Ok(())
    }

    /// Disconnect. Idempotent; also releases any scan in progress by firing
    /// its cancellation token.
    pub fn close(&self) -> Result<()> {
        let device = {
            let mut state = self.state.lock().unwrap();
            if let Some(token) = state.active_scan.take() {
                token.cancel();
            }
            state.connected = false;
            std::mem::take(&mut state.device_name)
        };
        self.backend.lock().unwrap().close_device();
        info!(device = %device, "scanner closed");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Apply scan options to the open device.
    ///
    /// `page_height == 0` is the distinguished *unlimited length* value and
    /// is passed through to the access layer rather than rejected.
    pub fn set_options(&self, opts: &ScanOptions) -> Result<()> {
        if !self.is_connected() {
            return Err(ScanwerkError::NotConnected);
        }

        let mut backend = self.backend.lock().unwrap();
        if opts.resolution > 0 {
            backend
                .set_option("resolution", OptionValue::Int(opts.resolution as i64))
                .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;
        }
        backend
            .set_option("mode", OptionValue::Str(opts.mode.keyword().into()))
            .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;
        backend
            .set_option("source", OptionValue::Str(opts.source.keyword().into()))
            .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;
        if opts.page_height == 0.0 {
            // Unlimited length for oversize documents.
            let _ = backend.set_option("page-height", OptionValue::Int(0));
        } else if opts.page_height > 0.0 {
            let _ = backend.set_option("page-height", OptionValue::Float(opts.page_height));
        }
        if opts.page_width > 0.0 {
            let _ = backend.set_option("page-width", OptionValue::Float(opts.page_width));
        }

        Ok(())
    }

    /// Start a batch scan, producing pages lazily until the device signals
    /// end-of-feed or an error occurs.
    ///
    /// A read error is emitted as a single page carrying the error, then the
    /// stream closes. Cancellation through `token` interrupts between reads.
    /// A second concurrent scan attempt fails with `Busy`.
    pub fn scan_batch(
        &self,
        token: CancellationToken,
        opts: &ScanOptions,
    ) -> Result<mpsc::Receiver<Page>> {
        if !self.is_connected() {
            return Err(ScanwerkError::NotConnected);
        }
        if self.scanning.swap(true, Ordering::SeqCst) {
            return Err(ScanwerkError::Busy);
        }

        if let Err(e) = self.set_options(opts) {
            self.scanning.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.state.lock().unwrap().active_scan = Some(token.clone());

        let (tx, rx) = mpsc::channel(PAGE_STREAM_BUFFER);
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let scanning = Arc::clone(&self.scanning);

        tokio::task::spawn_blocking(move || {
            // Released on every exit path.
            let _guard = ScanGuard { scanning, state };

            let mut page_num = 0usize;
            loop {
                if token.is_cancelled() {
                    debug!(pages = page_num, "batch scan cancelled");
                    return;
                }

                let result = backend.lock().unwrap().read_image();
                match result {
                    Err(err) if is_end_of_feed(&err) => {
                        info!(pages = page_num, "feeder empty, batch scan complete");
                        return;
                    }
                    Err(err) => {
                        let _ = tx.blocking_send(Page::from_error(err.to_string()));
                        return;
                    }
                    Ok(image) => {
                        page_num += 1;
                        let page = Page::scanned(page_num, image);
                        debug!(
                            page = page_num,
                            width = page.width,
                            height = page.height,
                            "page scanned"
                        );
                        if tx.blocking_send(page).is_err() {
                            // Consumer went away; stop reading.
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Read a named boolean option from the device.
    ///
    /// Returns `NotConnected` when closed, and `Ok(false)` (not an error)
    /// while a scan is in flight so the button watcher survives scans.
    pub fn button_state(&self, button_name: &str) -> Result<bool> {
        if !self.is_connected() {
            return Err(ScanwerkError::NotConnected);
        }
        if self.is_scanning() {
            return Ok(false);
        }

        let value = self
            .backend
            .lock()
            .unwrap()
            .get_option(button_name)
            .map_err(|e| ScanwerkError::Scanner(e.to_string()))?;

        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    /// Release the device and the access layer.
    pub fn shutdown(&self) {
        let _ = self.close();
        self.backend.lock().unwrap().close();
    }

    /// Direct backend access for tests that need to fake device state.
    #[cfg(test)]
    pub(crate) fn backend_for_tests(&self) -> &Arc<Mutex<Box<dyn ScanBackend>>> {
        &self.backend
    }
}

/// Clears the scanning flag and the active-scan token when the read loop
/// exits, whatever the exit path.
struct ScanGuard {
    scanning: Arc<AtomicBool>,
    state: Arc<Mutex<ControllerState>>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.scanning.store(false, Ordering::SeqCst);
        self.state.lock().unwrap().active_scan = None;
    }
}
