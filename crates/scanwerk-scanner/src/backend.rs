// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The vendor-neutral scanner access layer.
//
// `ScanBackend` models the capability set of a SANE-style scanner library:
// device enumeration, open/close, option get/set, and page reads. The stub
// implementations below stand in for real hardware during development and in
// every scanner test.

use std::collections::HashMap;

use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;

use scanwerk_core::types::Device;

/// End-of-feed sentinels returned by the access layer when the document
/// feeder runs out. Recognizing any of these closes a batch scan cleanly.
const END_OF_FEED_MESSAGES: [&str; 3] = [
    "document feeder out of documents",
    "no more data available",
    "end of file",
];

/// Errors surfaced by the access layer.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("device not open")]
    NotOpen,

    #[error("{0}")]
    Device(String),
}

/// Whether an access-layer error is the end-of-feed sentinel rather than a
/// real failure.
pub fn is_end_of_feed(err: &BackendError) -> bool {
    match err {
        BackendError::Device(msg) => END_OF_FEED_MESSAGES.contains(&msg.as_str()),
        BackendError::NotOpen => false,
    }
}

/// A dynamically-typed scanner option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Capability set of the scanner access layer.
///
/// Implementations are not required to be thread-safe; the controller
/// linearizes all calls through its own lock.
pub trait ScanBackend: Send {
    fn init(&mut self) -> Result<(), BackendError>;
    fn close(&mut self);
    fn list_devices(&mut self) -> Result<Vec<Device>, BackendError>;
    fn open(&mut self, device_name: &str) -> Result<(), BackendError>;
    fn close_device(&mut self);
    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), BackendError>;
    fn get_option(&mut self, name: &str) -> Result<Option<OptionValue>, BackendError>;
    /// Read the next page image. Returns the end-of-feed sentinel error when
    /// the feeder is empty.
    fn read_image(&mut self) -> Result<DynamicImage, BackendError>;
    fn is_open(&self) -> bool;
}

/// No-op backend for development without scanner hardware.
///
/// Reports a single virtual device and signals end-of-feed on the first read.
#[derive(Debug, Default)]
pub struct StubBackend {
    open: bool,
    options: HashMap<String, OptionValue>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn virtual_device() -> Device {
        Device {
            name: "test:0".into(),
            vendor: "Test".into(),
            model: "Virtual Scanner".into(),
            kind: "virtual device".into(),
        }
    }
}

impl ScanBackend for StubBackend {
    fn init(&mut self) -> Result<(), BackendError> {
        self.options.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn list_devices(&mut self) -> Result<Vec<Device>, BackendError> {
        Ok(vec![Self::virtual_device()])
    }

    fn open(&mut self, _device_name: &str) -> Result<(), BackendError> {
        self.open = true;
        Ok(())
    }

    fn close_device(&mut self) {
        self.open = false;
    }

    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), BackendError> {
        if !self.open {
            return Err(BackendError::NotOpen);
        }
        self.options.insert(name.to_string(), value);
        Ok(())
    }

    fn get_option(&mut self, name: &str) -> Result<Option<OptionValue>, BackendError> {
        if !self.open {
            return Err(BackendError::NotOpen);
        }
        if let Some(value) = self.options.get(name) {
            return Ok(Some(value.clone()));
        }
        // Defaults for well-known options.
        Ok(match name {
            "scan" => Some(OptionValue::Bool(false)),
            "resolution" => Some(OptionValue::Int(300)),
            "mode" => Some(OptionValue::Str("color".into())),
            _ => None,
        })
    }

    fn read_image(&mut self) -> Result<DynamicImage, BackendError> {
        if !self.open {
            return Err(BackendError::NotOpen);
        }
        Err(BackendError::Device(END_OF_FEED_MESSAGES[0].into()))
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Backend that synthesizes a fixed number of test pages.
///
/// Each page is A4 at 100 DPI (827x1169): white with a black border and a
/// few text-like bars, so the page never classifies as blank.
#[derive(Debug)]
pub struct TestBackend {
    stub: StubBackend,
    pages_remaining: usize,
    /// Artificial delay per page read; lets tests hold a scan in flight.
    read_delay: std::time::Duration,
}

impl TestBackend {
    pub fn new(pages: usize) -> Self {
        Self {
            stub: StubBackend::new(),
            pages_remaining: pages,
            read_delay: std::time::Duration::ZERO,
        }
    }

    pub fn with_read_delay(pages: usize, delay: std::time::Duration) -> Self {
        Self {
            stub: StubBackend::new(),
            pages_remaining: pages,
            read_delay: delay,
        }
    }

    fn test_page() -> DynamicImage {
        let (width, height) = (827, 1169);
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        for x in 0..width {
            img.put_pixel(x, 0, Rgb([0, 0, 0]));
            img.put_pixel(x, height - 1, Rgb([0, 0, 0]));
        }
        for y in 0..height {
            img.put_pixel(0, y, Rgb([0, 0, 0]));
            img.put_pixel(width - 1, y, Rgb([0, 0, 0]));
        }
        // Horizontal bars standing in for lines of text.
        for bar in 0..10u32 {
            let top = 100 + bar * 100;
            for y in top..top + 20 {
                for x in 60..width - 60 {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }
}

impl ScanBackend for TestBackend {
    fn init(&mut self) -> Result<(), BackendError> {
        self.stub.init()
    }

    fn close(&mut self) {
        self.stub.close()
    }

    fn list_devices(&mut self) -> Result<Vec<Device>, BackendError> {
        self.stub.list_devices()
    }

    fn open(&mut self, device_name: &str) -> Result<(), BackendError> {
        self.stub.open(device_name)
    }

    fn close_device(&mut self) {
        self.stub.close_device()
    }

    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), BackendError> {
        self.stub.set_option(name, value)
    }

    fn get_option(&mut self, name: &str) -> Result<Option<OptionValue>, BackendError> {
        self.stub.get_option(name)
    }

    fn read_image(&mut self) -> Result<DynamicImage, BackendError> {
        if !self.stub.is_open() {
            return Err(BackendError::NotOpen);
        }
        if self.pages_remaining == 0 {
            return Err(BackendError::Device(END_OF_FEED_MESSAGES[0].into()));
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        self.pages_remaining -= 1;
        Ok(Self::test_page())
    }

    fn is_open(&self) -> bool {
        self.stub.is_open()
    }
}
