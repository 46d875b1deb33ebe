// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — scanner hardware layer: the vendor-neutral backend abstraction,
// the controller that serializes access to the device, and the push-button
// watcher.

pub mod backend;
pub mod button;
pub mod controller;

pub use backend::{BackendError, OptionValue, ScanBackend, StubBackend, TestBackend};
pub use button::{ButtonWatcher, PressKind};
pub use controller::ScanController;
