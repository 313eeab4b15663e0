//! # DriftGuard Library
//!
//! Back up and restore DualSense analog-stick calibration over USB HID.
//!
//! This library provides controller discovery, the vendor feature-report
//! protocol for serial numbers and stick calibration, a session state machine
//! driven by a fixed-rate polling loop, and CSV import/export of calibrations.

pub mod calibration_file;
pub mod config;
pub mod controller;
pub mod error;
pub mod hid;
pub mod service;
pub mod session;
pub mod settings;
