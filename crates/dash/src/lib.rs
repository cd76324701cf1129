// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod ansi;
pub mod config;
pub mod error;
pub mod log_buffer;
pub mod process;
pub mod remote;
pub mod scripts;
pub mod store;
pub mod system;
pub mod test_support;
pub mod transport;
