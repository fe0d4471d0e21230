//! Shared helpers for real-process tests

#![allow(dead_code)]

use futures::StreamExt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use procbridge_core::application::{OutputStream, ProcessBridge};
use procbridge_core::domain::OutputChunk;
use procbridge_core::port::id_provider::UuidProvider;
use procbridge_core::port::time_provider::SystemTimeProvider;
use procbridge_infra_system::SubprocessLauncher;

/// Write a `/bin/sh` script with the given body and mode
pub fn script_with_mode(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    path
}

/// Write an executable `/bin/sh` script
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    script_with_mode(dir, name, body, 0o755)
}

/// Bridge over the real launcher, with a short grace period
pub fn bridge() -> ProcessBridge {
    let time_provider = Arc::new(SystemTimeProvider);
    let launcher = SubprocessLauncher::new(time_provider.clone())
        .with_grace_period(Duration::from_millis(500));
    ProcessBridge::new(Arc::new(launcher), Arc::new(UuidProvider), time_provider)
}

/// Drain a stream, failing the test if it does not end in time
pub async fn collect(mut output: OutputStream) -> Vec<OutputChunk> {
    tokio::time::timeout(Duration::from_secs(20), async {
        let mut chunks = Vec::new();
        while let Some(chunk) = output.next().await {
            chunks.push(chunk);
        }
        chunks
    })
    .await
    .expect("output stream did not end")
}

pub fn joined(chunks: &[OutputChunk]) -> String {
    chunks.iter().map(|c| c.text.as_str()).collect()
}
