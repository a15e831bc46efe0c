//! winstate :: persist and restore the space-probe recovery blob
//!
//! Demonstrates the `serde`-gated restart story: on
//! first run, bootstrap normally and write `state.recovery_blob()` to disk;
//! on a later run, feed those bytes back into
//! [`winstate::initialize_with_recovery_blob`] so previously-seen spaces
//! keep their internal ids across the process restart.
use std::path::PathBuf;

use tracing_subscriber::{self, prelude::*};

use winstate::accessibility::backend::MacosAccessibility;
use winstate::Config;

fn blob_path() -> PathBuf {
    std::env::temp_dir().join("winstate-recovery-blob.bin")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> winstate::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").finish().init();

    let path = blob_path();
    let config = Config { persist_space_probes: true, ..Config::default() };

    let state = match std::fs::read(&path) {
        Ok(bytes) => {
            println!("found recovery blob at {}, restoring", path.display());
            winstate::initialize_with_recovery_blob(MacosAccessibility::new(), config, &bytes).await?
        }
        Err(_) => {
            println!("no recovery blob found, bootstrapping fresh");
            winstate::initialize_with_config(MacosAccessibility::new(), config).await?
        }
    };

    println!("known spaces: {:?}", state.current_space_ids());

    let blob = state.recovery_blob();
    std::fs::write(&path, &blob).map_err(|e| {
        tracing::warn!(error = %e, "failed to persist recovery blob");
        e
    }).ok();
    println!("wrote {} bytes to {}", blob.len(), path.display());

    Ok(())
}
