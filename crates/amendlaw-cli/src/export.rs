//! Writing apply results: JSON documents and the Arrow IPC manifest.

use std::fs::File;
use std::path::Path;

use amendlaw_core::{Manifest, manifest_to_record_batch};
use anyhow::Context;
use arrow::ipc::writer::FileWriter;
use serde::Serialize;

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Write the manifest as a single-batch Arrow IPC file. Returns the row count.
pub fn write_manifest_ipc(path: &Path, manifest: &Manifest) -> anyhow::Result<usize> {
    let batch = manifest_to_record_batch(manifest).context("building manifest batch")?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = FileWriter::try_new(file, &batch.schema())?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(batch.num_rows())
}
