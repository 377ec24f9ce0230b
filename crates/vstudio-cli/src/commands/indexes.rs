//! Index command handler

use anyhow::{Context, Result};

use vstudio_core::{catalog, DocumentStore};

use crate::output::Output;

/// Push key-field uniqueness of every top-level resource into the store
pub fn ensure(store: &dyn DocumentStore, output: &Output) -> Result<()> {
    let created = catalog::ensure_unique_indexes(store)
        .context("Failed to create unique indexes (existing documents may already collide)")?;

    if created == 0 {
        output.message(&format!(
            "The {} backend does not support unique indexes; duplicates are checked on write only.",
            store.backend_name()
        ));
    } else {
        output.success(&format!("Ensured {} unique index(es)", created));
    }
    Ok(())
}
