//! # Artefact Subcommand
//!
//! Local maintenance against a storage root. Runs the same engine as the
//! server, so it must not be pointed at a root a running server is using.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use sar_core::ArtefactIdentity;
use sar_store::{chunks, ArtefactStore, StoreError};
use tokio::io::AsyncWriteExt;

/// Arguments for `sar artefact`.
#[derive(Args, Debug)]
pub struct ArtefactArgs {
    /// Storage root directory.
    #[arg(long, value_name = "DIR", default_value = "artefacts")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: ArtefactCommand,
}

#[derive(Subcommand, Debug)]
pub enum ArtefactCommand {
    /// Store a file under namespace/name/version.
    Put {
        identity: ArtefactIdentity,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write an artefact to a file, or to stdout.
    Get {
        identity: ArtefactIdentity,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Re-hash an artefact and compare with its recorded checksum.
    Verify { identity: ArtefactIdentity },

    /// List the versions of namespace/name.
    List { namespace: String, name: String },

    /// Remove an artefact.
    Delete { identity: ArtefactIdentity },
}

/// Execute the artefact subcommand.
pub async fn run_artefact(args: &ArtefactArgs) -> Result<u8> {
    let store = ArtefactStore::open(args.root.clone())
        .await
        .with_context(|| format!("failed to open storage root {}", args.root.display()))?;

    let result = match &args.command {
        ArtefactCommand::Put { identity, file } => cmd_put(&store, identity, file).await,
        ArtefactCommand::Get { identity, output } => {
            cmd_get(&store, identity, output.as_deref()).await
        }
        ArtefactCommand::Verify { identity } => cmd_verify(&store, identity).await,
        ArtefactCommand::List { namespace, name } => cmd_list(&store, namespace, name),
        ArtefactCommand::Delete { identity } => cmd_delete(&store, identity).await,
    };

    match result {
        Err(StoreError::NotFound(identity)) => {
            println!("NOT FOUND: {identity}");
            Ok(1)
        }
        Err(e @ StoreError::CorruptArtefact { .. }) => {
            println!("CORRUPT: {e}");
            Ok(1)
        }
        Err(e) => Err(e.into()),
        Ok(code) => Ok(code),
    }
}

async fn cmd_put(store: &ArtefactStore, identity: &ArtefactIdentity, file: &Path) -> Result<u8, StoreError> {
    let open_err = |source| StoreError::StorageUnavailable {
        context: format!("reading {}", file.display()),
        source,
    };
    let handle = tokio::fs::File::open(file).await.map_err(open_err)?;
    let size = handle.metadata().await.map_err(open_err)?.len();

    let record = store.put(identity, chunks(handle), Some(size)).await?;
    println!(
        "OK: stored {} size={} checksum={}",
        record.identity, record.size_bytes, record.checksum
    );
    Ok(0)
}

async fn cmd_get(
    store: &ArtefactStore,
    identity: &ArtefactIdentity,
    output: Option<&Path>,
) -> Result<u8, StoreError> {
    let (record, mut reader) = store.get(identity).await?;
    let write_err = |source| StoreError::StorageUnavailable {
        context: "writing output".to_string(),
        source,
    };
    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
            tokio::io::copy(&mut reader, &mut file).await.map_err(write_err)?;
            file.flush().await.map_err(write_err)?;
            eprintln!("OK: wrote {} bytes to {}", record.size_bytes, path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await.map_err(write_err)?;
            stdout.flush().await.map_err(write_err)?;
        }
    }
    Ok(0)
}

async fn cmd_verify(store: &ArtefactStore, identity: &ArtefactIdentity) -> Result<u8, StoreError> {
    let (record, _) = store.get_verified(identity).await?;
    println!("OK: {} verified checksum={}", record.identity, record.checksum);
    Ok(0)
}

fn cmd_list(store: &ArtefactStore, namespace: &str, name: &str) -> Result<u8, StoreError> {
    for version in store.list(namespace, name)?.iter() {
        println!("{version}");
    }
    Ok(0)
}

async fn cmd_delete(store: &ArtefactStore, identity: &ArtefactIdentity) -> Result<u8, StoreError> {
    let record = store.delete(identity).await?;
    println!("OK: deleted {}", record.identity);
    Ok(0)
}
