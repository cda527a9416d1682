//! # Policy Subcommand
//!
//! Validates the authorization section of a configuration file and reports
//! the decision for one request without starting the server.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use sar_core::ArtefactIdentity;
use sar_policy::{LoadedAuthorization, Operation, Principal};

/// Arguments for `sar policy`.
#[derive(Args, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Print allow or deny for a principal, operation and coordinate.
    Check {
        /// Configuration file (defaults to ./sar.yaml when present).
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Configured principal id; anonymous when omitted.
        #[arg(long)]
        principal: Option<String>,
        /// `read` or `write`.
        operation: Operation,
        identity: ArtefactIdentity,
    },
}

/// Execute the policy subcommand.
pub fn run_policy(args: &PolicyArgs) -> Result<u8> {
    match &args.command {
        PolicyCommand::Check {
            config,
            principal,
            operation,
            identity,
        } => {
            let config = crate::load_config(config.as_deref())?;
            let loaded = config
                .authorization()
                .context("invalid authorization configuration")?;
            cmd_check(&loaded, principal.as_deref(), *operation, identity)
        }
    }
}

fn cmd_check(
    loaded: &LoadedAuthorization,
    principal_id: Option<&str>,
    operation: Operation,
    identity: &ArtefactIdentity,
) -> Result<u8> {
    let principal = match principal_id {
        None => Principal::anonymous(),
        Some(id) => match loaded.credentials.iter().find(|c| c.principal.id() == id) {
            Some(credential) => credential.principal.clone(),
            None => bail!("principal \"{id}\" is not configured"),
        },
    };

    let decision = loaded.policy.authorize(&principal, operation, identity);
    println!("{decision}: {principal} {operation} {identity}");
    Ok(if decision.is_allowed() { 0 } else { 1 })
}
