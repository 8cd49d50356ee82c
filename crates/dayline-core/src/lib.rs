//! Core library for Dayline, a personal task-list planner.
//!
//! The pieces layer cleanly: [`store`] persists per-user task records under a
//! data directory, [`board`] is the in-memory aggregate that mutates and
//! re-persists them, [`views`] derives the read-side projections, and
//! [`auth`] tracks the signed-in identity. [`commands`] wires all of it to
//! the CLI surface.

pub mod auth;
pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod model;
pub mod render;
pub mod store;
pub mod views;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

/// Full CLI entry point: parse global options, load configuration, open the
/// store, and dispatch the subcommand.
#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting dayline CLI");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.daylinerc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = store::TaskStore::open(&data_dir)
        .with_context(|| format!("failed to open task store at {}", data_dir.display()))?;

    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(&store, &mut renderer, inv)?;

    info!("done");
    Ok(())
}
