//! Shared helpers for command handlers.

use std::io::{self, IsTerminal};

use serde::Serialize;

use fleetwall_core::{AccountingSource, Direction, Outcome};

use crate::cli::{DirectionArg, OutputFormat, SourceArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

pub fn direction(arg: DirectionArg) -> Direction {
    match arg {
        DirectionArg::In => Direction::In,
        DirectionArg::Out => Direction::Out,
        DirectionArg::Both => Direction::Both,
    }
}

pub fn source(args: SourceArgs) -> AccountingSource {
    match args.device {
        Some(device) if !args.local => AccountingSource::Device(device),
        _ => AccountingSource::LocalHost,
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so `--yes` is required.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(io::Error::other(e)))?;
    Ok(confirmed)
}

/// Report a mutation outcome.
///
/// Structured formats print the outcome itself; table and plain print the
/// message on stderr. An unsuccessful outcome becomes an error.
pub fn report(ctx: &Context, outcome: &Outcome) -> Result<(), CliError> {
    if !outcome.success {
        return Err(CliError::OperationFailed {
            message: outcome.message.clone(),
        });
    }
    match ctx.format {
        OutputFormat::Table | OutputFormat::Plain => output::note(&outcome.message, ctx.quiet),
        _ => print_single(ctx, outcome, |o| o.message.clone())?,
    }
    if outcome.confirmed == Some(false) {
        tracing::warn!("rule was installed but does not show up in the device listing");
    }
    Ok(())
}

/// Render a single item whose table and plain views are the same text.
pub fn print_single<T: Serialize>(
    ctx: &Context,
    data: &T,
    text: impl Fn(&T) -> String,
) -> Result<(), CliError> {
    let out = output::render_single(ctx.format, data, &text, &text)?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}
