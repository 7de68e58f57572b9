//! Command dispatch: bridges CLI args -> `Fleet` calls -> output formatting.

pub mod blocks;
pub mod config_cmd;
pub mod conns;
pub mod devices;
pub mod domains;
pub mod interfaces;
pub mod util;

use crate::cli::Command;
use crate::config::Context;
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(ctx, args).await,
        Command::Blocks(args) => blocks::handle(ctx, args).await,
        Command::Domains(args) => domains::handle(ctx, args).await,
        Command::Conns(args) => conns::handle(ctx, args).await,
        Command::Interfaces { device } => interfaces::handle(ctx, &device).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}
