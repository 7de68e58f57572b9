//! IP block command handlers.

use tabled::Tabled;

use fleetwall_core::{BlockRequest, BlockRule, RawListing};

use crate::cli::{BlocksArgs, BlocksCommand, OutputFormat};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct BlockRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Chain")]
    chain: String,
    #[tabled(rename = "Managed")]
    managed: String,
}

impl From<&BlockRule> for BlockRow {
    fn from(r: &BlockRule) -> Self {
        Self {
            target: r.target.to_string(),
            port: output::or_dash(r.port),
            direction: r.direction.to_string(),
            chain: r.chain.clone(),
            managed: if r.is_managed() { "yes" } else { "-" }.into(),
        }
    }
}

fn raw_text(listings: &[RawListing]) -> String {
    listings
        .iter()
        .map(|l| format!("── {} ──\n{}", l.scope, l.output.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub async fn handle(ctx: &Context, args: BlocksArgs) -> Result<(), CliError> {
    match args.command {
        BlocksCommand::Add {
            device,
            target,
            port,
            direction,
            confirm,
        } => {
            let request = BlockRequest {
                target,
                port,
                direction: util::direction(direction),
                confirm,
            };
            let outcome = ctx.fleet()?.add_block(&device, &request).await?;
            util::report(ctx, &outcome)
        }

        BlocksCommand::List { device, direction } => {
            let rules = ctx
                .fleet()?
                .list_blocks(&device, util::direction(direction))
                .await?;
            let out = output::render_list(
                ctx.format,
                &rules,
                |r| BlockRow::from(r),
                |r| r.target.to_string(),
            )?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        BlocksCommand::Remove { device, target } => {
            let outcome = ctx.fleet()?.remove_block(&device, &target).await?;
            util::report(ctx, &outcome)
        }

        BlocksCommand::Clear { device } => {
            if !util::confirm(
                &format!("Remove every deny rule on {device}?"),
                "blocks clear",
                ctx.yes,
            )? {
                return Ok(());
            }
            let outcome = ctx.fleet()?.clear_blocks(&device).await?;
            util::report(ctx, &outcome)
        }

        BlocksCommand::Raw { device } => {
            let listings = ctx.fleet()?.raw_rules(&device).await?;
            let out = match ctx.format {
                OutputFormat::Table | OutputFormat::Plain => raw_text(&listings),
                format => {
                    output::render_single(format, &listings, |l| raw_text(l), |_| String::new())?
                }
            };
            output::print_output(&out, ctx.quiet);
            Ok(())
        }
    }
}
