//! Domain block command handlers.

use tabled::Tabled;

use fleetwall_core::DomainName;

use crate::cli::{DomainsArgs, DomainsCommand, OutputFormat};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct DomainRow {
    #[tabled(rename = "Domain")]
    domain: String,
}

pub async fn handle(ctx: &Context, args: DomainsArgs) -> Result<(), CliError> {
    match args.command {
        DomainsCommand::Add { device, domain } => {
            let fleet = ctx.fleet()?;
            let pb = output::spinner("Reloading resolver...", ctx.quiet);
            let result = fleet.block_domain(&device, &domain).await;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            util::report(ctx, &result?)
        }

        DomainsCommand::List { device } => {
            let listing = ctx.fleet()?.list_domains(&device).await?;
            let out = match ctx.format {
                OutputFormat::Table | OutputFormat::Plain => output::render_list(
                    ctx.format,
                    &listing.domains,
                    |d: &DomainName| DomainRow {
                        domain: d.to_string(),
                    },
                    DomainName::to_string,
                )?,
                format => {
                    output::render_single(format, &listing, |_| String::new(), |_| String::new())?
                }
            };
            output::print_output(&out, ctx.quiet);
            if ctx.format == OutputFormat::Table {
                output::note(&format!("{} blocked", listing.total_count), ctx.quiet);
            }
            Ok(())
        }

        DomainsCommand::Remove { device, domain } => {
            let fleet = ctx.fleet()?;
            let pb = output::spinner("Reloading resolver...", ctx.quiet);
            let result = fleet.unblock_domain(&device, &domain).await;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            util::report(ctx, &result?)
        }

        DomainsCommand::Clear { device } => {
            if !util::confirm(
                &format!("Unblock every domain on {device}?"),
                "domains clear",
                ctx.yes,
            )? {
                return Ok(());
            }
            let outcome = ctx.fleet()?.clear_domains(&device).await?;
            util::report(ctx, &outcome)
        }
    }
}
