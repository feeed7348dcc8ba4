use std::process::ExitCode;

use cdnsync_config::{generate_default_config, Config};
use cdnsync_core::{CoreError, CoreResult};
use cdnsync_operations::{remove::remove_version, sync::sync, SyncContext, SyncOptions};
use clap::Parser;
use cli::{Args, Commands, ConfigAction, KvAction};
use logging::setup_logging;
use tracing::{debug, info, warn};

mod cli;
mod kv;
mod logging;
mod summary;
mod utils;

/// Runs the command; `Ok(false)` when it finished but some packages failed.
async fn handle_cli(args: Args) -> CoreResult<bool> {
    let config_path = args.config.as_deref();

    match args.command {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            generate_default_config(config_path)?;
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            let config = Config::load(config_path)?;
            info!("{}", config.to_annotated_document()?);
        }
        Commands::Sync {
            packages,
            dry_run,
        } => {
            let config = Config::load(config_path)?;
            let ctx = SyncContext::new(&config, dry_run)?;
            if dry_run {
                info!("Dry run: nothing is written to the KV store");
            }

            let cancel = ctx.cancel_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing the current package");
                    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            });

            let options = SyncOptions {
                packages,
            };
            let report = tokio::task::block_in_place(|| sync(&ctx, &options))?;
            summary::display_sync_report(&report);
            return Ok(!report.has_failures());
        }
        Commands::RemoveVersion {
            package,
            version,
        } => {
            let config = Config::load(config_path)?;
            let ctx = SyncContext::new(&config, false)?;
            remove_version(&ctx, &package, &version)?;
        }
        Commands::Kv {
            action,
        } => {
            let config = Config::load(config_path)?;
            let ctx = SyncContext::new(&config, false)?;
            match action {
                KvAction::List {
                    namespace,
                    path,
                } => kv::list_keys(&ctx, namespace, &path)?,
                KvAction::Get {
                    namespace,
                    key,
                } => kv::get_record(&ctx, namespace, &key)?,
            }
        }
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let args = Args::parse();
    setup_logging(&args);
    utils::set_color(!args.no_color);
    debug!("cdnsync {}", env!("CARGO_PKG_VERSION"));

    match handle_cli(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            report_error(err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: CoreError) {
    eprintln!("{:?}", miette::Report::new(err));
}
