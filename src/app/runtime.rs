use std::io::{self, BufReader, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::discovery::DiscoveryConfig;
use harvester_core::policy::LinePrompt;
use harvester_core::run::Interrupt;
use harvester_core::{
    CommandRenderer, Discovery, ExistingFilePolicy, HttpClient, PageTarget, ResumableDownloader,
    RetryPolicy, RunOrchestrator, RunSummary, Transport, discover_targets,
};
use tracing::{debug, error, info, warn};

use crate::ProcessExit;
use crate::app::progress::ProgressObserver;
use crate::app::{config_runtime, terminal};
use crate::app_config;
use crate::cli::{Args, OnExisting};

pub(crate) async fn run_harvester() -> Result<ProcessExit> {
    let args = Args::parse();

    let loaded = app_config::load_file_config_from(args.config.as_deref())?;
    let settings = config_runtime::resolve_settings(&args, loaded.config.as_ref())?;

    let default_level = config_runtime::resolve_default_log_level(&settings);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&args);
    let no_color = terminal::is_no_color_requested(args.no_color);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);

    debug!(?args, "CLI arguments parsed");
    if loaded.loaded_from_file
        && let Some(path) = &loaded.path
    {
        info!(path = %path.display(), "Loaded config file");
    }

    if args.index.is_none() && args.pages.is_empty() {
        info!("Nothing to do. Pass --index URL to scan an index page, or --page KEY=URL for a listing page.");
        info!("Example: harvester --index https://portal.example.org/eleicoes --select \"last 2\"");
        return Ok(ProcessExit::Success);
    }

    let client = HttpClient::with_timeouts(settings.timeouts).context("failed to build HTTP client")?;
    let transport: Arc<dyn Transport> = Arc::new(client);

    let mut targets = Vec::new();
    if let Some(index_url) = &args.index {
        let page = match transport.fetch_page(index_url).await {
            Ok(page) => page,
            Err(err) => {
                error!(url = %index_url, error = %err, "Index page could not be fetched");
                return Ok(ProcessExit::Failure);
            }
        };
        let found = discover_targets(&page.markup, &page.final_url, &args.index_link_text)
            .with_context(|| format!("Failed to scan index page '{index_url}'"))?;
        if found.is_empty() {
            error!(
                url = %index_url,
                link_text = %args.index_link_text,
                "Index page lists no matching pages"
            );
            return Ok(ProcessExit::Failure);
        }
        for (position, target) in found.iter().enumerate() {
            debug!(position = position + 1, key = %target.group_key, url = %target.url, "Index target");
        }

        let selected = args.select.apply(&found);
        if selected.is_empty() && args.pages.is_empty() {
            warn!(available = found.len(), "Selection matched no pages");
            return Ok(ProcessExit::Success);
        }
        info!(available = found.len(), selected = selected.len(), "Pages selected");
        targets.extend(selected);
    }
    append_explicit_pages(&mut targets, &args.pages);

    let config = DiscoveryConfig {
        empty_markers: settings.empty_markers.clone(),
        ..DiscoveryConfig::default()
    };
    let mut discovery = Discovery::new(Arc::clone(&transport), config);
    if let Some(renderer) = settings
        .render_command
        .as_deref()
        .and_then(CommandRenderer::from_template)
    {
        discovery = discovery.with_renderer(Arc::new(renderer));
    }

    let policy = match settings.on_existing {
        OnExisting::Ask => {
            ExistingFilePolicy::new(Box::new(LinePrompt::new(BufReader::new(io::stdin()), io::stderr())))
        }
        OnExisting::Skip => ExistingFilePolicy::skip_all(),
        OnExisting::Overwrite => ExistingFilePolicy::overwrite_all(),
    };

    let retry = RetryPolicy::with_max_attempts(settings.max_retries).with_unit(settings.backoff_unit);

    let interrupt = Interrupt::new();
    let interrupt_signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt_signal.trigger();
        }
    });

    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        settings.quiet,
        terminal::is_dumb_terminal(),
    );

    let orchestrator = RunOrchestrator::new(
        transport,
        discovery,
        ResumableDownloader::new(retry),
        policy,
        &settings.output_dir,
    )
    .with_observer(Arc::new(ProgressObserver::new(show_progress)))
    .with_interrupt(interrupt);

    info!(pages = targets.len(), output = %settings.output_dir.display(), "Harvester starting");
    let summary = orchestrator.run(&targets).await;
    print_summary(&summary, settings.quiet);

    if summary.interrupted {
        warn!("Interrupted. Run again to resume partial files.");
    }
    Ok(ProcessExit::Success)
}

/// Adds `--page` targets after the index targets, skipping exact repeats.
fn append_explicit_pages(targets: &mut Vec<PageTarget>, pages: &[PageTarget]) {
    for page in pages {
        if !targets.contains(page) {
            targets.push(page.clone());
        }
    }
}

fn print_summary(summary: &RunSummary, quiet: bool) {
    if quiet {
        return;
    }
    eprintln!();
    eprintln!(
        "Pages: {} processed, {} empty, {} unreachable",
        summary.pages_processed, summary.pages_empty, summary.pages_unreachable
    );
    eprintln!(
        "Files: {} downloaded, {} skipped, {} failed",
        summary.downloaded, summary.skipped, summary.failed
    );
    if summary.items_dropped > 0 {
        eprintln!("Items without a usable link: {}", summary.items_dropped);
    }
    if let Some(path) = &summary.report_path {
        eprintln!("Failure report: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_explicit_pages_skips_repeats() {
        let mut targets = vec![PageTarget::new("2024", "https://x.org/2024")];
        append_explicit_pages(
            &mut targets,
            &[
                PageTarget::new("2024", "https://x.org/2024"),
                PageTarget::new("extra", "https://x.org/extra"),
            ],
        );
        assert_eq!(
            targets,
            vec![
                PageTarget::new("2024", "https://x.org/2024"),
                PageTarget::new("extra", "https://x.org/extra"),
            ]
        );
    }
}
