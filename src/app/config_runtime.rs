//! Merges CLI flags over config-file values over built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use harvester_core::discovery::DEFAULT_EMPTY_MARKERS;
use harvester_core::download::TimeoutSettings;
use harvester_core::DEFAULT_MAX_RETRIES;

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::{Args, OnExisting};

/// Base directory used when neither `-o` nor `output_dir` is given.
pub(crate) const DEFAULT_OUTPUT_DIR: &str = "downloads";

const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSettings {
    pub(crate) output_dir: PathBuf,
    pub(crate) on_existing: OnExisting,
    pub(crate) max_retries: u32,
    pub(crate) backoff_unit: Duration,
    pub(crate) timeouts: TimeoutSettings,
    pub(crate) render_command: Option<String>,
    pub(crate) empty_markers: Vec<String>,
    pub(crate) verbose: u8,
    pub(crate) quiet: bool,
}

pub(crate) fn resolve_settings(args: &Args, file_config: Option<&FileConfig>) -> Result<RunSettings> {
    let fallback = FileConfig::default();
    let file = file_config.unwrap_or(&fallback);

    let render_command = args.render_command.clone().or_else(|| file.render_command.clone());
    if let Some(template) = &render_command
        && template.split_whitespace().next().is_none()
    {
        bail!("Invalid render command: the template is blank");
    }

    let empty_markers = if args.empty_markers.is_empty() {
        file.empty_markers.clone().unwrap_or_else(|| {
            DEFAULT_EMPTY_MARKERS.iter().map(ToString::to_string).collect()
        })
    } else {
        args.empty_markers.clone()
    };

    let (verbose, quiet) = if args.verbose > 0 || args.quiet {
        (args.verbose, args.quiet)
    } else {
        match file.verbosity {
            Some(VerbositySetting::Verbose) => (1, false),
            Some(VerbositySetting::Debug) => (2, false),
            Some(VerbositySetting::Quiet) => (0, true),
            Some(VerbositySetting::Default) | None => (0, false),
        }
    };

    Ok(RunSettings {
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        on_existing: args.on_existing.or(file.on_existing).unwrap_or(OnExisting::Ask),
        max_retries: args.max_retries.or(file.max_retries).unwrap_or(DEFAULT_MAX_RETRIES),
        backoff_unit: Duration::from_millis(
            args.backoff_unit_ms
                .or(file.backoff_unit_ms)
                .unwrap_or(DEFAULT_BACKOFF_UNIT_MS),
        ),
        timeouts: resolve_http_timeouts(file),
        render_command,
        empty_markers,
        verbose,
        quiet,
    })
}

pub(crate) fn resolve_http_timeouts(file_config: &FileConfig) -> TimeoutSettings {
    let mut settings = TimeoutSettings::default();
    if let Some(value) = file_config.connect_timeout_secs {
        settings.connect = Duration::from_secs(value);
    }
    if let Some(value) = file_config.page_timeout_secs {
        settings.page = Duration::from_secs(value);
    }
    if let Some(value) = file_config.read_timeout_secs {
        settings.read = Duration::from_secs(value);
    }
    settings
}

pub(crate) fn resolve_default_log_level(settings: &RunSettings) -> &'static str {
    if settings.quiet {
        "error"
    } else {
        match settings.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// `-v`/`-q` on the command line override `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(args: &Args) -> bool {
    args.verbose > 0 || args.quiet
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["harvester"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_without_config() {
        let settings = resolve_settings(&args(&[]), None).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("downloads"));
        assert_eq!(settings.on_existing, OnExisting::Ask);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.backoff_unit, Duration::from_secs(1));
        assert_eq!(settings.timeouts, TimeoutSettings::default());
        assert_eq!(settings.empty_markers.len(), DEFAULT_EMPTY_MARKERS.len());
        assert!(settings.render_command.is_none());
        assert_eq!(resolve_default_log_level(&settings), "info");
    }

    #[test]
    fn test_config_fills_unset_flags() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/data")),
            max_retries: Some(5),
            backoff_unit_ms: Some(10),
            read_timeout_secs: Some(600),
            on_existing: Some(OnExisting::Skip),
            empty_markers: Some(vec!["vazio".to_string()]),
            verbosity: Some(VerbositySetting::Verbose),
            ..FileConfig::default()
        };
        let settings = resolve_settings(&args(&[]), Some(&file)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/data"));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.backoff_unit, Duration::from_millis(10));
        assert_eq!(settings.timeouts.read, Duration::from_secs(600));
        assert_eq!(settings.timeouts.connect, TimeoutSettings::default().connect);
        assert_eq!(settings.on_existing, OnExisting::Skip);
        assert_eq!(settings.empty_markers, vec!["vazio"]);
        assert_eq!(resolve_default_log_level(&settings), "debug");
    }

    #[test]
    fn test_cli_wins_over_config() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/data")),
            max_retries: Some(5),
            on_existing: Some(OnExisting::Skip),
            empty_markers: Some(vec!["vazio".to_string()]),
            verbosity: Some(VerbositySetting::Debug),
            ..FileConfig::default()
        };
        let settings = resolve_settings(
            &args(&[
                "-o",
                "/tmp/out",
                "-r",
                "2",
                "--on-existing",
                "overwrite",
                "--empty-marker",
                "nada",
                "-q",
            ]),
            Some(&file),
        )
        .unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.on_existing, OnExisting::Overwrite);
        assert_eq!(settings.empty_markers, vec!["nada"]);
        assert_eq!(resolve_default_log_level(&settings), "error");
    }

    #[test]
    fn test_blank_render_command_is_rejected() {
        let err = resolve_settings(&args(&["--render-command", "  "]), None).unwrap_err();
        assert!(err.to_string().contains("render command"));
    }

    #[test]
    fn test_force_cli_log_level_only_for_explicit_flags() {
        assert!(!should_force_cli_log_level(&args(&[])));
        assert!(should_force_cli_log_level(&args(&["-v"])));
        assert!(should_force_cli_log_level(&args(&["-q"])));
    }

    #[test]
    fn test_trace_level_for_double_verbose() {
        let settings = resolve_settings(&args(&["-vv"]), None).unwrap();
        assert_eq!(resolve_default_log_level(&settings), "trace");
    }
}
