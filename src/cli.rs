//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use harvester_core::discovery::DEFAULT_INDEX_LINK_TEXT;
use harvester_core::{PageTarget, TargetSelection};

/// What to do when a target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnExisting {
    /// Ask per file (answers: s, o, sa, oa)
    Ask,
    /// Keep every existing file
    Skip,
    /// Replace every existing file
    Overwrite,
}

impl OnExisting {
    /// Parses the config-file spelling.
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "ask" => Some(Self::Ask),
            "skip" => Some(Self::Skip),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

/// Find downloadable files on listing pages and fetch them with resume.
///
/// Harvester walks per-year listing pages (found on an index page or given
/// directly), extracts the real file links from loosely structured markup,
/// and downloads them with resume, retry and overwrite control.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Index page that links to the per-year listing pages
    #[arg(long, value_name = "URL")]
    pub index: Option<String>,

    /// Anchor text that marks a per-year link on the index page
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_INDEX_LINK_TEXT)]
    pub index_link_text: String,

    /// Listing page to process directly, as KEY=URL (repeatable)
    #[arg(long = "page", value_name = "KEY=URL", value_parser = parse_page_target)]
    pub pages: Vec<PageTarget>,

    /// Index pages to process: all, "last N", or 1-based positions such as 1,3
    #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_selection)]
    pub select: TargetSelection,

    /// Base output directory (one subdirectory per page key)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Existing-file handling
    #[arg(long, value_enum, value_name = "MODE")]
    pub on_existing: Option<OnExisting>,

    /// Attempts per file before giving up (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Backoff unit in milliseconds; attempt k waits unit * 2^k (0-60000)
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub backoff_unit_ms: Option<u64>,

    /// Fallback renderer command for pages the plain fetch cannot load ({url} and {key} are substituted)
    #[arg(long, value_name = "CMD")]
    pub render_command: Option<String>,

    /// Phrase meaning "nothing published" (repeatable; replaces the defaults)
    #[arg(long = "empty-marker", value_name = "TEXT")]
    pub empty_markers: Vec<String>,

    /// Config file (default: $XDG_CONFIG_HOME/harvester/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}

fn parse_page_target(value: &str) -> Result<PageTarget, String> {
    let (key, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=URL, got '{value}'"))?;
    let (key, url) = (key.trim(), url.trim());
    if key.is_empty() {
        return Err("page key must not be empty".to_string());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("page URL must be http(s): '{url}'"));
    }
    Ok(PageTarget::new(key, url))
}

fn parse_selection(value: &str) -> Result<TargetSelection, String> {
    value.parse::<TargetSelection>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["harvester"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.index.is_none());
        assert!(args.pages.is_empty());
        assert_eq!(args.index_link_text, "Candidatos");
        assert_eq!(args.select, TargetSelection::All);
        assert!(args.max_retries.is_none());
        assert!(args.on_existing.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["harvester", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Args::try_parse_from(["harvester", "-q", "-v"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["harvester", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["harvester", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["harvester", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_pages_are_repeatable() {
        let args = Args::try_parse_from([
            "harvester",
            "--page",
            "2024=https://x.org/2024",
            "--page",
            "2022 = https://x.org/2022",
        ])
        .unwrap();
        assert_eq!(
            args.pages,
            vec![
                PageTarget::new("2024", "https://x.org/2024"),
                PageTarget::new("2022", "https://x.org/2022"),
            ]
        );
    }

    #[test]
    fn test_cli_page_rejects_malformed_values() {
        for bad in ["2024", "=https://x.org", "2024=ftp://x.org"] {
            let err = Args::try_parse_from(["harvester", "--page", bad]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation, "value {bad}");
        }
    }

    #[test]
    fn test_cli_select_forms() {
        let args = Args::try_parse_from(["harvester", "--select", "last 2"]).unwrap();
        assert_eq!(args.select, TargetSelection::Last(2));
        let args = Args::try_parse_from(["harvester", "--select", "1,3"]).unwrap();
        assert_eq!(args.select, TargetSelection::Indices(vec![1, 3]));
        let err = Args::try_parse_from(["harvester", "--select", "nope"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_max_retries_range() {
        let args = Args::try_parse_from(["harvester", "-r", "5"]).unwrap();
        assert_eq!(args.max_retries, Some(5));
        for bad in ["0", "11"] {
            let err = Args::try_parse_from(["harvester", "-r", bad]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_on_existing_values() {
        let args = Args::try_parse_from(["harvester", "--on-existing", "skip"]).unwrap();
        assert_eq!(args.on_existing, Some(OnExisting::Skip));
        let err = Args::try_parse_from(["harvester", "--on-existing", "maybe"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(OnExisting::from_label("overwrite"), Some(OnExisting::Overwrite));
        assert_eq!(OnExisting::from_label("nope"), None);
    }

    #[test]
    fn test_cli_empty_markers_and_render_command() {
        let args = Args::try_parse_from([
            "harvester",
            "--empty-marker",
            "nada publicado",
            "--empty-marker",
            "vazio",
            "--render-command",
            "chromium --headless --dump-dom {url}",
        ])
        .unwrap();
        assert_eq!(args.empty_markers, vec!["nada publicado", "vazio"]);
        assert_eq!(
            args.render_command.as_deref(),
            Some("chromium --headless --dump-dom {url}")
        );
    }
}
