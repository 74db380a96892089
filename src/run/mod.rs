//! Run orchestration: pages in, files on disk and a summary out.
//!
//! Pages are processed one at a time and resources in source order. A page
//! that cannot be reached or a file that fails is recorded and the run moves
//! on; nothing short of an interrupt stops it early.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use crate::discovery::{Discovery, PageDiscovery, PageTarget, Resource};
use crate::download::filename::{storage_name, unique_name};
use crate::download::{DownloadOutcome, NoopObserver, ResumableDownloader, TransferObserver, Transport};
use crate::failure::{FAILURE_REPORT_FILE, FailureRecord, write_failure_report};
use crate::policy::ExistingFilePolicy;

/// Cooperative stop signal shared between the signal handler and the run.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes anything waiting on it.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the signal has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is set.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Counts and failures of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pages_processed: usize,
    pub pages_empty: usize,
    pub pages_unreachable: usize,
    /// Resource items dropped for lack of a usable link.
    pub items_dropped: usize,
    pub failures: Vec<FailureRecord>,
    /// Where the failure report was written, if anywhere.
    pub report_path: Option<PathBuf>,
    pub interrupted: bool,
}

impl RunSummary {
    /// Files attempted (downloaded, skipped or failed).
    #[must_use]
    pub fn files_total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

/// Drives discovery and downloading across page targets.
pub struct RunOrchestrator {
    transport: Arc<dyn Transport>,
    discovery: Discovery,
    downloader: ResumableDownloader,
    policy: ExistingFilePolicy,
    output_dir: PathBuf,
    observer: Arc<dyn TransferObserver>,
    interrupt: Interrupt,
}

impl RunOrchestrator {
    /// Creates an orchestrator writing under `output_dir`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        discovery: Discovery,
        downloader: ResumableDownloader,
        policy: ExistingFilePolicy,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            discovery,
            downloader,
            policy,
            output_dir: output_dir.into(),
            observer: Arc::new(NoopObserver),
            interrupt: Interrupt::new(),
        }
    }

    /// Reports transfer progress to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Stops the run when `interrupt` fires; the current transfer is
    /// abandoned and its partial file kept for resume.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Path of the failure report.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(FAILURE_REPORT_FILE)
    }

    /// Directory that receives the files of `target`.
    #[must_use]
    pub fn page_dir(&self, target: &PageTarget) -> PathBuf {
        self.output_dir.join(storage_name(&target.group_key))
    }

    /// Processes every target and writes the failure report when needed.
    #[instrument(skip(self, targets), fields(pages = targets.len(), output = %self.output_dir.display()))]
    pub async fn run(&self, targets: &[PageTarget]) -> RunSummary {
        let mut summary = RunSummary::default();

        for target in targets {
            if self.interrupt.is_set() {
                summary.interrupted = true;
                break;
            }
            summary.pages_processed += 1;

            let resources = match self.discovery.discover(target).await {
                Ok(PageDiscovery::Empty { .. }) => {
                    summary.pages_empty += 1;
                    continue;
                }
                Ok(PageDiscovery::Resources(extraction)) => {
                    summary.items_dropped += extraction.diagnostics.len();
                    extraction.resources
                }
                Err(err) => {
                    warn!(key = %target.group_key, url = %target.url, error = %err, "Skipping page");
                    summary.pages_unreachable += 1;
                    continue;
                }
            };

            if !self.download_page(target, &resources, &mut summary).await {
                summary.interrupted = true;
                break;
            }
        }

        self.finish(&mut summary).await;
        summary
    }

    /// Downloads one page's resources; returns false when interrupted.
    async fn download_page(
        &self,
        target: &PageTarget,
        resources: &[Resource],
        summary: &mut RunSummary,
    ) -> bool {
        let page_dir = self.page_dir(target);
        let mut used_names = HashSet::new();

        for resource in resources {
            let name = unique_name(&mut used_names, &storage_name(&resource.filename));
            let path = page_dir.join(&name);

            let outcome = tokio::select! {
                outcome = self.download_one(resource, &path) => outcome,
                () = self.interrupt.wait() => {
                    warn!(path = %path.display(), "Interrupted; partial file kept for resume");
                    return false;
                }
            };

            match outcome {
                DownloadOutcome::Downloaded { bytes, resumed, .. } => {
                    info!(file = %name, bytes, resumed, "Downloaded");
                    summary.downloaded += 1;
                }
                DownloadOutcome::Skipped { .. } => summary.skipped += 1,
                DownloadOutcome::Failed { error, attempts } => {
                    warn!(file = %name, url = %resource.url, attempts, error = %error, "Download failed");
                    summary.failed += 1;
                    summary.failures.push(FailureRecord::from_error(
                        &target.group_key,
                        &name,
                        &resource.url,
                        &error,
                    ));
                }
            }
        }
        true
    }

    async fn download_one(&self, resource: &Resource, path: &Path) -> DownloadOutcome {
        self.downloader
            .download(
                self.transport.as_ref(),
                &resource.url,
                path,
                &self.policy,
                self.observer.as_ref(),
            )
            .await
    }

    async fn finish(&self, summary: &mut RunSummary) {
        let report_path = self.report_path();
        match write_failure_report(&report_path, &summary.failures).await {
            Ok(true) => summary.report_path = Some(report_path),
            Ok(false) => {}
            Err(err) => {
                warn!(path = %report_path.display(), error = %err, "Could not write failure report");
            }
        }
        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            pages_empty = summary.pages_empty,
            pages_unreachable = summary.pages_unreachable,
            interrupted = summary.interrupted,
            "Run finished"
        );
    }
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("discovery", &self.discovery)
            .field("downloader", &self.downloader)
            .field("policy", &self.policy)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::discovery::DiscoveryConfig;
    use crate::download::RetryPolicy;
    use crate::failure::FailureCategory;
    use crate::policy::{ExistingFileAnswer, ExistingFilePrompt};
    use crate::test_support::page_transport::PageTransport;

    const PAGE_2024: &str = "https://portal.example.org/2024";
    const PAGE_2022: &str = "https://portal.example.org/2022";

    fn orchestrator(transport: PageTransport, dir: &Path, policy: ExistingFilePolicy) -> RunOrchestrator {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let discovery = Discovery::new(Arc::clone(&transport), DiscoveryConfig::default());
        let downloader = ResumableDownloader::new(RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Duration::ZERO,
        ));
        RunOrchestrator::new(transport, discovery, downloader, policy, dir)
    }

    fn two_page_transport() -> PageTransport {
        PageTransport::new()
            .with_page(
                PAGE_2024,
                r#"<table>
                    <tr><td>Edital 045/2024.pdf</td><td><a href="/baixar?id=1">Baixar</a></td></tr>
                    <tr><td>Edital 045/2024.pdf</td><td><a href="/baixar?id=2">Baixar</a></td></tr>
                    <tr><td>Anexo.csv</td><td><a href="/baixar?id=3">Baixar</a></td></tr>
                </table>"#,
            )
            .with_page(PAGE_2022, "<p>Sem dados para este ano.</p>")
            .with_file("https://portal.example.org/baixar?id=1", b"first")
            .with_file("https://portal.example.org/baixar?id=2", b"second")
    }

    #[tokio::test]
    async fn test_run_dedupes_names_and_records_failures() {
        let dir = TempDir::new().unwrap();
        let run = orchestrator(two_page_transport(), dir.path(), ExistingFilePolicy::overwrite_all());
        let targets = vec![
            PageTarget::new("2024", PAGE_2024),
            PageTarget::new("2022", PAGE_2022),
            PageTarget::new("2020", "https://portal.example.org/2020"),
        ];

        let summary = run.run(&targets).await;

        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pages_processed, 3);
        assert_eq!(summary.pages_empty, 1);
        assert_eq!(summary.pages_unreachable, 1);
        assert!(!summary.interrupted);

        let page_dir = dir.path().join("2024");
        assert_eq!(std::fs::read(page_dir.join("Edital 0452024.pdf")).unwrap(), b"first");
        assert_eq!(std::fs::read(page_dir.join("Edital 0452024_2.pdf")).unwrap(), b"second");

        assert_eq!(summary.failures.len(), 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.context_label, "2024");
        assert_eq!(failure.filename, "Anexo.csv");
        assert_eq!(failure.descriptor.category, FailureCategory::NotFound);

        let report = summary.report_path.clone().unwrap();
        assert_eq!(report, dir.path().join(FAILURE_REPORT_FILE));
        assert!(std::fs::read_to_string(report).unwrap().contains("Anexo.csv"));
    }

    #[tokio::test]
    async fn test_second_run_skips_existing_files() {
        let dir = TempDir::new().unwrap();
        let transport = PageTransport::new()
            .with_page(PAGE_2024, r#"<a href="/files/ata.pdf">Ata</a>"#)
            .with_file("https://portal.example.org/files/ata.pdf", b"ata");
        let targets = vec![PageTarget::new("2024", PAGE_2024)];

        let first = orchestrator(transport, dir.path(), ExistingFilePolicy::skip_all())
            .run(&targets)
            .await;
        assert_eq!(first.downloaded, 1);
        assert_eq!(first.report_path, None);
        assert!(!dir.path().join(FAILURE_REPORT_FILE).exists());

        let transport = PageTransport::new()
            .with_page(PAGE_2024, r#"<a href="/files/ata.pdf">Ata</a>"#)
            .with_file("https://portal.example.org/files/ata.pdf", b"changed");
        let second = orchestrator(transport, dir.path(), ExistingFilePolicy::skip_all())
            .run(&targets)
            .await;
        assert_eq!(second.skipped, 1);
        assert_eq!(std::fs::read(dir.path().join("2024/ata.pdf")).unwrap(), b"ata");
    }

    #[tokio::test]
    async fn test_interrupt_before_start_processes_nothing() {
        let dir = TempDir::new().unwrap();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let run = orchestrator(two_page_transport(), dir.path(), ExistingFilePolicy::overwrite_all())
            .with_interrupt(interrupt);

        let summary = run.run(&[PageTarget::new("2024", PAGE_2024)]).await;
        assert!(summary.interrupted);
        assert_eq!(summary.pages_processed, 0);
        assert_eq!(summary.files_total(), 0);
    }

    struct UnansweredPrompt(std::sync::mpsc::Receiver<ExistingFileAnswer>);

    impl ExistingFilePrompt for UnansweredPrompt {
        fn ask(&mut self, _path: &Path, _existing_bytes: u64) -> ExistingFileAnswer {
            self.0.recv().unwrap_or(ExistingFileAnswer::SkipOnce)
        }
    }

    #[tokio::test]
    async fn test_interrupt_while_existing_file_prompt_waits() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        std::fs::write(dir.path().join("2024/ata.pdf"), b"old").unwrap();
        let transport = PageTransport::new()
            .with_page(PAGE_2024, r#"<a href="/files/ata.pdf">Ata</a>"#)
            .with_file("https://portal.example.org/files/ata.pdf", b"new");
        let (answers, unanswered) = std::sync::mpsc::channel();
        let policy = ExistingFilePolicy::new(Box::new(UnansweredPrompt(unanswered)));
        let interrupt = Interrupt::new();
        let run = orchestrator(transport, dir.path(), policy).with_interrupt(interrupt.clone());

        let signal = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.trigger();
        });
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            run.run(&[PageTarget::new("2024", PAGE_2024)]),
        )
        .await
        .unwrap();
        signal.await.unwrap();
        drop(answers);

        assert!(summary.interrupted);
        assert_eq!(summary.files_total(), 0);
        assert_eq!(std::fs::read(dir.path().join("2024/ata.pdf")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_interrupt_wait_wakes_after_trigger() {
        let interrupt = Interrupt::new();
        let waiter = {
            let interrupt = interrupt.clone();
            tokio::spawn(async move { interrupt.wait().await })
        };
        tokio::task::yield_now().await;
        interrupt.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
