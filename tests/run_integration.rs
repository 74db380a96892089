//! End-to-end library runs: index page, listing pages and downloads over HTTP.

use std::sync::Arc;
use std::time::Duration;

use harvester_core::{
    Discovery, DiscoveryConfig, ExistingFilePolicy, FAILURE_REPORT_FILE, HttpClient,
    ResumableDownloader, RetryPolicy, RunOrchestrator, TargetSelection, Transport, discover_targets,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

fn orchestrator(output: &std::path::Path, policy: ExistingFilePolicy) -> RunOrchestrator {
    let transport: Arc<dyn Transport> = Arc::new(HttpClient::new().unwrap());
    let discovery = Discovery::new(Arc::clone(&transport), DiscoveryConfig::default());
    let downloader = ResumableDownloader::new(RetryPolicy::new(
        2,
        Duration::from_millis(1),
        Duration::from_millis(10),
        Duration::ZERO,
    ));
    RunOrchestrator::new(transport, discovery, downloader, policy, output)
}

async fn mount_page(server: &MockServer, route: &str, markup: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .set_body_string(markup),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_index_to_files_on_disk() {
    let server = require_mock_server!();
    mount_page(
        &server,
        "/eleicoes",
        r#"<ul>
            <li><a href="/eleicoes/2024">Candidatos 2024</a></li>
            <li><a href="/eleicoes/2022">Candidatos 2022</a></li>
            <li><a href="/eleicoes/2020">Candidatos 2020</a></li>
        </ul>"#,
    )
    .await;
    mount_page(
        &server,
        "/eleicoes/2024",
        r#"<table>
            <tr><th>Arquivo</th><th>Link</th></tr>
            <tr><td>Candidatos 2024.csv</td><td><a href="/download?id=7">Baixar</a></td></tr>
        </table>"#,
    )
    .await;
    mount_page(&server, "/eleicoes/2022", "<p>Não há publicações para este ano.</p>").await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .and(query_param("id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ano;nome\n2024;Ana\n".to_vec()))
        .mount(&server)
        .await;

    let index_url = format!("{}/eleicoes", server.uri());
    let index = HttpClient::new().unwrap().fetch_page(&index_url).await.unwrap();
    let found = discover_targets(&index.markup, &index.final_url, "Candidatos").unwrap();
    assert_eq!(found.len(), 3);
    let selected = TargetSelection::Last(2).apply(&found);
    assert_eq!(
        selected.iter().map(|t| t.group_key.as_str()).collect::<Vec<_>>(),
        vec!["2024", "2022"]
    );

    let out = TempDir::new().unwrap();
    let summary = orchestrator(out.path(), ExistingFilePolicy::overwrite_all())
        .run(&selected)
        .await;

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pages_empty, 1);
    assert_eq!(summary.items_dropped, 0, "header rows are not resource items");
    assert_eq!(summary.report_path, None);
    assert_eq!(
        std::fs::read(out.path().join("2024").join("Candidatos 2024.csv")).unwrap(),
        b"ano;nome\n2024;Ana\n"
    );
    assert!(!out.path().join(FAILURE_REPORT_FILE).exists());
}

#[tokio::test]
async fn test_failures_do_not_stop_the_run() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/eleicoes/2018"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/eleicoes/2016",
        r#"<a href="/files/perdido.zip">Perdido</a>
           <a href="/files/presente.pdf">Presente</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/perdido.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/presente.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .mount(&server)
        .await;

    let targets = vec![
        harvester_core::PageTarget::new("2018", format!("{}/eleicoes/2018", server.uri())),
        harvester_core::PageTarget::new("2016", format!("{}/eleicoes/2016", server.uri())),
    ];
    let out = TempDir::new().unwrap();
    let summary = orchestrator(out.path(), ExistingFilePolicy::overwrite_all())
        .run(&targets)
        .await;

    assert_eq!(summary.pages_unreachable, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 1);
    assert!(out.path().join("2016").join("presente.pdf").exists());

    let report = std::fs::read_to_string(out.path().join(FAILURE_REPORT_FILE)).unwrap();
    assert!(report.starts_with("Failed downloads (1)"));
    assert!(report.contains("perdido.zip"));
    assert!(report.contains("Group: 2016"));
}
