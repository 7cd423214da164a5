//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive whole
//! crawl sessions end-to-end through the real HTTP fetcher and an on-disk
//! SQLite database.

use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use trf5_crawler::config::{Config, RetryConfig};
use trf5_crawler::crawler::{run_session, Abandonment, JobParams, SearchMode, SessionReport};
use trf5_crawler::storage::{PageKind, RunStatus, SqliteStorage, Storage};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CASE: &str = "0015648-78.1999.4.05.0000";
const PARTY: &str = "12345678000190";

const DETAIL_PAGE: &str = r#"<html><head><title>Processo</title></head><body>
    <p>PROCESSO Nº 0015648-78.1999.4.05.0000 (99.05.15648-0)</p>
    <p>AUTUADO EM 15/04/1999</p>
    <table>
      <tr><td>RELATOR</td><td>: DESEMBARGADOR FEDERAL JOÃO DA SILVA</td></tr>
      <tr><td>APTE</td><td>: FAZENDA NACIONAL</td></tr>
      <tr><td>APDO</td><td>: EMPRESA EXEMPLO LTDA</td></tr>
    </table>
    <table>
      <tr><td><a name="mov_1">Em 06/10/2020 03:13</a></td><td></td></tr>
      <tr><td></td><td>Conclusos para decisão</td></tr>
    </table>
</body></html>"#;

const FORM_PAGE: &str = r#"<html><head><title>Consulta</title></head><body>
    <h1>Consulta processual</h1>
    <form action="/cp/" method="post">
      <input type="hidden" name="sessao" value="s-42"/>
      <input type="text" name="filtro" value=""/>
    </form>
    <p>Informe o numero do processo para iniciar a consulta.</p>
</body></html>"#;

const NO_RESULTS_PAGE: &str = r#"<html><body><div class="aviso">Nenhum resultado
    encontrado para os parametros informados. Verifique os dados e tente novamente.</div>
</body></html>"#;

/// Detail page of another case
fn detail_page(case: &str) -> String {
    DETAIL_PAGE.replace(CASE, case)
}

/// Result list linking to the given case numbers
fn list_page(cases: &[String]) -> String {
    let rows: String = cases
        .iter()
        .map(|case| {
            format!(
                r#"<tr><td><a href="/cp/processo/{}">{}</a></td></tr>"#,
                &case[..7],
                case
            )
        })
        .collect();
    format!(
        "<html><body><h2>Consulta processual</h2><table>{}</table>\
         <p>Resultados ordenados pelo numero do processo.</p></body></html>",
        rows
    )
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Creates a test configuration against the mock server
fn create_test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.site.base_url = format!("{}/cp/", server.uri());
    config.site.stable_route = format!(
        "{}/cp/processo/cpf/porData/ativos/{{party}}/{{page}}",
        server.uri()
    );
    config.site.preload_form = false;
    config.site.obey_robots = false;
    config.site.download_delay_ms = 0;
    config.site.request_timeout_secs = 5.0;
    config.retry = RetryConfig {
        jitter: false,
        initial_delay_secs: 0.001,
        max_delay_secs: 0.01,
        ..RetryConfig::default()
    };
    config.output.database_path = dir
        .path()
        .join("trf5.db")
        .to_string_lossy()
        .into_owned();
    config
}

async fn run(
    config: &Config,
    jobs: Vec<JobParams>,
) -> (SessionReport, Arc<Mutex<SqliteStorage>>) {
    let storage = SqliteStorage::new(std::path::Path::new(&config.output.database_path))
        .expect("Failed to open DB");
    let storage = Arc::new(Mutex::new(storage));

    let session = run_session(
        config,
        "test-hash",
        storage.clone(),
        jobs,
        CancellationToken::new(),
    )
    .await
    .expect("Session failed");

    (session, storage)
}

#[tokio::test]
async fn test_identifier_search_returning_detail() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    // The submission answers with the detail page directly
    Mock::given(method("POST"))
        .and(path("/cp/"))
        .and(body_string_contains("tipo=xmlproc"))
        .respond_with(html(DETAIL_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir);
    let (session, storage) = run(
        &config,
        vec![JobParams::new(SearchMode::ByIdentifier, "00156487819994050000")],
    )
    .await;

    assert_eq!(session.jobs.len(), 1);
    let report = &session.jobs[0].report;
    assert_eq!(report.fetches_issued, 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].canonical_id, CASE);
    assert_eq!(report.records[0].rapporteur.as_deref(), Some("JOÃO DA SILVA"));

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_records().unwrap(), 1);
    let pages = storage.count_raw_pages_by_kind().unwrap();
    assert_eq!(pages.get(&PageKind::List), Some(&1));

    let run = storage.get_latest_run().unwrap().expect("No run recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.target, CASE);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!((run.records, run.fetches), (1, 1));

    let record = storage.get_record(CASE).unwrap().expect("Record not stored");
    assert_eq!(record.filed_on.as_deref(), Some("1999-04-15"));
    assert_eq!(record.movements.len(), 1);
}

#[tokio::test]
async fn test_identifier_search_with_form_preload() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/cp/"))
        .respond_with(html(FORM_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    // The hidden session field must travel with the submission
    Mock::given(method("POST"))
        .and(path("/cp/"))
        .and(body_string_contains("sessao=s-42"))
        .and(body_string_contains("filtro=0015648-78.1999.4.05.0000"))
        .respond_with(html(DETAIL_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, &dir);
    config.site.preload_form = true;
    let (session, _storage) = run(&config, vec![JobParams::new(SearchMode::ByIdentifier, CASE)]).await;

    let report = &session.jobs[0].report;
    assert_eq!(report.fetches_issued, 2);
    assert_eq!(report.records.len(), 1);
    assert!(report.abandoned.is_empty());
}

#[tokio::test]
async fn test_party_enumeration_respects_budget() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let cases: Vec<String> = (1..=5)
        .map(|i| format!("000000{}-11.2020.4.05.0000", i))
        .collect();

    // Page 0 offers five detail links
    Mock::given(method("GET"))
        .and(path(format!("/cp/processo/cpf/porData/ativos/{}/0", PARTY)))
        .respond_with(html(&list_page(&cases)))
        .expect(1)
        .mount(&server)
        .await;

    // Only the first three are followed
    for (i, case) in cases.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/cp/processo/{}", &case[..7])))
            .respond_with(html(&detail_page(case)))
            .expect(if i < 3 { 1 } else { 0 })
            .mount(&server)
            .await;
    }

    // Page 1 is requested once; page 2 never
    Mock::given(method("GET"))
        .and(path(format!("/cp/processo/cpf/porData/ativos/{}/1", PARTY)))
        .respond_with(html(NO_RESULTS_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/cp/processo/cpf/porData/ativos/{}/2", PARTY)))
        .respond_with(html(NO_RESULTS_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir);
    let params = JobParams::new(SearchMode::ByParty, PARTY).with_limits(Some(2), Some(3));
    let (session, storage) = run(&config, vec![params]).await;

    let report = &session.jobs[0].report;
    assert_eq!(report.details_followed, 3);
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.pages_processed, 1);
    assert_eq!(storage.lock().unwrap().count_records().unwrap(), 3);
}

#[tokio::test]
async fn test_retry_then_success() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    // First attempt hits a gateway error
    Mock::given(method("POST"))
        .and(path("/cp/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cp/"))
        .respond_with(html(DETAIL_PAGE))
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir);
    let (session, storage) = run(&config, vec![JobParams::new(SearchMode::ByIdentifier, CASE)]).await;

    let report = &session.jobs[0].report;
    assert_eq!(report.fetches_issued, 2);
    assert_eq!(report.retries_scheduled, 1);
    assert_eq!(report.records.len(), 1);

    // Both responses are kept in the audit trail
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_raw_pages_by_kind().unwrap().get(&PageKind::List), Some(&2));
}

#[tokio::test]
async fn test_exhausted_entry_fetch_abandons_job() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    Mock::given(method("POST"))
        .and(path("/cp/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(4)
        .mount(&server)
        .await;

    let config = create_test_config(&server, &dir);
    let (session, storage) = run(&config, vec![JobParams::new(SearchMode::ByIdentifier, CASE)]).await;

    let report = &session.jobs[0].report;
    assert!(report.job_abandoned);
    assert!(report.records.is_empty());
    assert!(matches!(
        report.abandoned[0],
        Abandonment::RetriesExhausted { attempts: 4, .. }
    ));

    let run = storage.lock().unwrap().get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Abandoned);
    assert_eq!(run.fetches, 4);
}

#[tokio::test]
async fn test_robots_disallow_blocks_entry() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /cp/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cp/"))
        .respond_with(html(DETAIL_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, &dir);
    config.site.obey_robots = true;
    let (session, _storage) = run(&config, vec![JobParams::new(SearchMode::ByIdentifier, CASE)]).await;

    let report = &session.jobs[0].report;
    assert_eq!(report.fetches_issued, 0);
    assert!(report.job_abandoned);
    assert!(matches!(report.abandoned[0], Abandonment::Disallowed { .. }));
}

#[tokio::test]
async fn test_invalid_targets_are_rejected_before_any_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let config = create_test_config(&server, &dir);
    let (session, storage) = run(
        &config,
        vec![
            JobParams::new(SearchMode::ByIdentifier, "12345"),
            JobParams::new(SearchMode::ByParty, ""),
        ],
    )
    .await;

    assert!(session.jobs.is_empty());
    assert_eq!(session.rejected.len(), 2);
    assert!(storage.lock().unwrap().get_latest_run().unwrap().is_none());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
