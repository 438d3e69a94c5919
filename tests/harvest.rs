//! End-to-end crawls against the in-memory browser.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::{tempdir, TempDir};

use listharvest::browser::fake::{FakeLauncher, FakeSite};
use listharvest::browser::BrowserCookie;
use listharvest::config::Config;
use listharvest::controller::{CrawlRequest, Harvester, RetryPolicy};
use listharvest::error::HarvestError;
use listharvest::operator::AutoConfirm;
use listharvest::pacing::Pacer;
use listharvest::session::CrawlSession;
use listharvest::sink::CsvSink;

const BASE: &str = "https://www.olx.in/en-in/bengaluru_g4058803/motorcycles_c81";
const LISTING: &str = "div._2v8Tq";

fn listing(title: Option<&str>, price: &str, details: &str, location: &str) -> String {
    let title = title
        .map(|t| format!(r#"<div class="_2Gr10" data-aut-id="itemTitle">{}</div>"#, t))
        .unwrap_or_default();
    format!(
        r#"<div class="_2v8Tq">{}<span class="_1zgtX" data-aut-id="itemPrice">{}</span><div class="_21gnE" data-aut-id="itemSubTitle">{}</div><div class="_3VRSm" data-aut-id="itemDetails"><span>{}</span><span>Today</span></div></div>"#,
        title, price, details, location
    )
}

fn pager(labels: &[u32], broken: bool) -> String {
    labels
        .iter()
        .map(|n| {
            format!(
                r#"<a data-aut-id="pageItem"{} href="?page={n}">{n}</a>"#,
                if broken { r#" data-broken="1""# } else { "" },
                n = n
            )
        })
        .collect()
}

fn next_link(page: u32) -> String {
    format!(r#"<a data-aut-id="pagination-next" href="?page={}">Next</a>"#, page)
}

fn document(listings: &[String], pagination: &str) -> String {
    format!(
        "<html><body><ul>{}</ul><nav>{}</nav></body></html>",
        listings.concat(),
        pagination
    )
}

fn page_one(pagination: &str) -> String {
    document(
        &[
            listing(
                Some("Royal Enfield Classic 350"),
                "₹ 1,45,000",
                "2019 - 12,017 km",
                "Indiranagar, Bengaluru",
            ),
            listing(
                Some("Bajaj Pulsar 150"),
                "Price on request",
                "2017 - 30,500 km",
                "HSR Layout, Bengaluru",
            ),
            listing(
                Some("Honda Activa 6G"),
                "₹ 62,000",
                "2021 - 4,100 km",
                "Whitefield, Bengaluru",
            ),
        ],
        pagination,
    )
}

fn page_two(pagination: &str) -> String {
    document(
        &[
            listing(
                Some("TVS Apache RTR 160"),
                "₹ 78,500",
                "2020 - 15,000 km",
                "Jayanagar, Bengaluru",
            ),
            listing(
                Some("Yamaha FZ V3"),
                "₹ 90,000",
                "2022 - 6,800 km",
                "Hebbal, Bengaluru",
            ),
        ],
        pagination,
    )
}

/// Two pages, navigable through the page controls.
fn two_page_site() -> FakeSite {
    FakeSite::new(BASE)
        .page(1, page_one(&pager(&[1, 2], false)))
        .page(2, page_two(&pager(&[1, 2], false)))
}

struct Rig {
    dir: TempDir,
    config: Config,
    pacer: Arc<Pacer>,
}

impl Rig {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.crawl.output_dir = dir.path().join("out");
        config.crawl.cookie_dir = dir.path().join("cookies");
        config.browser.element_timeout = 0;
        Self {
            dir,
            config,
            pacer: Arc::new(Pacer::instant(7)),
        }
    }

    fn session(&self) -> CrawlSession {
        CrawlSession::new(BASE, &self.config).unwrap()
    }

    fn harvester(
        &self,
        launcher: FakeLauncher,
    ) -> (Harvester<FakeLauncher>, Arc<CsvSink>, Arc<AutoConfirm>) {
        let session = self.session();
        let sink = Arc::new(CsvSink::init(session.output_path()).unwrap());
        let operator = Arc::new(AutoConfirm::new());
        let harvester = Harvester::new(session, launcher, self.config.clone(), sink.clone())
            .with_pacer(self.pacer.clone())
            .with_operator(operator.clone());
        (harvester, sink, operator)
    }
}

fn rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn no_wait(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::ZERO)
}

#[tokio::test]
async fn test_two_page_crawl_writes_every_listing() {
    let rig = Rig::new();
    let (harvester, sink, operator) = rig.harvester(FakeLauncher::new(two_page_site()));

    let report = harvester.run(&CrawlRequest::default()).await.unwrap();

    assert_eq!(report.pages_processed, 2);
    assert_eq!(report.listings_seen, 5);
    assert_eq!(report.records_written, 5);
    assert_eq!(report.listings_skipped, 0);
    assert_eq!(report.ui_fallbacks, 0);
    assert_eq!(report.last_page, Some(2));
    assert!(!report.halted);

    let header = std::fs::read_to_string(sink.path()).unwrap();
    assert!(header.starts_with("title,price,year,kilometers,location,listing_date,page_number\n"));

    let rows = rows(sink.path());
    assert_eq!(rows.len(), 5);
    assert_eq!(
        rows[0],
        vec![
            "Royal Enfield Classic 350",
            "145000",
            "2019",
            "12017 km",
            "Indiranagar, Bengaluru",
            "Today",
            "1"
        ]
    );
    // Malformed price falls back to 0
    assert_eq!(rows[1][0], "Bajaj Pulsar 150");
    assert_eq!(rows[1][1], "0");

    let pages: Vec<&str> = rows.iter().map(|r| r[6].as_str()).collect();
    assert_eq!(pages, vec!["1", "1", "1", "2", "2"]);

    assert_eq!(operator.acknowledged(), 1);
    assert!(harvester.launcher().drivers()[0].is_closed());
}

#[tokio::test]
async fn test_max_pages_bounds_the_crawl() {
    let rig = Rig::new();
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(two_page_site()));

    let request = CrawlRequest {
        start_page: 1,
        max_pages: Some(1),
    };
    let report = harvester.run(&request).await.unwrap();

    assert_eq!(report.pages_processed, 1);
    assert_eq!(rows(sink.path()).len(), 3);
    assert_eq!(harvester.launcher().drivers()[0].clicks(), 0);
}

#[tokio::test]
async fn test_ui_failure_falls_back_to_url() {
    let rig = Rig::new();
    let site = FakeSite::new(BASE)
        .page(1, page_one(&pager(&[1, 2], true)))
        .page(2, page_two(""));
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(site));

    let report = harvester.run(&CrawlRequest::default()).await.unwrap();

    assert_eq!(report.ui_fallbacks, 1);
    assert_eq!(report.pages_processed, 2);
    assert_eq!(rows(sink.path()).len(), 5);

    let drivers = harvester.launcher().drivers();
    let navigations = drivers[0].navigations();
    assert_eq!(navigations.last().unwrap(), &format!("{}?page=2", BASE));
}

#[tokio::test]
async fn test_navigation_dead_end_halts_without_error() {
    let rig = Rig::new();
    let site = FakeSite::new(BASE)
        .page(1, page_one(&pager(&[1, 2], true)))
        .page(2, page_two(""))
        .reject_url_navigation();
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(site));

    let report = harvester
        .run_with_retries(&CrawlRequest::default(), &no_wait(3))
        .await
        .unwrap();

    assert!(report.halted);
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.last_page, Some(1));
    assert_eq!(rows(sink.path()).len(), 3);
    assert_eq!(harvester.launcher().launch_count(), 1);
}

#[tokio::test]
async fn test_listing_failures_are_skipped() {
    let rig = Rig::new();
    let stale = r#"<div class="_2v8Tq"><div class="_2Gr10" data-aut-id="itemTitle" data-stale="1">Gone</div></div>"#;
    let site = FakeSite::new(BASE).page(
        1,
        document(
            &[
                listing(Some("Hero Splendor"), "₹ 40,000", "2018 - 22,000 km", "Yelahanka"),
                stale.to_string(),
                listing(None, "₹ 10,000", "2010", "Nowhere"),
            ],
            "",
        ),
    );
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(site));

    let report = harvester.run(&CrawlRequest::default()).await.unwrap();

    assert_eq!(report.listings_seen, 3);
    assert_eq!(report.records_written, 1);
    assert_eq!(report.listings_skipped, 2);
    assert_eq!(rows(sink.path()).len(), 1);
}

#[tokio::test]
async fn test_start_page_seek() {
    let rig = Rig::new();
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(two_page_site()));

    let request = CrawlRequest {
        start_page: 2,
        max_pages: None,
    };
    let report = harvester.run(&request).await.unwrap();

    assert_eq!(report.pages_processed, 1);
    let rows = rows(sink.path());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r[6] == "2"));
}

#[tokio::test]
async fn test_unreachable_start_page_is_not_retried() {
    let rig = Rig::new();
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(two_page_site()));

    let request = CrawlRequest {
        start_page: 5,
        max_pages: None,
    };
    let err = harvester
        .run_with_retries(&request, &no_wait(3))
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::StartPageUnreachable(5)));
    assert_eq!(harvester.launcher().launch_count(), 1);
    assert!(harvester.launcher().drivers()[0].is_closed());
    assert!(rows(sink.path()).is_empty());
}

#[tokio::test]
async fn test_invalid_start_page_rejected() {
    let rig = Rig::new();
    let (harvester, _, _) = rig.harvester(FakeLauncher::new(two_page_site()));

    let request = CrawlRequest {
        start_page: 0,
        max_pages: None,
    };
    let err = harvester
        .run_with_retries(&request, &no_wait(3))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::InvalidStartPage(0)));
    assert_eq!(harvester.launcher().launch_count(), 0);
}

#[tokio::test]
async fn test_launch_failures_are_retried() {
    let rig = Rig::new();
    let launcher = FakeLauncher::new(two_page_site()).fail_first(2);
    let (harvester, sink, _) = rig.harvester(launcher);

    let report = harvester
        .run_with_retries(&CrawlRequest::default(), &no_wait(3))
        .await
        .unwrap();

    assert_eq!(report.records_written, 5);
    assert_eq!(harvester.launcher().launch_count(), 1);
    assert_eq!(rows(sink.path()).len(), 5);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let rig = Rig::new();
    let launcher = FakeLauncher::new(two_page_site()).fail_first(3);
    let (harvester, _, _) = rig.harvester(launcher);

    let err = harvester
        .run_with_retries(&CrawlRequest::default(), &no_wait(3))
        .await
        .unwrap_err();

    match err {
        HarvestError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, HarvestError::Launch(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_page_errors_recover_on_the_same_page() {
    let rig = Rig::new();
    let site = two_page_site().fail_selector(LISTING, 2);
    let (harvester, sink, operator) = rig.harvester(FakeLauncher::new(site));

    let report = harvester.run(&CrawlRequest::default()).await.unwrap();

    assert_eq!(report.recoveries, 2);
    assert_eq!(operator.recoveries(), 2);
    assert_eq!(report.records_written, 5);
    let rows = rows(sink.path());
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0][6], "1");
}

#[tokio::test]
async fn test_persistent_page_error_escalates() {
    let mut rig = Rig::new();
    rig.config.crawl.max_page_recoveries = 1;
    let site = two_page_site().fail_selector(LISTING, 10);
    let (harvester, _, operator) = rig.harvester(FakeLauncher::new(site));

    let err = harvester
        .run_with_retries(&CrawlRequest::default(), &no_wait(1))
        .await
        .unwrap_err();

    match err {
        HarvestError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(
                *last,
                HarvestError::PageUnrecoverable {
                    page: 1,
                    recoveries: 1,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(operator.recoveries(), 1);
    assert!(harvester.launcher().drivers()[0].is_closed());
}

#[tokio::test]
async fn test_corrupt_cookie_file_does_not_fail_the_run() {
    let rig = Rig::new();
    let session = rig.session();
    std::fs::create_dir_all(session.cookie_path().parent().unwrap()).unwrap();
    std::fs::write(session.cookie_path(), "{ not json").unwrap();

    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(two_page_site()));
    harvester.run(&CrawlRequest::default()).await.unwrap();
    assert_eq!(rows(sink.path()).len(), 5);
}

#[tokio::test]
async fn test_cookies_persist_between_runs() {
    let rig = Rig::new();
    let site = two_page_site().sets_cookie(BrowserCookie::new("sid", "abc", ".olx.in"));

    let (first, _, _) = rig.harvester(FakeLauncher::new(site));
    first.run(&CrawlRequest::default()).await.unwrap();
    assert!(first.session().cookie_path().exists());
    assert!(first.session().cookie_path().starts_with(rig.dir.path()));

    let (second, _, _) = rig.harvester(FakeLauncher::new(two_page_site()));
    second.run(&CrawlRequest::default()).await.unwrap();
    let drivers = second.launcher().drivers();
    assert_eq!(drivers[0].reloads(), 1);
    assert!(drivers[0].cookie_jar().iter().any(|c| c.name == "sid"));
}

#[tokio::test]
async fn test_seek_past_next_control_falls_back_to_url() {
    let rig = Rig::new();
    let third = document(
        &[listing(
            Some("KTM Duke 200"),
            "₹ 1,20,000",
            "2018 - 22,000 km",
            "Koramangala, Bengaluru",
        )],
        &pager(&[1, 2, 3], false),
    );
    let site = FakeSite::new(BASE)
        .page(1, page_one(&format!("{}{}", pager(&[1, 2], false), next_link(2))))
        .page(2, page_two(&pager(&[1, 2, 3], false)))
        .page(3, third);
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(site));

    let request = CrawlRequest {
        start_page: 3,
        max_pages: None,
    };
    let report = harvester.run(&request).await.unwrap();

    assert_eq!(report.ui_fallbacks, 1);
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.last_page, Some(3));
    let rows = rows(sink.path());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "KTM Duke 200");
    assert_eq!(rows[0][6], "3");
}

#[tokio::test]
async fn test_next_control_advances_one_page() {
    let rig = Rig::new();
    let site = FakeSite::new(BASE)
        .page(1, page_one(&format!("{}{}", pager(&[1, 3], false), next_link(2))))
        .page(2, page_two(&pager(&[1, 2, 3], false)))
        .page(3, page_two(&pager(&[1, 2, 3], false)));
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(site));

    let report = harvester.run(&CrawlRequest::default()).await.unwrap();

    assert_eq!(report.ui_fallbacks, 0);
    assert_eq!(report.pages_processed, 3);
    let pages: Vec<String> = rows(sink.path()).into_iter().map(|r| r[6].clone()).collect();
    assert_eq!(pages, ["1", "1", "1", "2", "2", "3", "3"]);
}

#[tokio::test]
async fn test_pages_are_separated_by_a_pause() {
    let mut single = Rig::new();
    single.config.crawl.scroll_pages = false;
    let (harvester, _, _) = single.harvester(FakeLauncher::new(two_page_site()));
    let request = CrawlRequest {
        start_page: 1,
        max_pages: Some(1),
    };
    harvester.run(&request).await.unwrap();
    assert_eq!(single.pacer.total_paused(), Duration::ZERO);

    let mut rig = Rig::new();
    rig.config.crawl.scroll_pages = false;
    let (harvester, _, _) = rig.harvester(FakeLauncher::new(two_page_site()));
    harvester.run(&CrawlRequest::default()).await.unwrap();

    // hover (0.5-1 s) and click settle (2-3 s) alone stay under 4 s
    let paused = rig.pacer.total_paused();
    assert!(paused >= Duration::from_millis(5500), "paused {:?}", paused);
    assert!(paused <= Duration::from_secs(10), "paused {:?}", paused);
}

#[tokio::test]
async fn test_retry_resumes_from_first_unfinished_page() {
    let mut rig = Rig::new();
    rig.config.crawl.max_page_recoveries = 0;
    let site = two_page_site().fail_page(2, 1);
    let (harvester, sink, _) = rig.harvester(FakeLauncher::new(site));

    let report = harvester
        .run_with_retries(&CrawlRequest::default(), &no_wait(2))
        .await
        .unwrap();

    assert_eq!(harvester.launcher().launch_count(), 2);
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.last_page, Some(2));
    let pages: Vec<String> = rows(sink.path()).into_iter().map(|r| r[6].clone()).collect();
    assert_eq!(pages, ["1", "1", "1", "2", "2"]);
}
