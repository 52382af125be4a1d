use common::types::crawl_run::CrawlRun;

/// Sentinel for an unknown document total.
pub const UNKNOWN_TOTAL: i64 = -1;

/// Derives the page count for a run.
///
/// The extra page past `total / page_size` covers both the remainder and
/// documents appearing in the source while the run is in flight; the final
/// page is expected to come back short or empty. An unknown total yields
/// `UNKNOWN_TOTAL`, which switches the coordinator to sequential paging.
pub fn plan_pages(expected_total: i64, page_size: usize) -> i64 {
    if expected_total < 0 {
        return UNKNOWN_TOTAL;
    }
    expected_total / page_size.max(1) as i64 + 1
}

/// Creates the identity of a new run from the expected total.
pub fn plan_run(expected_total: i64, page_size: usize) -> CrawlRun {
    CrawlRun::new(
        CrawlRun::generate_id(),
        expected_total.max(UNKNOWN_TOTAL),
        plan_pages(expected_total, page_size),
    )
}
