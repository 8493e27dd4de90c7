use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use crate::domain::format_date;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::source::{DailyBarsRequest, PriceSource, SourceError};
use crate::{DailyBar, Symbol, TickerProfile};

const CHART_ENDPOINT: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const SUMMARY_ENDPOINT: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const COOKIE_ENDPOINT: &str = "https://fc.yahoo.com";
const CRUMB_ENDPOINTS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const REFERER: &str = "https://finance.yahoo.com/";
const CRUMB_TTL: Duration = Duration::from_secs(3600);

// ============================================================================
// Crumb handling
// ============================================================================

#[derive(Debug, Clone)]
struct CachedCrumb {
    value: String,
    fetched_at: Instant,
}

/// Cookie/crumb session needed by `quoteSummary`.
///
/// The session cookie lives in the transport's cookie jar (or is passed in
/// explicitly); the crumb goes into the query string.
#[derive(Clone, Default)]
pub struct YahooAuthManager {
    crumb: Arc<Mutex<Option<CachedCrumb>>>,
    cookie: Option<String>,
}

impl YahooAuthManager {
    pub fn with_cookie(cookie: Option<String>) -> Self {
        Self {
            crumb: Arc::default(),
            cookie,
        }
    }

    fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub async fn crumb(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        if let Some(cached) = lock(&self.crumb).as_ref() {
            if cached.fetched_at.elapsed() < CRUMB_TTL {
                return Ok(cached.value.clone());
            }
        }

        let value = self.fetch_crumb(http_client).await?;
        *lock(&self.crumb) = Some(CachedCrumb {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    pub fn invalidate(&self) {
        *lock(&self.crumb) = None;
    }

    async fn fetch_crumb(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        // Only the Set-Cookie of this response matters; its status is usually 404.
        let cookie_request = HttpRequest::get(COOKIE_ENDPOINT)
            .with_header("referer", REFERER)
            .with_cookie(self.cookie());
        http_client.execute(cookie_request).await.map_err(|error| {
            SourceError::unavailable(format!("failed to open yahoo session: {error}"))
        })?;

        for endpoint in CRUMB_ENDPOINTS {
            let request = HttpRequest::get(endpoint)
                .with_header("referer", REFERER)
                .with_cookie(self.cookie());
            let Ok(response) = http_client.execute(request).await else {
                continue;
            };
            if response.status == 429 {
                return Err(SourceError::rate_limited("yahoo rate limited the crumb request"));
            }

            let body = response.body.trim();
            let looks_like_crumb = response.is_success()
                && !body.is_empty()
                && body.len() < 100
                && !body.contains(char::is_whitespace)
                && !body.contains('<');
            if looks_like_crumb {
                return Ok(body.to_string());
            }
        }

        Err(SourceError::unavailable("failed to fetch yahoo crumb from all endpoints"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Adapter
// ============================================================================

/// Yahoo Finance chart and quote-summary adapter.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: YahooAuthManager,
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_auth(http_client, YahooAuthManager::default())
    }

    pub fn with_auth(http_client: Arc<dyn HttpClient>, auth: YahooAuthManager) -> Self {
        Self { http_client, auth }
    }

    async fn fetch_daily_bars(&self, req: &DailyBarsRequest) -> Result<Vec<DailyBar>, SourceError> {
        let period1 = unix_midnight(req.start);
        let period2 = unix_midnight(req.end) + 86_400;
        let endpoint = format!(
            "{CHART_ENDPOINT}/{}?period1={period1}&period2={period2}&interval=1d&events=history",
            urlencoding::encode(req.symbol.as_str()),
        );
        let request = HttpRequest::get(endpoint)
            .with_header("referer", REFERER)
            .with_cookie(self.auth.cookie());

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| SourceError::unavailable(format!("yahoo transport error: {error}")))?;

        if response.status == 404 {
            debug!(ticker = %req.symbol, "yahoo has no chart for symbol");
            return Ok(Vec::new());
        }
        ensure_success(&response, "chart")?;

        parse_chart(&response.body, req)
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<Option<TickerProfile>, SourceError> {
        let crumb = self.auth.crumb(self.http_client.as_ref()).await?;
        let mut response = self.summary_request(symbol, &crumb).await?;

        if response.status == 401 || response.status == 429 {
            self.auth.invalidate();
            let crumb = self.auth.crumb(self.http_client.as_ref()).await?;
            response = self.summary_request(symbol, &crumb).await?;
        }

        if response.status == 404 {
            return Ok(None);
        }
        ensure_success(&response, "quoteSummary")?;

        parse_summary(&response.body, symbol)
    }

    async fn summary_request(&self, symbol: &Symbol, crumb: &str) -> Result<HttpResponse, SourceError> {
        let endpoint = format!(
            "{SUMMARY_ENDPOINT}/{}?modules=price,assetProfile&crumb={}",
            urlencoding::encode(symbol.as_str()),
            urlencoding::encode(crumb),
        );
        let request = HttpRequest::get(endpoint)
            .with_header("referer", REFERER)
            .with_cookie(self.auth.cookie());

        self.http_client
            .execute(request)
            .await
            .map_err(|error| SourceError::unavailable(format!("yahoo transport error: {error}")))
    }
}

impl PriceSource for YahooAdapter {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    fn daily_bars<'a>(
        &'a self,
        req: DailyBarsRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move { self.fetch_daily_bars(&req).await })
    }

    fn profile<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TickerProfile>, SourceError>> + Send + 'a>> {
        Box::pin(async move { self.fetch_profile(symbol).await })
    }
}

fn ensure_success(response: &HttpResponse, endpoint: &str) -> Result<(), SourceError> {
    match response.status {
        status if (200..300).contains(&status) => Ok(()),
        429 => Err(SourceError::rate_limited(format!(
            "yahoo {endpoint} returned 429"
        ))),
        status if status >= 500 || status == 401 || status == 403 => Err(
            SourceError::unavailable(format!("yahoo {endpoint} returned status {status}")),
        ),
        status => Err(SourceError::invalid_request(format!(
            "yahoo {endpoint} returned status {status}"
        ))),
    }
}

fn unix_midnight(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

fn parse_chart(body: &str, req: &DailyBarsRequest) -> Result<Vec<DailyBar>, SourceError> {
    let chart: YahooChartResponse = serde_json::from_str(body)
        .map_err(|error| SourceError::internal(format!("failed to parse yahoo chart: {error}")))?;

    if let Some(error) = chart.chart.error {
        if error.code.eq_ignore_ascii_case("not found") {
            return Ok(Vec::new());
        }
        return Err(SourceError::internal(format!(
            "yahoo chart error {}: {}",
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    let Some(result) = chart.chart.result.and_then(|results| results.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };
    let gmt_offset = result.meta.and_then(|meta| meta.gmtoffset).unwrap_or(0);

    let mut bars: BTreeMap<Date, DailyBar> = BTreeMap::new();
    for (index, ts) in timestamps.into_iter().enumerate() {
        let date = OffsetDateTime::from_unix_timestamp(ts + gmt_offset)
            .map_err(|error| SourceError::internal(format!("invalid chart timestamp {ts}: {error}")))?
            .date();
        if date < req.start || date > req.end {
            continue;
        }

        let field = |values: &[Option<f64>]| values.get(index).copied().flatten();
        let (open, high, low, close) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
            if open.is_some() || high.is_some() || low.is_some() || close.is_some() {
                warn!(ticker = %req.symbol, date = %format_date(date), "dropping bar with missing price fields");
            }
            continue;
        };
        let volume = quote
            .volume
            .get(index)
            .copied()
            .flatten()
            .map_or(0, |volume| u64::try_from(volume).unwrap_or(0));

        match DailyBar::new(req.symbol.clone(), date, open, high, low, close, volume, None) {
            // A trailing intraday row can repeat a session's date; the later row wins.
            Ok(bar) => {
                bars.insert(bar.date, bar);
            }
            Err(error) => {
                warn!(ticker = %req.symbol, date = %format_date(date), %error, "dropping invalid bar");
            }
        }
    }

    Ok(bars.into_values().collect())
}

fn parse_summary(body: &str, symbol: &Symbol) -> Result<Option<TickerProfile>, SourceError> {
    let summary: YahooQuoteSummaryResponse = serde_json::from_str(body).map_err(|error| {
        SourceError::internal(format!("failed to parse yahoo quoteSummary: {error}"))
    })?;

    if let Some(error) = summary.quote_summary.error {
        if error.code.eq_ignore_ascii_case("not found") {
            return Ok(None);
        }
        return Err(SourceError::internal(format!(
            "yahoo quoteSummary error {}: {}",
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    let Some(result) = summary
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Ok(None);
    };

    let price = result.price.unwrap_or_default();
    Ok(Some(TickerProfile {
        symbol: symbol.clone(),
        name: price.long_name.or(price.short_name).map(|name| name.trim().to_string()),
        sector: result
            .asset_profile
            .and_then(|profile| profile.sector)
            .filter(|sector| !sector.trim().is_empty()),
        market_cap: price
            .market_cap
            .and_then(|value| value.raw)
            .filter(|value| value.is_finite() && *value > 0.0),
    }))
}

// Yahoo Finance API response structures
#[derive(Debug, Deserialize)]
struct YahooApiError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: Option<YahooChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: YahooQuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<YahooQuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteSummaryResult {
    #[serde(default)]
    price: Option<YahooPriceModule>,
    #[serde(rename = "assetProfile", default)]
    asset_profile: Option<YahooAssetProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooPriceModule {
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    #[serde(rename = "marketCap", default)]
    market_cap: Option<YahooRawValue>,
}

#[derive(Debug, Deserialize)]
struct YahooAssetProfile {
    #[serde(default)]
    sector: Option<String>,
}

/// Numbers arrive wrapped as `{"raw": .., "fmt": ..}`.
#[derive(Debug, Deserialize)]
struct YahooRawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpError;
    use crate::source::SourceErrorKind;
    use std::collections::VecDeque;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
    use time::macros::date;

    /// Answers requests from per-URL-fragment queues and records what was asked.
    #[derive(Default)]
    struct ScriptedHttpClient {
        routes: Mutex<Vec<(String, VecDeque<Result<HttpResponse, HttpError>>)>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn route(self, fragment: &str, response: Result<HttpResponse, HttpError>) -> Self {
            {
                let mut routes = lock(&self.routes);
                match routes.iter_mut().find(|(key, _)| key == fragment) {
                    Some((_, queue)) => queue.push_back(response),
                    None => routes.push((fragment.to_string(), VecDeque::from([response]))),
                }
            }
            self
        }

        fn urls(&self) -> Vec<String> {
            lock(&self.requests)
                .iter()
                .map(|request| request.url.clone())
                .collect()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let response = {
                let mut routes = lock(&self.routes);
                routes
                    .iter_mut()
                    .find(|(fragment, _)| request.url.contains(fragment.as_str()))
                    .map(|(_, queue)| {
                        if queue.len() > 1 {
                            queue.pop_front().expect("non-empty queue")
                        } else {
                            queue.front().cloned().expect("non-empty queue")
                        }
                    })
                    .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "")))
            };
            lock(&self.requests).push(request);
            Box::pin(async move { response })
        }
    }

    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                "timestamp": [1710250200, 1710336600, 1710423000, 1710509400],
                "indicators": {"quote": [{
                    "open":   [172.9, 168.0, null, 171.2],
                    "high":   [174.0, 170.4, null, 172.6],
                    "low":    [171.0, 167.5, null, 170.3],
                    "close":  [173.2, 169.0, null, 172.6],
                    "volume": [59825400, 65000000, null, 121664700]
                }]}
            }],
            "error": null
        }
    }"#;

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("symbol")
    }

    fn request() -> DailyBarsRequest {
        DailyBarsRequest::new(aapl(), date!(2024 - 03 - 12), date!(2024 - 03 - 15)).expect("request")
    }

    #[test]
    fn chart_rows_become_session_dated_bars() {
        let client = Arc::new(ScriptedHttpClient::default().route(
            "/v8/finance/chart/AAPL",
            Ok(HttpResponse::ok_json(CHART_BODY)),
        ));
        let adapter = YahooAdapter::new(client.clone());

        let bars = block_on(adapter.daily_bars(request())).expect("bars");
        let dates: Vec<Date> = bars.iter().map(|bar| bar.date).collect();
        assert_eq!(
            dates,
            vec![date!(2024 - 03 - 12), date!(2024 - 03 - 13), date!(2024 - 03 - 15)]
        );
        assert_eq!(bars[2].close, 172.6);
        assert_eq!(bars[2].volume, 121_664_700);

        let urls = client.urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("period1=1710201600"));
        assert!(urls[0].contains("interval=1d"));
    }

    #[test]
    fn not_found_means_no_data() {
        let client = Arc::new(ScriptedHttpClient::default().route(
            "/v8/finance/chart/",
            Ok(HttpResponse::with_status(
                404,
                r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
            )),
        ));
        let adapter = YahooAdapter::new(client);

        let bars = block_on(adapter.daily_bars(request())).expect("no data is not an error");
        assert!(bars.is_empty());
    }

    #[test]
    fn throttling_and_transport_failures_are_retryable() {
        let throttled = YahooAdapter::new(Arc::new(ScriptedHttpClient::default().route(
            "/v8/finance/chart/",
            Ok(HttpResponse::with_status(429, "Too Many Requests")),
        )));
        let error = block_on(throttled.daily_bars(request())).expect_err("429");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert!(error.retryable());

        let offline = YahooAdapter::new(Arc::new(
            ScriptedHttpClient::default()
                .route("/v8/finance/chart/", Err(HttpError::new("connection refused"))),
        ));
        let error = block_on(offline.daily_bars(request())).expect_err("transport");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.retryable());
    }

    #[test]
    fn malformed_chart_is_not_retryable() {
        let adapter = YahooAdapter::new(Arc::new(
            ScriptedHttpClient::default()
                .route("/v8/finance/chart/", Ok(HttpResponse::ok_json("<html>oops</html>"))),
        ));
        let error = block_on(adapter.daily_bars(request())).expect_err("garbage");
        assert_eq!(error.kind(), SourceErrorKind::Internal);
        assert!(!error.retryable());
    }

    #[test]
    fn profile_refreshes_crumb_once_on_unauthorized() {
        let summary = r#"{"quoteSummary":{"result":[{
            "price": {"longName": "Apple Inc.", "shortName": "Apple", "marketCap": {"raw": 2.65e12, "fmt": "2.65T"}},
            "assetProfile": {"sector": "Technology"}
        }],"error":null}}"#;
        let client = Arc::new(
            ScriptedHttpClient::default()
                .route("fc.yahoo.com", Ok(HttpResponse::with_status(404, "")))
                .route("getcrumb", Ok(HttpResponse::ok_json("crumb-one")))
                .route("getcrumb", Ok(HttpResponse::ok_json("crumb-two")))
                .route(
                    "/v10/finance/quoteSummary/AAPL",
                    Ok(HttpResponse::with_status(401, "Unauthorized")),
                )
                .route("/v10/finance/quoteSummary/AAPL", Ok(HttpResponse::ok_json(summary))),
        );
        let adapter = YahooAdapter::new(client.clone());

        let profile = block_on(adapter.profile(&aapl()))
            .expect("profile")
            .expect("known symbol");
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.sector.as_deref(), Some("Technology"));
        assert_eq!(profile.market_cap, Some(2.65e12));

        let summary_urls: Vec<String> = client
            .urls()
            .into_iter()
            .filter(|url| url.contains("quoteSummary"))
            .collect();
        assert_eq!(summary_urls.len(), 2);
        assert!(summary_urls[0].ends_with("crumb=crumb-one"));
        assert!(summary_urls[1].ends_with("crumb=crumb-two"));
    }

    fn block_on<F>(future: F) -> F::Output
    where
        F: Future,
    {
        let waker = noop_waker();
        let mut context = Context::from_waker(&waker);
        let mut future = std::pin::pin!(future);

        loop {
            match future.as_mut().poll(&mut context) {
                Poll::Ready(output) => return output,
                Poll::Pending => std::thread::yield_now(),
            }
        }
    }

    fn noop_waker() -> Waker {
        // SAFETY: The vtable functions never dereference the data pointer and are no-op operations.
        unsafe { Waker::from_raw(noop_raw_waker()) }
    }

    fn noop_raw_waker() -> RawWaker {
        RawWaker::new(std::ptr::null(), &NOOP_RAW_WAKER_VTABLE)
    }

    unsafe fn noop_raw_waker_clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }

    unsafe fn noop_raw_waker_noop(_: *const ()) {}

    static NOOP_RAW_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
        noop_raw_waker_clone,
        noop_raw_waker_noop,
        noop_raw_waker_noop,
        noop_raw_waker_noop,
    );
}
