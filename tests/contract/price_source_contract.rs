//! Contract every `PriceSource` must honor, checked against the Yahoo adapter
//! (over a scripted transport) and the in-memory test provider.

#[path = "../support/mod.rs"]
mod support;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use stockpulse_core::{
    DailyBarsRequest, HttpClient, HttpError, HttpRequest, HttpResponse, PriceSource,
    SourceErrorKind, YahooAdapter,
};
use support::{symbol, ScriptedSource};
use time::macros::date;

/// Transport answering every request with the next queued response.
struct QueuedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
}

impl QueuedHttpClient {
    fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

impl HttpClient for QueuedHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = self
            .responses
            .lock()
            .expect("responses")
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "")));
        Box::pin(async move { response })
    }
}

const CHART: &str = r#"{"chart":{"result":[{
    "meta":{"symbol":"SPY","gmtoffset":-14400},
    "timestamp":[1710509400,1710250200,1710336600],
    "indicators":{"quote":[{
        "open":[510.0,513.0,512.0],
        "high":[512.5,515.0,514.0],
        "low":[508.0,511.0,510.5],
        "close":[509.8,514.2,513.1],
        "volume":[107000000,62000000,58000000]
    }]}
}],"error":null}}"#;

fn request() -> DailyBarsRequest {
    DailyBarsRequest::new(symbol("SPY"), date!(2024 - 03 - 11), date!(2024 - 03 - 15))
        .expect("request")
}

fn providers_with_data() -> Vec<Arc<dyn PriceSource>> {
    let scripted = ScriptedSource::new();
    scripted
        .with_close("SPY", date!(2024 - 03 - 15), 509.8)
        .with_close("SPY", date!(2024 - 03 - 12), 514.2)
        .with_close("SPY", date!(2024 - 03 - 08), 511.0);
    let yahoo = YahooAdapter::new(QueuedHttpClient::new(vec![Ok(HttpResponse::ok_json(CHART))]));

    let mut providers: Vec<Arc<dyn PriceSource>> = Vec::new();
    providers.push(scripted);
    providers.push(Arc::new(yahoo));
    providers
}

fn providers_without_data() -> Vec<Arc<dyn PriceSource>> {
    let yahoo_missing = YahooAdapter::new(QueuedHttpClient::new(vec![Ok(
        HttpResponse::with_status(
            404,
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
        ),
    )]));
    let yahoo_empty = YahooAdapter::new(QueuedHttpClient::new(vec![Ok(HttpResponse::ok_json(
        r#"{"chart":{"result":[],"error":null}}"#,
    ))]));

    let mut providers: Vec<Arc<dyn PriceSource>> = Vec::new();
    providers.push(ScriptedSource::new());
    providers.push(Arc::new(yahoo_missing));
    providers.push(Arc::new(yahoo_empty));
    providers
}

// =============================================================================
// Contract: bars
// =============================================================================

#[tokio::test]
async fn bars_are_valid_in_range_and_ascending() {
    for provider in providers_with_data() {
        let req = request();
        let bars = provider
            .daily_bars(req.clone())
            .await
            .unwrap_or_else(|error| panic!("{}: {error}", provider.id()));

        assert!(!bars.is_empty(), "{} returned no bars", provider.id());
        for bar in &bars {
            assert_eq!(bar.symbol, req.symbol, "{}", provider.id());
            assert!(bar.date >= req.start && bar.date <= req.end, "{}", provider.id());
            bar.validate()
                .unwrap_or_else(|error| panic!("{}: invalid bar {error}", provider.id()));
        }
        assert!(
            bars.windows(2).all(|pair| pair[0].date < pair[1].date),
            "{} bars not strictly ascending",
            provider.id()
        );
    }
}

#[tokio::test]
async fn unknown_symbol_is_no_data_not_an_error() {
    for provider in providers_without_data() {
        let bars = provider
            .daily_bars(request())
            .await
            .unwrap_or_else(|error| panic!("{}: {error}", provider.id()));
        assert!(bars.is_empty(), "{}", provider.id());
    }
}

// =============================================================================
// Contract: errors
// =============================================================================

#[tokio::test]
async fn transport_and_throttling_failures_are_retryable() {
    let cases = [
        (Err(HttpError::new("connection refused")), SourceErrorKind::Unavailable),
        (Ok(HttpResponse::with_status(503, "")), SourceErrorKind::Unavailable),
        (Ok(HttpResponse::with_status(429, "")), SourceErrorKind::RateLimited),
    ];
    for (response, kind) in cases {
        let provider = YahooAdapter::new(QueuedHttpClient::new(vec![response]));
        let error = provider.daily_bars(request()).await.expect_err("failure");
        assert_eq!(error.kind(), kind);
        assert!(error.retryable(), "{error}");
    }
}

#[tokio::test]
async fn malformed_or_rejected_requests_are_not_retryable() {
    let cases = [
        (Ok(HttpResponse::ok_json("{\"unexpected\":true}")), SourceErrorKind::Internal),
        (Ok(HttpResponse::with_status(400, "")), SourceErrorKind::InvalidRequest),
    ];
    for (response, kind) in cases {
        let provider = YahooAdapter::new(QueuedHttpClient::new(vec![response]));
        let error = provider.daily_bars(request()).await.expect_err("failure");
        assert_eq!(error.kind(), kind);
        assert!(!error.retryable(), "{error}");
    }
}
