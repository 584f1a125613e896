//! Concurrent stop times fetching.
//!
//! A batch spawns one task per stop on a shared [`PooledClient`]. Requests
//! that time out or fail to connect are logged and left out of the result,
//! so one bad stop never sinks the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::task::JoinSet;
use tracing::{Instrument, info, warn};

use crate::audit::{FetchLog, FetchRecord};
use crate::config::FetchConfig;
use crate::error::{CrtmError, Result};
use crate::fetch::{HttpClient, PooledClient, StopTimesEndpoint};
use crate::parser::{ArrivalRow, parse_stop_times};

/// Unparsed answer for one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopResponse {
    pub cod_stop: String,
    pub body: String,
}

/// Fetches one stop and records the attempt in `log`.
///
/// Returns `Ok(None)` for a timed out or failed request. Only a failing
/// audit write is an error.
pub async fn fetch<C: HttpClient + ?Sized>(
    cod_stop: &str,
    client: &C,
    endpoint: &StopTimesEndpoint,
    config: &FetchConfig,
    log: &FetchLog,
) -> Result<Option<StopResponse>> {
    let actual_date = Local::now();
    let started = Instant::now();

    let request = endpoint.request(cod_stop);
    let outcome = tokio::time::timeout(config.timeout, client.get_text(request)).await;

    let mut record = FetchRecord::started(actual_date, cod_stop, started.elapsed(), config);

    let response = match outcome {
        Ok(Ok((status, body))) => {
            // Length in characters, not bytes: answers carry accented stop names.
            let length = body.chars().count();
            info!(
                resp_time = record.resp_time,
                code = status.as_u16(),
                length,
                "Response received"
            );
            record.resp_status = Some(status.as_u16());
            record.resp_length = Some(length);
            Some(StopResponse {
                cod_stop: cod_stop.to_string(),
                body,
            })
        }
        Ok(Err(e)) if e.is_timeout() => {
            warn!(error = %e, "Timeout");
            record.timeout = true;
            None
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Connection error");
            record.connection_error = true;
            None
        }
        Err(_) => {
            warn!(timeout = record.timeout_time, "Timeout");
            record.timeout = true;
            None
        }
    };

    log.append(&record).await?;
    Ok(response)
}

/// Fetches stop times from one endpoint.
#[derive(Debug, Clone)]
pub struct StopTimesFetcher {
    endpoint: StopTimesEndpoint,
}

impl StopTimesFetcher {
    /// A fetcher for the public CRTM API.
    pub fn new() -> Result<Self> {
        Ok(Self::with_endpoint(StopTimesEndpoint::crtm()?))
    }

    pub fn with_endpoint(endpoint: StopTimesEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &StopTimesEndpoint {
        &self.endpoint
    }

    /// Fetches every stop concurrently through a pool sized by
    /// `config.max_connections`.
    ///
    /// Responses come back in completion order. The duration covers the
    /// whole batch.
    pub async fn batch<S: AsRef<str>>(
        &self,
        cod_stops: &[S],
        config: &FetchConfig,
    ) -> Result<(Vec<StopResponse>, Duration)> {
        config.validate()?;
        let client = Arc::new(PooledClient::new(config.max_connections)?);
        self.batch_with_client(client, cod_stops, config).await
    }

    /// Same as [`batch`](Self::batch) on a caller-provided client.
    #[tracing::instrument(skip_all, fields(stops = cod_stops.len(), max_connections = config.max_connections))]
    pub async fn batch_with_client<C, S>(
        &self,
        client: Arc<C>,
        cod_stops: &[S],
        config: &FetchConfig,
    ) -> Result<(Vec<StopResponse>, Duration)>
    where
        C: HttpClient + 'static,
        S: AsRef<str>,
    {
        config.validate()?;
        let started = Instant::now();
        let log = FetchLog::new(config.log.clone());

        let mut tasks = JoinSet::new();
        for cod_stop in cod_stops {
            let cod_stop = cod_stop.as_ref().to_string();
            let client = client.clone();
            let endpoint = self.endpoint.clone();
            let config = config.clone();
            let log = log.clone();

            let span = tracing::info_span!("fetch_stop", cod_stop = %cod_stop);
            tasks.spawn(
                async move { fetch(&cod_stop, client.as_ref(), &endpoint, &config, &log).await }
                    .instrument(span),
            );
        }

        let mut responses = Vec::with_capacity(cod_stops.len());
        while let Some(joined) = tasks.join_next().await {
            if let Some(response) = joined?? {
                responses.push(response);
            }
        }

        let total_time = started.elapsed();
        info!(
            requested = cod_stops.len(),
            received = responses.len(),
            total_time = total_time.as_secs_f64(),
            "Batch finished"
        );
        Ok((responses, total_time))
    }

    /// Fetches a single stop.
    ///
    /// # Errors
    ///
    /// [`CrtmError::EmptyAnswer`] when the request timed out or failed.
    pub async fn single(
        &self,
        cod_stop: &str,
        config: &FetchConfig,
    ) -> Result<(StopResponse, Duration)> {
        let (responses, total_time) = self.batch(&[cod_stop], config).await?;
        match responses.into_iter().next() {
            Some(response) => Ok((response, total_time)),
            None => Err(CrtmError::EmptyAnswer {
                cod_stop: cod_stop.to_string(),
            }),
        }
    }

    /// Fetches every stop and flattens the answers into arrival rows.
    pub async fn batch_parsed<S: AsRef<str>>(
        &self,
        cod_stops: &[S],
        config: &FetchConfig,
    ) -> Result<(Vec<ArrivalRow>, Duration)> {
        let (responses, total_time) = self.batch(cod_stops, config).await?;
        Ok((flatten(&responses), total_time))
    }
}

/// Arrival rows of every response, skipping the ones that do not parse.
pub fn flatten(responses: &[StopResponse]) -> Vec<ArrivalRow> {
    responses
        .iter()
        .flat_map(|response| {
            let _span = tracing::debug_span!("parse_stop", cod_stop = %response.cod_stop).entered();
            parse_stop_times(&response.body)
        })
        .collect()
}

/// Fetches `cod_stops` from the CRTM API. See [`StopTimesFetcher::batch`].
pub async fn get_stop_times_batch<S: AsRef<str>>(
    cod_stops: &[S],
    config: &FetchConfig,
) -> Result<(Vec<StopResponse>, Duration)> {
    StopTimesFetcher::new()?.batch(cod_stops, config).await
}

/// Fetches one stop from the CRTM API. See [`StopTimesFetcher::single`].
pub async fn get_stop_times(
    cod_stop: &str,
    config: &FetchConfig,
) -> Result<(StopResponse, Duration)> {
    StopTimesFetcher::new()?.single(cod_stop, config).await
}

/// Fetches and flattens `cod_stops` from the CRTM API.
pub async fn get_stop_times_batch_parsed<S: AsRef<str>>(
    cod_stops: &[S],
    config: &FetchConfig,
) -> Result<(Vec<ArrivalRow>, Duration)> {
    StopTimesFetcher::new()?.batch_parsed(cod_stops, config).await
}
