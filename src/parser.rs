//! Flattens CRTM stop times answers into arrival rows.
//!
//! Only `stopTimes.times.Time[]` is read. A response that does not fit that
//! shape contributes no rows and a warning, never an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Header of the flattened CSV, in column order.
pub const ARRIVAL_CSV_COLUMNS: &str = "actual_date,cod_stop,cod_line,cod_issue,eta,destination_stop";

/// One scheduled arrival at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrivalRow {
    pub actual_date: String,
    pub cod_stop: String,
    pub cod_line: String,
    pub cod_issue: String,
    pub eta: String,
    pub destination_stop: String,
}

impl fmt::Display for ArrivalRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.actual_date,
            self.cod_stop,
            self.cod_line,
            self.cod_issue,
            self.eta,
            self.destination_stop
        )
    }
}

#[derive(Deserialize)]
struct Answer {
    #[serde(rename = "stopTimes")]
    stop_times: StopTimes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTimes {
    actual_date: String,
    stop: StopRef,
    times: Times,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopRef {
    cod_stop: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineRef {
    cod_line: String,
}

#[derive(Deserialize)]
struct Times {
    #[serde(rename = "Time")]
    time: Vec<Time>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Time {
    line: LineRef,
    cod_issue: String,
    time: String,
    destination_stop: StopRef,
}

/// Why a response was skipped.
#[derive(Debug)]
enum Skip {
    Json(serde_json::Error),
    WithoutTimes(serde_json::Error),
}

/// Drops anything the API put in front of the first `{`.
fn strip_prefix(body: &str) -> &str {
    match body.find('{') {
        Some(start) => &body[start..],
        None => body,
    }
}

fn extract(body: &str) -> Result<Vec<ArrivalRow>, Skip> {
    let value: serde_json::Value =
        serde_json::from_str(strip_prefix(body)).map_err(Skip::Json)?;
    let answer: Answer = serde_json::from_value(value).map_err(Skip::WithoutTimes)?;

    let StopTimes {
        actual_date,
        stop,
        times,
    } = answer.stop_times;

    Ok(times
        .time
        .into_iter()
        .map(|t| ArrivalRow {
            actual_date: actual_date.clone(),
            cod_stop: stop.cod_stop.clone(),
            cod_line: t.line.cod_line,
            cod_issue: t.cod_issue,
            eta: t.time,
            destination_stop: t.destination_stop.cod_stop,
        })
        .collect())
}

/// Parses one raw answer into arrival rows.
///
/// Invalid JSON and answers missing any of the expected keys are logged at
/// warn level and yield an empty vector.
pub fn parse_stop_times(body: &str) -> Vec<ArrivalRow> {
    match extract(body) {
        Ok(rows) => rows,
        Err(Skip::Json(e)) => {
            warn!(error = %e, "json error");
            Vec::new()
        }
        Err(Skip::WithoutTimes(e)) => {
            warn!(error = %e, "Answer without times");
            Vec::new()
        }
    }
}
