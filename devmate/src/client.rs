//! HTTP client behind the device subcommands.

use std::time::Duration;

use anyhow::{Error, Result};
use backoff::ExponentialBackoff;
use chrono::{DateTime, Local, Utc};
use devmate_lease::{DeviceRecord, Status};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ServerAddress;

/// How long to keep retrying an unreachable server before giving up.
const HEALTH_RETRY_WINDOW: Duration = Duration::from_secs(10);

/// A device operation to perform against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Reserve { device: String, user: String },
    Release { device: String },
    Add { device: String, model: String },
    Offline { device: String },
    Online { device: String },
    Delete { device: String },
}

impl Request {
    fn method(&self) -> Method {
        match self {
            Request::List => Method::GET,
            Request::Delete { .. } => Method::DELETE,
            _ => Method::POST,
        }
    }

    /// Unescaped path segments; device names may contain any character.
    fn path(&self) -> Vec<&str> {
        match self {
            Request::List => vec!["devices", "list"],
            Request::Reserve { .. } => vec!["devices", "reserve"],
            Request::Release { .. } => vec!["devices", "release"],
            Request::Add { .. } => vec!["devices", "add"],
            Request::Offline { .. } => vec!["devices", "offline"],
            Request::Online { .. } => vec!["devices", "online"],
            Request::Delete { device } => vec!["devices", "delete", device],
        }
    }

    fn payload(&self) -> Option<Value> {
        match self {
            Request::List | Request::Delete { .. } => None,
            Request::Reserve { device, user } => Some(json!({"device": device, "username": user})),
            Request::Add { device, model } => Some(json!({"device": device, "model": model})),
            Request::Release { device } | Request::Offline { device } | Request::Online { device } => {
                Some(json!({ "device": device }))
            }
        }
    }
}

pub struct Client {
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    pub fn new(server: &ServerAddress) -> Result<Client> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Client {
            base_url: Url::parse(&server.base_url())?,
            http,
        })
    }

    /// Join `segments` onto the server address, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::msg(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Probe `/health`, retrying while the server cannot be reached.
    ///
    /// Returns a note when the server answers with an unexpected non-5xx
    /// status.
    #[tracing::instrument(skip_all, err)]
    pub async fn check_health(&self) -> Result<Option<String>> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(HEALTH_RETRY_WINDOW),
            ..ExponentialBackoff::default()
        };
        let url = self.url(&["health"])?;
        let (http, url) = (&self.http, &url);
        let status = backoff::future::retry(policy, || async move {
            match http.get(url.clone()).send().await {
                Ok(resp) => Ok(resp.status()),
                Err(err) if err.is_connect() || err.is_timeout() => {
                    warn!(%err, "server not reachable");
                    Err(backoff::Error::transient(Error::from(err)))
                }
                Err(err) => Err(backoff::Error::permanent(Error::from(err))),
            }
        })
        .await
        .map_err(|err| err.context("Server is not accessible"))?;
        health_note(status)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn execute(&self, request: &Request) -> Result<String> {
        let mut builder = self.http.request(request.method(), self.url(&request.path())?);
        if let Some(payload) = request.payload() {
            builder = builder.json(&payload);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        debug!(%status, "response");
        render(request, status, &body, Utc::now())
    }
}

fn health_note(status: StatusCode) -> Result<Option<String>> {
    if status.is_server_error() {
        return Err(Error::msg(format!(
            "Server is not accessible, status code {}",
            status.as_u16()
        )));
    }
    if status != StatusCode::OK {
        return Ok(Some(format!(
            "Server is accessible, though returned status code {}.",
            status.as_u16()
        )));
    }
    Ok(None)
}

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// Turn a server response into the text shown to the user.
pub fn render(request: &Request, status: StatusCode, body: &Value, now: DateTime<Utc>) -> Result<String> {
    let bad_request = |fields: &str| {
        format!("Bad request. Please check if the {fields} correct.")
    };
    let text = match (request, status.as_u16()) {
        (Request::List, 200) => {
            let list: DeviceList = serde_json::from_value(body.clone())?;
            render_devices(&list.devices, now)
        }
        (Request::List, 204) => "No devices found.".to_owned(),

        (Request::Reserve { .. }, 200) => "Device successfully reserved.".to_owned(),
        (Request::Reserve { .. }, 409) => match body.get("reserved_by").and_then(Value::as_str) {
            Some(owner) => format!("Device is already reserved by {owner}."),
            None => "Device is not available for reservation.".to_owned(),
        },
        (Request::Reserve { .. }, 400) => bad_request("device and username parameters are"),

        (Request::Release { .. }, 200) => "Device successfully released.".to_owned(),
        (Request::Release { .. }, 304) => "Device is not currently reserved.".to_owned(),

        (Request::Add { .. }, 201) => "Device successfully added.".to_owned(),
        (Request::Add { .. }, 409) => "A device with this name already exists.".to_owned(),
        (Request::Add { .. }, 400) => bad_request("device and model parameters are"),

        (Request::Offline { .. }, 200) => "Device successfully set to offline.".to_owned(),
        (Request::Offline { .. }, 304) => "Device is already offline.".to_owned(),

        (Request::Online { .. }, 200) => "Device successfully set to online.".to_owned(),
        (Request::Online { .. }, 304) => "Device is already online.".to_owned(),

        (Request::Delete { .. }, 204) => "Device successfully deleted.".to_owned(),

        (Request::List, _) => unexpected(status),
        (_, 404) => "The specified device does not exist.".to_owned(),
        (_, 400) => bad_request("device parameter is"),
        (_, _) => unexpected(status),
    };
    Ok(text)
}

fn unexpected(status: StatusCode) -> String {
    format!("Unexpected status code {}", status.as_u16())
}

fn render_devices(devices: &[DeviceRecord], now: DateTime<Utc>) -> String {
    let headers = [
        "Name",
        "Model",
        "Status",
        "Reserved By",
        "Reserved At",
        "Reserved For",
    ];
    let rows: Vec<Vec<String>> = devices
        .iter()
        .map(|device| {
            let (reserved_at, reserved_for) = match (device.status, device.reservation_time) {
                (Status::Reserved, Some(at)) => (
                    at.with_timezone(&Local)
                        .format("%d.%m.%Y %H:%M:%S")
                        .to_string(),
                    format!("{} by now", natural_delta(now - at)),
                ),
                _ => (String::new(), String::new()),
            };
            vec![
                device.name.clone(),
                device.model.clone(),
                device.status.to_string(),
                device.user.clone().unwrap_or_default(),
                reserved_at,
                reserved_for,
            ]
        })
        .collect();
    render_table(&headers, &rows)
}

/// Plain-text table with a border around each section.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let border = format!("+{border}+");
    let line = |cells: Vec<&str>| {
        let cells = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!(" {cell:<width$} "))
            .collect::<Vec<_>>()
            .join("|");
        format!("|{cells}|")
    };

    let mut out = vec![border.clone(), line(headers.to_vec()), border.clone()];
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.push(border);
    out.join("\n")
}

/// Coarse human description of an elapsed time, e.g. "an hour".
fn natural_delta(delta: chrono::Duration) -> String {
    let secs = delta.num_seconds().max(0);
    match secs {
        0 => "a moment".to_owned(),
        1 => "a second".to_owned(),
        2..=59 => format!("{secs} seconds"),
        60..=119 => "a minute".to_owned(),
        120..=3599 => format!("{} minutes", secs / 60),
        3600..=7199 => "an hour".to_owned(),
        7200..=86399 => format!("{} hours", secs / 3600),
        86400..=172799 => "a day".to_owned(),
        _ => format!("{} days", secs / 86400),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap()
    }

    fn reserve() -> Request {
        Request::Reserve {
            device: "D1".to_owned(),
            user: "alice".to_owned(),
        }
    }

    #[test]
    fn device_names_are_escaped_in_urls() {
        let client = Client::new(&ServerAddress {
            protocol: "http".to_owned(),
            address: "lab".to_owned(),
            port: "8080".to_owned(),
        })
        .unwrap();
        let delete = Request::Delete {
            device: "lab/phone?1 #2".to_owned(),
        };
        assert_eq!(
            client.url(&delete.path()).unwrap().as_str(),
            "http://lab:8080/devices/delete/lab%2Fphone%3F1%20%232"
        );
        assert_eq!(
            client.url(&["health"]).unwrap().as_str(),
            "http://lab:8080/health"
        );
    }

    #[test]
    fn request_routes() {
        assert_eq!(Request::List.method(), Method::GET);
        assert_eq!(Request::List.path(), ["devices", "list"]);
        let delete = Request::Delete {
            device: "D1".to_owned(),
        };
        assert_eq!(delete.method(), Method::DELETE);
        assert_eq!(delete.path(), ["devices", "delete", "D1"]);
        assert_eq!(delete.payload(), None);
        assert_eq!(
            reserve().payload(),
            Some(json!({"device": "D1", "username": "alice"}))
        );
    }

    #[test]
    fn reserve_messages() {
        let render = |status: u16, body: Value| {
            render(&reserve(), StatusCode::from_u16(status).unwrap(), &body, now()).unwrap()
        };
        assert_eq!(render(200, Value::Null), "Device successfully reserved.");
        assert_eq!(
            render(409, json!({"reserved_by": "bob"})),
            "Device is already reserved by bob."
        );
        assert_eq!(
            render(409, json!({"reserved_by": null})),
            "Device is not available for reservation."
        );
        assert_eq!(render(404, Value::Null), "The specified device does not exist.");
        assert_eq!(render(418, Value::Null), "Unexpected status code 418");
    }

    #[test]
    fn no_op_messages() {
        let device = "D1".to_owned();
        let not_modified = StatusCode::NOT_MODIFIED;
        assert_eq!(
            render(&Request::Release { device: device.clone() }, not_modified, &Value::Null, now())
                .unwrap(),
            "Device is not currently reserved."
        );
        assert_eq!(
            render(&Request::Offline { device: device.clone() }, not_modified, &Value::Null, now())
                .unwrap(),
            "Device is already offline."
        );
        assert_eq!(
            render(&Request::Online { device }, not_modified, &Value::Null, now()).unwrap(),
            "Device is already online."
        );
    }

    #[test]
    fn empty_list() {
        assert_eq!(
            render(&Request::List, StatusCode::NO_CONTENT, &Value::Null, now()).unwrap(),
            "No devices found."
        );
    }

    #[test]
    fn list_table() {
        let body = json!({"devices": [
            {"name": "Device1", "model": "Model1", "status": "free", "user": null, "reservation_time": null},
            {"name": "Device2", "model": "Model2", "status": "reserved", "user": "User1",
             "reservation_time": "2021-01-01T00:00:00Z"},
        ]});
        let table = render(&Request::List, StatusCode::OK, &body, now()).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 6);
        assert!(lines[1].starts_with("| Name    | Model  | Status   | Reserved By |"));
        assert!(lines[3].starts_with("| Device1 | Model1 | free     |             |"));
        assert!(lines[4].starts_with("| Device2 | Model2 | reserved | User1       |"));
        assert!(lines[4].ends_with("| an hour by now |"));
        assert!(lines.iter().all(|l| l.chars().count() == lines[0].chars().count()));
    }

    #[test]
    fn natural_deltas() {
        assert_eq!(natural_delta(Duration::seconds(-5)), "a moment");
        assert_eq!(natural_delta(Duration::seconds(45)), "45 seconds");
        assert_eq!(natural_delta(Duration::minutes(1)), "a minute");
        assert_eq!(natural_delta(Duration::minutes(59)), "59 minutes");
        assert_eq!(natural_delta(Duration::hours(5)), "5 hours");
        assert_eq!(natural_delta(Duration::days(1)), "a day");
        assert_eq!(natural_delta(Duration::days(3)), "3 days");
    }

    #[test]
    fn health_statuses() {
        assert_eq!(health_note(StatusCode::OK).unwrap(), None);
        assert_eq!(
            health_note(StatusCode::BAD_REQUEST).unwrap().as_deref(),
            Some("Server is accessible, though returned status code 400.")
        );
        assert!(health_note(StatusCode::INTERNAL_SERVER_ERROR).is_err());
    }
}
