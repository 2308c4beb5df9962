use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use energy_client::domain::EnergyReading;
use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

#[derive(Clone)]
struct SharedSender {
    tx: mpsc::Sender<Envelope<EnergyReading>>,
}

/// Push source for energy counter readings posted by meters or relays.
#[derive(Clone)]
pub struct HttpReadingsSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<EnergyReading>>>>>,
}

#[derive(Debug, serde::Deserialize)]
struct IncomingEnergyReading {
    channel: i32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    ts: Option<OffsetDateTime>,
    energy_total_wh: f64,
    device_id: Option<String>,
    power_w: Option<f64>,
    voltage: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
struct DeviceInfo {
    id: String,
}

/// One metering channel of a multi-channel energy meter status report.
#[derive(Debug, serde::Deserialize)]
struct Emeter {
    power: Option<f64>,
    voltage: Option<f64>,
    total: f64,
}

#[derive(Debug, serde::Deserialize)]
struct MeterStatus {
    device: Option<DeviceInfo>,
    emeters: Vec<Emeter>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum IncomingPayload {
    Batch(Vec<IncomingEnergyReading>),
    Status(MeterStatus),
}

#[derive(Debug, serde::Serialize)]
struct IngestResponse {
    accepted: usize,
}

impl IncomingPayload {
    fn into_readings(self, received: OffsetDateTime) -> Vec<EnergyReading> {
        match self {
            IncomingPayload::Batch(items) => items
                .into_iter()
                .map(|i| EnergyReading {
                    channel: i.channel,
                    ts: i.ts.unwrap_or(received),
                    energy_total_wh: i.energy_total_wh,
                    device_id: i.device_id,
                    power_w: i.power_w,
                    voltage: i.voltage,
                })
                .collect(),
            IncomingPayload::Status(status) => {
                let device_id = status.device.map(|d| d.id);
                status
                    .emeters
                    .into_iter()
                    .enumerate()
                    .map(|(idx, e)| EnergyReading {
                        channel: idx as i32,
                        ts: received,
                        energy_total_wh: e.total,
                        device_id: device_id.clone(),
                        power_w: e.power,
                        voltage: e.voltage,
                    })
                    .collect()
            }
        }
    }
}

impl HttpReadingsSource {
    pub async fn new(bind_addr: &str, channel_capacity: usize) -> Result<Self, PipelineError> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        let (source, app) = Self::with_router(channel_capacity);

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        tracing::error!(error = %e, "energy readings source server error");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, %addr, "failed to bind energy readings listener");
                }
            }
        });

        Ok(source)
    }

    /// Builds the source together with its ingest router, leaving serving to the caller.
    pub fn with_router(channel_capacity: usize) -> (Self, Router) {
        let (tx, rx) = mpsc::channel(channel_capacity);

        let app = Router::new()
            .route("/ingest/energy_readings", post(ingest_energy_readings))
            .with_state(SharedSender { tx });

        let source = Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        };
        (source, app)
    }
}

#[async_trait::async_trait]
impl Source<EnergyReading> for HttpReadingsSource {
    async fn stream(&self) -> RecordStream<EnergyReading> {
        let mut guard = self.receiver.lock().await;
        match guard.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx).map(Ok)),
            None => Box::pin(futures::stream::once(async {
                Err(PipelineError::Source(
                    "HttpReadingsSource stream already taken; only one consumer supported".to_string(),
                ))
            })),
        }
    }
}

async fn ingest_energy_readings(
    State(sender): State<SharedSender>,
    Json(payload): Json<IncomingPayload>,
) -> Result<Json<IngestResponse>, StatusCode> {
    metrics::counter!("http_ingest_requests_total").increment(1);

    let readings = payload.into_readings(OffsetDateTime::now_utc());
    if readings.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let accepted = readings.len();
    for reading in readings {
        if sender.tx.send(Envelope::now(reading)).await.is_err() {
            // Pipeline consumer is gone.
            metrics::counter!("http_ingest_failed_total").increment(1);
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    tracing::debug!(accepted, "energy readings queued");
    Ok(Json(IngestResponse { accepted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use time::macros::datetime;
    use tower::ServiceExt;

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ingest/energy_readings")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn batch_payload_is_forwarded_in_order() {
        let (source, app) = HttpReadingsSource::with_router(8);
        let mut stream = source.stream().await;

        let res = app
            .oneshot(post_json(
                r#"[
                    {"channel": 0, "ts": "2025-03-01T10:00:00Z", "energy_total_wh": 1500.0},
                    {"channel": 1, "ts": "2025-03-01T10:00:00Z", "energy_total_wh": 20.5, "power_w": 0.0}
                ]"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let first = stream.next().await.unwrap().unwrap().payload;
        assert_eq!(first.channel, 0);
        assert_eq!(first.ts, datetime!(2025-03-01 10:00:00 UTC));
        assert_eq!(first.energy_total_wh, 1500.0);

        let second = stream.next().await.unwrap().unwrap().payload;
        assert_eq!(second.channel, 1);
        assert_eq!(second.power_w, Some(0.0));
    }

    #[tokio::test]
    async fn meter_status_maps_emeter_index_to_channel() {
        let (source, app) = HttpReadingsSource::with_router(8);
        let mut stream = source.stream().await;

        let res = app
            .oneshot(post_json(
                r#"{
                    "device": {"id": "em-1"},
                    "emeters": [
                        {"power": 2950.0, "voltage": 238.1, "total": 10500.0},
                        {"power": 0.0, "voltage": 238.0, "total": 800.0}
                    ]
                }"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let first = stream.next().await.unwrap().unwrap().payload;
        let second = stream.next().await.unwrap().unwrap().payload;
        assert_eq!((first.channel, first.energy_total_wh), (0, 10500.0));
        assert_eq!((second.channel, second.energy_total_wh), (1, 800.0));
        assert_eq!(second.device_id.as_deref(), Some("em-1"));
        assert_eq!(first.ts, second.ts);
    }

    #[tokio::test]
    async fn empty_batch_is_bad_request() {
        let (_source, app) = HttpReadingsSource::with_router(8);

        let res = app.oneshot(post_json("[]")).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stream_can_only_be_taken_once() {
        let (source, _app) = HttpReadingsSource::with_router(8);
        let _first = source.stream().await;

        let mut second = source.stream().await;

        assert!(matches!(second.next().await, Some(Err(PipelineError::Source(_)))));
    }
}
