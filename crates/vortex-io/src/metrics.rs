//! The Prometheus metrics endpoint.
//!
//! Three counters under the `vortex` namespace, recorded from the source (message/metadata
//! consumption) and the sink (upserts). Exposed over HTTP only when `metrics.enabled` is set;
//! otherwise recording is a cheap no-op through the `metrics` facade's default no-op recorder.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use vortex_core::Record;

/// Installs the global Prometheus recorder and serves `/metrics` on the configured port.
///
/// Must be called once, before any counters are recorded, so the default no-op recorder
/// is never the one that gets measurements discarded into it.
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Serving metrics");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Records `count` completed upserts against `upserted_total`. Counts the number of
/// write models submitted in the bulk write, not the store's reported upserted/modified
/// counts — matching the original, which increments by the buffer length rather than
/// by `BulkWriteResult`'s own counters.
pub fn record_upserts(count: u64) {
    metrics::counter!("vortex_upserted_total").increment(count);
}

/// Records one consumed message against `messages_consumed_total` or
/// `metadata_consumed_total`, matched case-insensitively against the record's `type`
/// header. An unrecognized or missing type is logged and not counted — reproduced as-is
/// from the original, which does the same case-insensitive comparison here while the
/// sink's own coordinate-stamping check on the same header is case-sensitive.
pub fn record_consumption(record: &Record) {
    let message_type = record.header("type").unwrap_or_default();
    match message_type.to_lowercase().as_str() {
        "message" => metrics::counter!("vortex_messages_consumed_total").increment(1),
        "metadata" => metrics::counter!("vortex_metadata_consumed_total").increment(1),
        _ => tracing::warn!(
            r#type = %message_type,
            key = %record.key_as_string(),
            "Unknown message type. Will not be recorded in metrics."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record_with_type(message_type: &str) -> Record {
        Record {
            topic: "status".into(),
            partition: 0,
            offset: 0,
            key: b"k".to_vec(),
            value: b"{}".to_vec(),
            headers: vec![("type".into(), message_type.as_bytes().to_vec())],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn record_consumption_matches_type_header_case_insensitively() {
        record_consumption(&record_with_type("MESSAGE"));
        record_consumption(&record_with_type("Metadata"));
        record_consumption(&record_with_type("unknown"));
    }
}
