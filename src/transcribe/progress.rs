use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// One self-contained progress message, one per line on the relay stream.
///
/// The stream is one-directional and lossy by design: the final outcome
/// travels over the durable result marker instead, so lost or garbled
/// progress lines cost nothing but display fidelity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    /// Completion fraction in [0.0, 1.0], non-decreasing.
    pub value: f64,
    /// Estimated remaining seconds; None when the engine cannot tell.
    pub eta_sec: Option<f64>,
    pub elapsed_sec: f64,
}

/// Parse a single relay line. Malformed lines, foreign message types, and
/// out-of-range fractions yield `None` and are skipped by the reader.
pub fn parse_line(line: &str) -> Option<ProgressUpdate> {
    let update: ProgressUpdate = serde_json::from_str(line.trim()).ok()?;
    if update.kind != "progress" {
        return None;
    }
    if !(0.0..=1.0).contains(&update.value) || !update.value.is_finite() {
        return None;
    }
    Some(update)
}

/// Drain progress updates from an engine's stdout until the stream closes,
/// invoking `on_update` for each well-formed message. Updates that would move
/// the completion fraction backwards are skipped, keeping the relayed view
/// monotonic even against a misbehaving producer.
pub async fn relay_progress<R>(reader: R, mut on_update: impl FnMut(ProgressUpdate))
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut high_water = 0.0f64;

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(update) = parse_line(&line) {
            if update.value < high_water {
                continue;
            }
            high_water = update.value;
            on_update(update);
        }
    }
}
