//! Pipeline Stages (C5, spec §4.5).
//!
//! Each stage is a pure-ish function of `(job inputs, prior outputs,
//! resolved provider, progress sink, cancellation) -> artifact`. Stages
//! never mutate the `Job` record directly — the runner (C6) owns that.

pub mod export;
pub mod narration;
pub mod render;
pub mod script;
pub mod visuals;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Coalesces progress emissions to at most one per 100ms, per the
/// bounded-sink requirement in spec §4.6 step 3.
pub struct ProgressSink {
    tx: mpsc::Sender<u8>,
    last_sent: std::sync::Mutex<Option<Instant>>,
}

const COALESCE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<u8>) -> Self {
        Self {
            tx,
            last_sent: std::sync::Mutex::new(None),
        }
    }

    /// Reports percent, dropping intermediate updates faster than the
    /// coalescing interval. The final `100` is never dropped.
    pub async fn report(&self, percent: u8) {
        let now = Instant::now();
        let should_send = {
            let mut last = self.last_sent.lock().unwrap();
            let send = percent >= 100
                || last.map(|t| now.duration_since(t) >= COALESCE_INTERVAL).unwrap_or(true);
            if send {
                *last = Some(now);
            }
            send
        };
        if should_send {
            let _ = self.tx.send(percent.min(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coalesces_rapid_updates_but_always_sends_completion() {
        let (tx, mut rx) = mpsc::channel(16);
        let sink = ProgressSink::new(tx);
        for p in 0..20 {
            sink.report(p).await;
        }
        sink.report(100).await;
        drop(sink);

        let mut received = Vec::new();
        while let Ok(v) = rx.try_recv() {
            received.push(v);
        }
        assert!(received.len() < 20, "should have coalesced most updates");
        assert_eq!(*received.last().unwrap(), 100);
    }
}
