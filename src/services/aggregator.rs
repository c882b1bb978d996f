use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::devices::Measurement;

/// Merges every poller's emissions into one stream, in arrival order, and
/// fans it out to any number of subscribers.
///
/// Subscribers each get a bounded buffer. A subscriber that falls behind
/// loses its oldest measurements; the producer side never waits on it.
pub struct Aggregator {
    tx: mpsc::Sender<Measurement>,
    rx: mpsc::Receiver<Measurement>,
    fanout: broadcast::Sender<Arc<Measurement>>,
}

impl Aggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (fanout, _) = broadcast::channel(capacity);
        Self {
            tx,
            rx,
            fanout,
        }
    }

    /// Input handle for a poller. The merged stream ends once every sender is dropped.
    pub fn sender(&self) -> mpsc::Sender<Measurement> {
        self.tx.clone()
    }

    /// Only measurements forwarded after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Measurement>> {
        self.fanout.subscribe()
    }

    /// Forwards until all inputs close, then closes the fan-out.
    /// Returns the number of measurements forwarded.
    pub async fn run(self) -> u64 {
        let Aggregator { tx, mut rx, fanout } = self;
        drop(tx);
        let mut forwarded = 0;

        while let Some(measurement) = rx.recv().await {
            let device = measurement.device_name().to_string();
            match fanout.send(Arc::new(measurement)) {
                Ok(receivers) => {
                    debug!("📨 {} forwarded to {} sink(s)", device, receivers);
                }
                Err(_) => debug!("📭 {} has no subscribers, discarded", device),
            }
            forwarded += 1;
        }

        info!("📊 Aggregator stopped after {} measurement(s)", forwarded);
        forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Values;
    use chrono::Utc;

    fn measurement(device: &str, n: i64) -> Measurement {
        let mut values = Values::new();
        values.insert("n", n);
        Measurement::new(device, values, Utc::now())
    }

    #[tokio::test]
    async fn preserves_per_source_order_and_fans_out() {
        let aggregator = Aggregator::new(16);
        let a = aggregator.sender();
        let b = aggregator.sender();
        let mut first = aggregator.subscribe();
        let mut second = aggregator.subscribe();
        let task = tokio::spawn(aggregator.run());

        for n in 0..3 {
            a.send(measurement("a", n)).await.unwrap();
            b.send(measurement("b", n)).await.unwrap();
        }
        drop(a);
        drop(b);
        assert_eq!(task.await.unwrap(), 6);

        for rx in [&mut first, &mut second] {
            let mut seen = Vec::new();
            while let Ok(m) = rx.recv().await {
                seen.push((m.device_name().to_string(), m.values().get("n").unwrap().as_f64()));
            }
            assert_eq!(seen.len(), 6);
            for device in ["a", "b"] {
                let order: Vec<f64> = seen.iter().filter(|(d, _)| d == device).map(|(_, n)| *n).collect();
                assert_eq!(order, vec![0.0, 1.0, 2.0]);
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_hold_back_others() {
        let aggregator = Aggregator::new(2);
        let tx = aggregator.sender();
        let mut slow = aggregator.subscribe();
        let mut fast = aggregator.subscribe();
        let task = tokio::spawn(aggregator.run());

        for n in 0..5 {
            tx.send(measurement("a", n)).await.unwrap();
            let m = fast.recv().await.unwrap();
            assert_eq!(m.values().get("n").unwrap().as_f64(), n as f64);
        }
        drop(tx);
        task.await.unwrap();

        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        let m = slow.recv().await.unwrap();
        assert_eq!(m.values().get("n").unwrap().as_f64(), 3.0);
    }
}
