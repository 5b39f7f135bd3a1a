use crossbeam::channel;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;
use crate::pipeline::job::{JobStatus, Stage};

// Per-subscriber buffer depth. A subscriber further behind than this is treated
// as gone and disconnected rather than ever blocking the producer.
const SUBSCRIBER_BUFFER: usize = 64;

///
/// One push on the progress bus. Updates for a single job are published in
/// stage-monotonic order with the terminal status exactly once, last.
///
#[derive(Clone, Debug, Serialize)]
pub struct ProgressUpdate {
    job_id: Uuid,
    status: JobStatus,
    stage: Stage,
    percent: u8,
    detail: String,
    error: Option<String>,
}

impl ProgressUpdate {
    pub fn new(job_id: Uuid, status: JobStatus, stage: Stage, percent: u8, detail: String, error: Option<String>) -> Self {
        Self { job_id, status, stage, percent, detail, error }
    }

    pub fn job_id(&self) -> &Uuid {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

///
/// Push-only, per-job progress fanout.
///
/// Publishing never blocks: each subscriber gets a bounded buffer and one that
/// cannot accept an update (full or dropped) is disconnected on the spot. Slow
/// subscribers therefore miss intermediate updates, never delay a worker.
///
pub struct ProgressBus {
    subscribers: Mutex<HashMap<Uuid, Vec<channel::Sender<ProgressUpdate>>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()) }
    }

    pub fn subscribe(&self, job_id: Uuid) -> channel::Receiver<ProgressUpdate> {
        let (sender, receiver) = channel::bounded(SUBSCRIBER_BUFFER);
        self.subscribers.lock().entry(job_id).or_default().push(sender);
        receiver
    }

    pub fn publish(&self, update: ProgressUpdate) {
        let mut subscribers = self.subscribers.lock();

        if let Some(senders) = subscribers.get_mut(update.job_id()) {
            senders.retain(|sender| {
                match sender.try_send(update.clone()) {
                    Ok(()) => true,
                    Err(_) => false, // Full or disconnected - drop the subscriber.
                }
            });
        }
    }

    ///
    /// Tear down a job's fanout after its terminal update. Dropping the senders
    /// ends every subscriber's stream.
    ///
    pub fn finish_job(&self, job_id: &Uuid) {
        self.subscribers.lock().remove(job_id);
    }

    pub fn subscriber_count(&self, job_id: &Uuid) -> usize {
        self.subscribers.lock().get(job_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(job_id: Uuid, percent: u8) -> ProgressUpdate {
        ProgressUpdate::new(job_id, JobStatus::Running, Stage::Ingest, percent, "working".into(), None)
    }

    #[test]
    fn subscribers_only_see_their_own_job() {
        let bus = ProgressBus::new();
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();

        let recv_a = bus.subscribe(job_a);
        let recv_b = bus.subscribe(job_b);

        bus.publish(update(job_a, 10));

        assert_eq!(recv_a.try_recv().unwrap().percent(), 10);
        assert!(recv_b.try_recv().is_err());
    }

    #[test]
    fn a_full_subscriber_is_disconnected_not_waited_on() {
        let bus = ProgressBus::new();
        let job_id = Uuid::new_v4();
        let receiver = bus.subscribe(job_id);

        for i in 0..SUBSCRIBER_BUFFER + 10 {
            bus.publish(update(job_id, (i % 100) as u8));
        }

        // The overflowing publish dropped the subscriber; the buffered prefix
        // is still readable, then the stream ends.
        assert_eq!(bus.subscriber_count(&job_id), 0);
        let drained = receiver.iter().count();
        assert_eq!(drained, SUBSCRIBER_BUFFER);
    }

    #[test]
    fn finish_job_ends_every_stream() {
        let bus = ProgressBus::new();
        let job_id = Uuid::new_v4();
        let receiver = bus.subscribe(job_id);

        bus.publish(update(job_id, 10));
        bus.finish_job(&job_id);

        assert_eq!(receiver.iter().count(), 1); // One buffered update, then disconnect.
    }

    #[test]
    fn publishing_to_a_job_with_no_subscribers_is_fine() {
        let bus = ProgressBus::new();
        bus.publish(update(Uuid::new_v4(), 10));
    }
}
