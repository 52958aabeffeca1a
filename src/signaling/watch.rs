use crate::signaling::store;
use crate::peer::types::SignalingRecord;
use tokio::time::{interval, MissedTickBehavior};

/// Cancellation handle for a room watch. Aborting is the only way to stop
/// the loop; dropping the handle aborts too so a replaced watch cannot
/// leak its task.
pub struct RoomWatch {
    task: tokio::task::JoinHandle<()>,
}

impl RoomWatch {
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for RoomWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Replays the room's current offer/answer records to the callbacks: once
/// per poll tick and additionally whenever the store is written. Callbacks
/// fire with the full current record whether or not it changed since the
/// last fire, so consumers must be idempotent.
pub fn watch_room<F, G>(room: &str, mut on_offer: F, mut on_answer: G) -> RoomWatch
where
    F: FnMut(SignalingRecord) + Send + 'static,
    G: FnMut(SignalingRecord) + Send + 'static,
{
    let room = room.to_string();
    let task = tokio::spawn(async move {
        let mut tick = interval(store::POLL_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // re-resolve the notify each round; the room entry may have
            // been swept and recreated in between
            let notify = store::room_notify(&room);
            let notified = notify.notified();
            tokio::select! {
                _ = tick.tick() => {}
                _ = notified => {}
            }
            if let Some(record) = store::offer(&room) {
                on_offer(record);
            }
            if let Some(record) = store::answer(&room) {
                on_answer(record);
            }
        }
    });
    RoomWatch { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::{SdpPayload, SignalingRecord};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

    fn record(id: &str) -> SignalingRecord {
        let sdp = RTCSessionDescription::offer(
            "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".to_string(),
        )
        .expect("test sdp");
        SignalingRecord {
            sdp_payload: SdpPayload {
                sdp,
                id: id.to_string(),
                ts: 0,
            },
            candidates: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_sees_offer_published_before_subscribing() {
        let room = "watch-test-before";
        store::set_offer(room, record("early"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = watch_room(
            room,
            move |rec| {
                let _ = tx.send(rec.sdp_payload.id);
            },
            |_| {},
        );

        let id = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("offer observed within one poll interval")
            .unwrap();
        assert_eq!(id, "early");
        watch.cancel();
        store::remove_room(room);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_woken_by_late_publish() {
        let room = "watch-test-after";
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = watch_room(room, |_| {}, move |rec| {
            let _ = tx.send(rec.sdp_payload.id);
        });

        // let the watcher park first
        tokio::time::sleep(Duration::from_millis(10)).await;
        store::set_answer(room, record("late"));

        let id = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("answer observed after publish")
            .unwrap();
        assert_eq!(id, "late");
        watch.cancel();
        store::remove_room(room);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callbacks_fire_redundantly_every_tick() {
        let room = "watch-test-redundant";
        store::set_offer(room, record("same"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = watch_room(
            room,
            move |rec| {
                let _ = tx.send(rec.sdp_payload.id);
            },
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        watch.cancel();

        let mut fires = 0;
        while rx.try_recv().is_ok() {
            fires += 1;
        }
        assert!(fires >= 3, "expected redundant replays, got {}", fires);
        store::remove_room(room);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_the_loop() {
        let room = "watch-test-cancel";
        store::set_offer(room, record("x"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = watch_room(
            room,
            move |_| {
                let _ = tx.send(());
            },
            |_| {},
        );
        tokio::time::sleep(Duration::from_millis(1100)).await;
        watch.cancel();
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err(), "cancelled watch kept firing");
        store::remove_room(room);
    }
}
