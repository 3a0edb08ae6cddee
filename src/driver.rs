use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use log::trace;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::registry::Session;

/// Drive [`Session::refresh_all`] from the tokio runtime every `period`.
///
/// The task only holds a weak reference, so it shuts itself down on the first tick after the
/// session is dropped. Handlers run on the runtime's worker threads.
pub fn spawn_refresh_task(session: &Arc<Session>, period: Duration) -> JoinHandle<()> {
    let session: Weak<Session> = Arc::downgrade(session);
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        // A stalled runtime shouldn't cause a burst of back-to-back refreshes
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let session = match session.upgrade() {
                Some(session) => session,
                None => {
                    trace!("(refresh task) session dropped, shutting down task");
                    return;
                }
            };
            let changed = session.refresh_all();
            if !changed.is_empty() {
                trace!("(refresh task) {} estimates changed", changed.len());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{controller::PeerId, notify, test_helper::*};

    #[tokio::test(start_paused = true)]
    async fn drives_refresh_test() {
        let (session, clock) = get_session();
        let session = Arc::new(session);
        let (handler, mut receiver) = notify::channel();
        session.create_controller(PeerId(4), handler).unwrap();

        session.add_recv(PeerId(4), 1000).unwrap();
        clock.advance(1200);

        let task = spawn_refresh_task(&session, Duration::from_millis(100));
        let change = receiver.recv().await.unwrap();
        assert_eq!(change.peer, PeerId(4));
        assert!(change.bandwidth > 64_000.0);

        drop(session);
        task.await.unwrap();
        // The handler went away with the session
        assert_eq!(receiver.recv().await, None);
    }
}
