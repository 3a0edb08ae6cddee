use std::sync::{Arc, Mutex};

use crate::{
    config::Config,
    controller::{BandwidthController, PeerId},
    registry::Session,
    time::ManualClock,
};

pub(crate) type Calls = Arc<Mutex<Vec<(PeerId, f32)>>>;

pub(crate) fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

/// Handler that records every notification it receives.
pub(crate) fn recording_handler() -> (
    impl Fn(&BandwidthController, PeerId, f32) + Send + Sync + 'static,
    Calls,
) {
    let calls: Calls = Arc::new(Mutex::new(vec![]));
    let sink = Arc::clone(&calls);
    let handler = move |_: &BandwidthController, peer: PeerId, bandwidth: f32| {
        sink.lock().unwrap().push((peer, bandwidth));
    };
    (handler, calls)
}

pub(crate) fn get_controller(config: Config) -> (BandwidthController, ManualClock, Calls) {
    init_logger();
    let clock = ManualClock::new(0);
    let (handler, calls) = recording_handler();
    let controller =
        BandwidthController::with_clock(PeerId(7), config, handler, Arc::new(clock.clone()))
            .unwrap();
    (controller, clock, calls)
}

pub(crate) fn get_session() -> (Session, ManualClock) {
    init_logger();
    let clock = ManualClock::new(0);
    let session = Session::with_clock(Config::default(), Arc::new(clock.clone())).unwrap();
    (session, clock)
}
