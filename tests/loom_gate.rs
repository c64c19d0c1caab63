#![cfg(feature = "loom")]

use std::sync::Arc;

use lite_ready::gate::{Readiness, ReadinessGate};
use lite_ready::host::View;
use loom::future::block_on;
use loom::thread;

#[test]
fn loom_ready_between_check_and_subscribe() {
    loom::model(|| {
        let view = Arc::new(View::new());
        let mut gate = ReadinessGate::new(&view);

        let host = view.clone();
        let readier = thread::spawn(move || {
            host.mark_ready();
        });

        if let Readiness::Suspended(token) = gate.await_ready(|| ()).unwrap() {
            block_on(token);
        }
        readier.join().unwrap();

        assert_eq!(gate.await_ready(|| 5).unwrap().ready(), Some(5));
    });
}
