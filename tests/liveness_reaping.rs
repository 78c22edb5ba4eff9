// SPDX-License-Identifier: Apache-2.0 OR MIT

//! P7: if a device stops announcing, every peer removes its mirror within
//! twice the configured liveness timeout and fires exactly one `removed`.

use std::cell::RefCell;
use std::rc::Rc;

use sigmesh::transport::LoopbackTransport;
use sigmesh::{Database, Device, DeviceConfig, Event};

fn config(identifier: &str, liveness_timeout_ms: u64) -> DeviceConfig {
    DeviceConfig::builder(identifier)
        .naming_probe_window_ms(2)
        .port_probe_window_ms(2)
        .announcement_interval_ms(5)
        .liveness_timeout_ms(liveness_timeout_ms)
        .build()
        .unwrap()
}

#[test]
fn a_silent_peer_is_reaped_with_exactly_one_removed_callback() {
    let admin_hub = LoopbackTransport::new_hub();
    let data_hub = LoopbackTransport::new_hub();
    let liveness_timeout_ms = 20;

    let mut flaky = Device::with_transports(
        config("flaky", liveness_timeout_ms),
        LoopbackTransport::join(admin_hub.clone()),
        LoopbackTransport::join(data_hub.clone()),
    )
    .unwrap();
    let mut watcher = Device::with_transports(
        config("watcher", liveness_timeout_ms),
        LoopbackTransport::join(admin_hub),
        LoopbackTransport::join(data_hub),
    )
    .unwrap();

    for _ in 0..8 {
        flaky.poll(5).unwrap();
        watcher.poll(5).unwrap();
    }
    assert!(flaky.ready());
    assert!(watcher.ready());
    assert!(watcher.database().get_device("flaky.1").is_some());

    let removed_count = Rc::new(RefCell::new(0));
    let removed_count_handle = removed_count.clone();
    register_removed_counter(watcher.database(), removed_count_handle);

    // `flaky` stops polling entirely, so its announce timer never fires
    // again; `watcher` keeps polling past 2x the liveness timeout.
    for _ in 0..20 {
        watcher.poll(5).unwrap();
    }

    assert!(watcher.database().get_device("flaky.1").is_none(), "stale mirror should have been reaped");
    assert_eq!(*removed_count.borrow(), 1, "removed should fire exactly once");
}

fn register_removed_counter(db: &Database, counter: Rc<RefCell<u32>>) {
    db.on_device(move |record, event| {
        if event == Event::Removed && record.ordinal_name == "flaky.1" {
            *counter.borrow_mut() += 1;
        }
    });
}
