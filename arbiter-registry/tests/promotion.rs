//! Promotion atomicity under concurrent readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use arbiter_core::{ModelArtifact, TraceId};
use arbiter_registry::ModelRegistry;

// A promotion racing a thousand resolve calls must never surface anything
// but the fully-old or fully-new version.
#[test]
fn readers_see_old_or_new_never_torn() {
    let registry = Arc::new(ModelRegistry::new());
    let old_version = registry.register(ModelArtifact::seed()).unwrap();
    let new_version = registry.register(ModelArtifact::seed()).unwrap();
    registry.promote("BTCUSDT", old_version, 1.0).unwrap();

    let start = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let start = Arc::clone(&start);
        readers.push(thread::spawn(move || {
            while !start.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
            let mut seen_new = false;
            for _ in 0..1_000 {
                let resolved = registry.resolve_active("BTCUSDT", TraceId::new()).unwrap();
                let version = resolved.version;
                assert!(
                    version == old_version || version == new_version,
                    "torn read: {version}"
                );
                // Once the new version is visible it must stay visible.
                if seen_new {
                    assert_eq!(version, new_version);
                }
                seen_new = version == new_version;
            }
        }));
    }

    let writer = {
        let registry = Arc::clone(&registry);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            while !start.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
            registry.promote("BTCUSDT", new_version, 1.0).unwrap();
        })
    };

    start.store(true, Ordering::Release);
    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let settled = registry.resolve_active("BTCUSDT", TraceId::new()).unwrap();
    assert_eq!(settled.version, new_version);
}
