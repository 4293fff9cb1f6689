use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use quill_core::Rope;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LEN: u32 = 100_000;

fn numbered() -> Rope<u32> {
    let mut rope = Rope::new();
    // Many small appends give a deep tree, so readers walk real paths.
    for chunk in (0..LEN).collect::<Vec<_>>().chunks(97) {
        rope.extend_from_slice(chunk);
    }
    rope
}

#[test]
fn test_shared_rope_readers_agree() {
    let rope = Arc::new(numbered());

    let handles: Vec<_> = (0..8u64)
        .map(|seed| {
            let rope = Arc::clone(&rope);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut index = rng.gen_range(0..LEN);
                for _ in 0..20_000 {
                    // Mix sequential runs with jumps so threads keep replacing
                    // each other's cached path.
                    index = if rng.gen_bool(0.8) {
                        (index + 1) % LEN
                    } else {
                        rng.gen_range(0..LEN)
                    };
                    assert_eq!(rope.get(index as usize).expect("index in range"), index);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("reader thread panicked");
    }
    assert_eq!(rope.to_vec(), (0..LEN).collect::<Vec<_>>());
}

#[test]
fn test_clone_handed_to_thread_is_isolated_from_writer() {
    let mut rope = numbered();
    let snapshot = rope.clone();

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            for round in 0..5 {
                for (expected, item) in (0..LEN).zip(snapshot.iter()) {
                    assert_eq!(item, expected, "round {round}");
                }
            }
        });

        for i in 0..2_000usize {
            rope.set(i * 37 % LEN as usize, 0).expect("index in range");
            rope.insert(i * 11 % rope.len(), u32::MAX).expect("index in range");
            rope.remove_range(i * 13 % (rope.len() - 3), 3).expect("range in bounds");
        }

        reader.join().expect("reader thread panicked");
    });

    assert_eq!(snapshot.to_vec(), (0..LEN).collect::<Vec<_>>());
    assert_eq!(rope.len(), LEN as usize - 2_000 * 2);
    rope.assert_invariants();
}

#[test]
fn test_lazy_rope_initializes_once_under_contention() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let rope = Arc::new(Rope::from_fn(LEN as usize, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        numbered()
    }));

    thread::scope(|scope| {
        for offset in 0..8u32 {
            let rope = &rope;
            scope.spawn(move || {
                let index = offset * 1_000;
                assert_eq!(rope.get(index as usize).expect("index in range"), index);
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
