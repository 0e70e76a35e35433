//! Frame pool accounting under arbitrary allocate/free sequences.

use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameAllocError, FrameRequest};
use kernel_memory_addresses::PhysicalPage;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Op {
    Alloc,
    /// Free the n-th live frame (modulo the live count).
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![3 => Just(Op::Alloc), 2 => any::<usize>().prop_map(Op::Free)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `filled` always matches the live set, no frame is handed out twice,
    /// and allocation fails exactly when the pool is full.
    #[test]
    fn filled_matches_live_frames(size in 1usize..96, ops in prop::collection::vec(op(), 0..300)) {
        let mut pool = BitmapFrameAlloc::new(size);
        let mut live = BTreeSet::new();

        for op in ops {
            match op {
                Op::Alloc => {
                    let full = pool.filled() == pool.size();
                    match pool.allocate(FrameRequest::Auto) {
                        Ok(frame) => {
                            prop_assert!(!full);
                            prop_assert!(live.insert(frame.number()), "frame {} handed out twice", frame);
                        }
                        Err(e) => {
                            prop_assert!(full);
                            prop_assert_eq!(e, FrameAllocError::Exhausted);
                        }
                    }
                }
                Op::Free(n) => {
                    if live.is_empty() {
                        continue;
                    }
                    let pfn = *live.iter().nth(n % live.len()).unwrap();
                    live.remove(&pfn);
                    prop_assert!(pool.free(PhysicalPage::from_number(pfn)).is_ok());
                }
            }

            prop_assert_eq!(pool.filled(), live.len());
            let used = (0..size as u64)
                .filter(|&pfn| pool.is_used(PhysicalPage::from_number(pfn)))
                .count();
            prop_assert_eq!(used, live.len());
        }
    }
}
