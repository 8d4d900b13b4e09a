use lbsim_core::{Agent, Request, RequestQueue};
use proptest::prelude::*;
use std::collections::VecDeque;

#[test]
fn test_enqueue_stamps_queued_time() {
    let mut queue = RequestQueue::new(2);
    let mut request = Request::new(7, 10.0, 0.0);
    assert!(queue.enqueue(&mut request, 12.5));
    assert_eq!(request.queued, Some(12.5));
    assert_eq!(queue.dequeue(), Some(7));
    assert!(queue.is_empty());
}

#[test]
fn test_zero_capacity_queue_rejects_everything() {
    let mut queue = RequestQueue::new(0);
    let mut request = Request::new(1, 10.0, 0.0);
    assert!(!queue.enqueue(&mut request, 0.0));
    assert_eq!(request.queued, None);
    assert_eq!(queue.len(), 0);
}

proptest! {
    #[test]
    fn queue_is_bounded_fifo(
        capacity in 0usize..8,
        ops in proptest::collection::vec(any::<bool>(), 0..64),
    ) {
        let mut queue = RequestQueue::new(capacity);
        let mut model: VecDeque<u64> = VecDeque::new();
        let mut next_id = 0;

        for enqueue in ops {
            if enqueue {
                let mut request = Request::new(next_id, 1.0, 0.0);
                next_id += 1;
                let before: Vec<u64> = queue.iter().collect();
                if queue.enqueue(&mut request, 5.0) {
                    model.push_back(request.id());
                    prop_assert_eq!(request.queued, Some(5.0));
                } else {
                    prop_assert_eq!(before.len(), capacity);
                    prop_assert_eq!(queue.iter().collect::<Vec<_>>(), before);
                    prop_assert_eq!(request.queued, None);
                }
            } else {
                prop_assert_eq!(queue.dequeue(), model.pop_front());
            }
            prop_assert!(queue.len() <= capacity);
            let expected: Vec<u64> = model.iter().copied().collect();
            prop_assert_eq!(queue.iter().collect::<Vec<_>>(), expected);
        }
    }
}
