//! Queue state-machine tests: FIFO order, dispatch policies, ack/nack and
//! failure recovery. These go straight at `MessageQueue`, bypassing the
//! broker's agent chain.

mod common;

use common::{consumer, delivery_parts, store_in};
use relayq::core::consumer::ConsumerId;
use relayq::core::queue::MessageQueue;

#[test]
fn fifo_order_is_preserved_for_late_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));

    queue.publish("message one", false);
    queue.publish("message two", false);
    queue.publish("message three", false);
    assert_eq!(queue.message_count(), 3);

    let (c1, mut rx1) = consumer("c1");
    queue.subscribe(c1);

    let contents: Vec<String> = (0..3)
        .map(|_| delivery_parts(&rx1.try_recv().unwrap()).1)
        .collect();
    assert_eq!(contents, vec!["message one", "message two", "message three"]);
    assert!(rx1.try_recv().is_err());
}

#[test]
fn message_is_never_in_pending_and_in_flight_at_once() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));

    queue.publish("solitary message", false);
    assert_eq!(queue.message_count(), 1); // pending

    let (c1, mut rx1) = consumer("c1");
    queue.subscribe(c1);
    let (id, _) = delivery_parts(&rx1.try_recv().unwrap());
    assert_eq!(queue.message_count(), 1); // in flight, not duplicated

    assert!(queue.ack(&id, &ConsumerId::from("c1")));
    assert_eq!(queue.message_count(), 0);
}

#[test]
fn fair_dispatch_keeps_targeting_busy_consumer_until_ack() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));
    assert!(queue.fair_dispatch()); // the default

    let (c1, mut rx1) = consumer("c1");
    let (c2, mut rx2) = consumer("c2");
    queue.subscribe(c1);
    queue.subscribe(c2);

    queue.publish("first job xx", false);
    queue.publish("second job xx", false);
    queue.publish("third job xx", false);

    // Consumer 1 never acked, so everything was offered to it only.
    let (first_id, _) = delivery_parts(&rx1.try_recv().unwrap());
    assert!(rx1.try_recv().is_ok());
    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_err());

    // After the ack the cursor moves on to consumer 2.
    assert!(queue.ack(&first_id, &ConsumerId::from("c1")));
    queue.publish("fourth job xx", false);
    assert!(rx2.try_recv().is_ok());
    assert!(rx1.try_recv().is_err());
}

#[test]
fn round_robin_rotates_across_all_consumers() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));
    queue.set_fair_dispatch(false);

    let (c1, mut rx1) = consumer("c1");
    let (c2, mut rx2) = consumer("c2");
    let (c3, mut rx3) = consumer("c3");
    queue.subscribe(c1);
    queue.subscribe(c2);
    queue.subscribe(c3);

    queue.publish("job number 1", false);
    queue.publish("job number 2", false);
    queue.publish("job number 3", false);

    // One each, no acks required.
    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_ok());
    assert!(rx3.try_recv().is_ok());
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_err());
    assert!(rx3.try_recv().is_err());
}

#[test]
fn ack_is_idempotent_and_nack_of_acked_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));
    let me = ConsumerId::from("c1");

    let (c1, mut rx1) = consumer("c1");
    queue.subscribe(c1);
    queue.publish("ack me please", false);
    let (id, _) = delivery_parts(&rx1.try_recv().unwrap());

    assert!(queue.ack(&id, &me));
    assert!(!queue.ack(&id, &me));
    assert!(!queue.nack(&id, &me));
    assert!(!queue.ack("no-such-id", &me));
}

#[test]
fn nack_returns_message_to_tail_of_pending() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));
    let me = ConsumerId::from("c1");

    let (c1, mut rx1) = consumer("c1");
    queue.subscribe(c1);
    queue.publish("rejected job", false);
    let (id, _) = delivery_parts(&rx1.try_recv().unwrap());

    assert!(queue.nack(&id, &me));
    assert!(!queue.nack(&id, &me)); // no longer in flight
    assert_eq!(queue.message_count(), 1); // back in pending, not redelivered eagerly
    assert!(rx1.try_recv().is_err());

    // A fresh subscriber drains it again.
    let (c2, mut rx2) = consumer("c2");
    queue.subscribe(c2);
    let drained = rx1.try_recv().or_else(|_| rx2.try_recv());
    assert!(drained.is_ok());
}

/// Cursor-advance asymmetry between ack and nack under fair dispatch is
/// deliberate: nack always rotates so a poison message cannot pin the queue
/// to one consumer.
#[test]
fn nack_advances_fair_cursor_to_next_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));
    let me = ConsumerId::from("c1");

    let (c1, mut rx1) = consumer("c1");
    let (c2, mut rx2) = consumer("c2");
    queue.subscribe(c1);
    queue.subscribe(c2);

    queue.publish("poison pill job", false);
    let (id, _) = delivery_parts(&rx1.try_recv().unwrap());
    assert!(queue.nack(&id, &me));

    // Next publish goes to consumer 2, not back to consumer 1.
    queue.publish("ordinary job", false);
    assert!(rx2.try_recv().is_ok());
    assert!(rx1.try_recv().is_err());
}

#[test]
fn failed_delivery_evicts_consumer_and_retries_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));

    let (c1, rx1) = consumer("c1");
    let (c2, mut rx2) = consumer("c2");
    queue.subscribe(c1);
    queue.subscribe(c2);
    drop(rx1); // consumer 1's transport is gone

    queue.publish("job seeking a live consumer", false);

    let (_, content) = delivery_parts(&rx2.try_recv().unwrap());
    assert_eq!(content, "job seeking a live consumer");
    assert_eq!(queue.consumer_count(), 1);
}

#[test]
fn delivery_failure_with_no_survivors_requeues_message() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));

    let (c1, rx1) = consumer("c1");
    let (c2, rx2) = consumer("c2");
    queue.subscribe(c1);
    queue.subscribe(c2);
    drop(rx1);
    drop(rx2);

    queue.publish("stranded job xx", false);
    assert_eq!(queue.consumer_count(), 0);
    assert_eq!(queue.message_count(), 1); // back to pending

    let (c3, mut rx3) = consumer("c3");
    queue.subscribe(c3);
    let (_, content) = delivery_parts(&rx3.try_recv().unwrap());
    assert_eq!(content, "stranded job xx");
}

#[test]
fn unsubscribe_matches_by_identity_and_resets_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let queue = MessageQueue::new("jobs", false, store_in(dir.path()));
    queue.set_fair_dispatch(false);

    let (c1, mut rx1) = consumer("c1");
    let (c2, _rx2) = consumer("c2");
    let (c3, _rx3) = consumer("c3");
    queue.subscribe(c1);
    queue.subscribe(c2);
    queue.subscribe(c3);

    // Rotate the cursor to the end of the list.
    queue.publish("rotate cursor 1", false);
    queue.publish("rotate cursor 2", false);

    assert!(queue.unsubscribe(&ConsumerId::from("c2")));
    assert!(queue.unsubscribe(&ConsumerId::from("c3")));
    assert!(!queue.unsubscribe(&ConsumerId::from("c3")));

    // Cursor was clamped; the last consumer still gets work.
    queue.publish("post-shrink job", false);
    let received: Vec<String> = std::iter::from_fn(|| rx1.try_recv().ok()).collect();
    assert!(received
        .iter()
        .any(|raw| delivery_parts(raw).1 == "post-shrink job"));
}
