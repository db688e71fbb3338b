use std::time::Duration;

use clepsydra::{BlockingConsumer, LocalStorage, Rate, TokenBucket, Unit};

fn main() {
    let rate = Rate::new(10.0, Unit::Second).unwrap();
    let tb = TokenBucket::new(20, rate, LocalStorage::default()).unwrap();
    tb.bootstrap(0).unwrap();
    // after two seconds bucket should be full
    std::thread::sleep(Duration::from_secs(2));
    assert!(tb.consume(5).unwrap().is_granted());
    println!("consumed 5, available: {}", tb.tokens().unwrap());

    let limited = tb.consume(20).unwrap();
    println!("asking for 20 more: wait {:?}", limited.wait_time());

    let consumer = BlockingConsumer::with_timeout(tb, Duration::from_secs(3));
    consumer.consume(20).unwrap();
    println!("consumed 20 after waiting");
}
