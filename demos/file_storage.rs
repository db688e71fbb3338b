use std::time::{Duration, Instant};

use clepsydra::{BlockingConsumer, FileStorage, Rate, TokenBucket, Unit};

const WORKERS: usize = 4;

fn main() {
    let dir = std::env::temp_dir().join("clepsydra-demo");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bucket");

    // every worker opens its own handle, as separate processes would
    let rate = Rate::new(20.0, Unit::Second).unwrap();
    let tb = TokenBucket::new(5, rate, FileStorage::open(&path).unwrap()).unwrap();
    tb.bootstrap(5).unwrap();

    let start = Instant::now();
    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let path = path.clone();
            std::thread::spawn(move || {
                let storage = FileStorage::open(&path).unwrap();
                let tb = TokenBucket::new(5, rate, storage).unwrap();
                let consumer = BlockingConsumer::with_timeout(tb, Duration::from_secs(10));
                for _ in 0..10 {
                    consumer.consume(1).unwrap();
                }
                println!("worker {worker} done after {:?}", start.elapsed());
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    // 40 tokens at 20 per second, 5 of them up front
    println!("all done after {:?}", start.elapsed());
    std::fs::remove_file(&path).unwrap();
}
