use frametrace::{TraceConfig, TraceSession};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TRACE_FILENAME: &str = "end_to_end.json";

// Two worker threads doing nested work while the main thread drives frames.
fn main() -> Result<(), frametrace::TraceError> {
    let session = Arc::new(TraceSession::new(TraceConfig::default()));
    session.capture_start(TRACE_FILENAME)?;

    for frame in 0..3 {
        let _frame = session.scope("frame");

        let workers: Vec<_> = ["load", "render"]
            .iter()
            .map(|&name| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    let _work = session.scope(name);
                    for _ in 0..4 {
                        let _step = session.scope("step");
                        thread::sleep(Duration::from_micros(250 * (frame + 1)));
                    }
                })
            })
            .collect();

        for worker in workers {
            let _ = worker.join();
        }
    }

    session.capture_stop()?;
    println!("{:?}, written to {}", session.stats(), TRACE_FILENAME);
    Ok(())
}
