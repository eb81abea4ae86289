use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use logstore_queue::metrics;
use logstore_queue::utils::file_io::open_file_for_append;
use logstore_queue::utils::time::get_now_as_u64;
use logstore_queue::FairnessCursor;
use logstore_queue::LogBatch;
use logstore_queue::LogstoreKey;
use logstore_queue::Offer;
use logstore_queue::Pipeline;
use logstore_queue::Result;
use logstore_queue::Settings;
use rand::Rng;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Logstores the synthetic producer writes to
const SYNTHETIC_LOGSTORES: u64 = 8;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::load(None)?;

    // Initializing Logs
    let _guard = init_observability(settings.log.log_dir.as_deref())?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let pipeline = Arc::new(Pipeline::new(&settings)?);
    pipeline.start()?;

    let sending = Arc::new(AtomicBool::new(true));
    let sender = {
        let pipeline = pipeline.clone();
        let sending = sending.clone();
        tokio::task::spawn_blocking(move || run_sender(&pipeline, &sending))
    };
    let producer = tokio::spawn(run_producer(pipeline.clone(), graceful_rx));

    info!("Application started. Waiting for CTRL+C signal...");
    if let Err(e) = graceful_shutdown(graceful_tx).await {
        error!("Failed to shutdown: {:?}", e);
    }

    if let Err(e) = producer.await {
        error!("producer stopped abnormally: {:?}", e);
    }
    pipeline.shutdown()?;
    sending.store(false, Ordering::Release);
    match sender.await {
        Ok(sent) => info!("sender stopped after {} batches", sent),
        Err(e) => error!("sender stopped abnormally: {:?}", e),
    }

    info!("final status: {:?}", pipeline.status());
    info!("metrics:\n{}", metrics::render());
    println!("Exiting program.");
    Ok(())
}

/// Offers one synthetic batch per tick until shutdown is signalled.
async fn run_producer(
    pipeline: Arc<Pipeline>,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(5));
    let mut offsets = vec![0u64; SYNTHETIC_LOGSTORES as usize];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("producer stopping");
                return;
            }
            _ = ticker.tick() => {
                let (logstore, lines) = {
                    let mut rng = rand::thread_rng();
                    let logstore = rng.gen_range(0..SYNTHETIC_LOGSTORES);
                    let lines: Vec<String> = (0..rng.gen_range(1..16))
                        .map(|i| format!("synthetic line {} of logstore {}\n", i, logstore))
                        .collect();
                    (logstore, lines)
                };

                let offset = &mut offsets[logstore as usize];
                let batch = LogBatch::new(
                    LogstoreKey::new(logstore),
                    format!("/var/log/synthetic/{}.log", logstore),
                    *offset,
                    lines,
                );
                let read = batch.byte_len() as u64;

                match pipeline.offer(batch, get_now_as_u64()) {
                    Offer::Queued => *offset += read,
                    Offer::Blocked => {
                        debug!("logstore {} is backpressured", logstore);
                        *offset += read;
                    }
                    // not consumed: the same offset is read again next time
                    Offer::Rejected(_) => {
                        debug!("logstore {} is full, holding at offset {}", logstore, offset);
                    }
                }
            }
        }
    }
}

/// Stands in for the network sender: drains the sender stage at a fixed
/// pace so that backpressure builds up under load.
fn run_sender(
    pipeline: &Pipeline,
    sending: &AtomicBool,
) -> usize {
    let mut cursor: FairnessCursor = None;
    let mut sent = 0;
    while sending.load(Ordering::Acquire) {
        match pipeline.pop_sendable(&mut cursor) {
            Some((key, batch)) => {
                debug!(
                    "sent {} lines ({} bytes) to logstore {}",
                    batch.line_count(),
                    batch.byte_len(),
                    key
                );
                sent += 1;
                std::thread::sleep(Duration::from_millis(10));
            }
            None => {
                pipeline.wait_sendable(Duration::from_millis(100));
            }
        }
    }
    sent
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    if let Err(e) = graceful_tx.send(()) {
        error!("Failed to send shutdown signal: {}", e);
    }
    Ok(())
}

/// Logs go to `<log_dir>/logq.log` when a directory is configured, to
/// stdout otherwise.
pub fn init_observability(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    match log_dir {
        Some(log_dir) => {
            let log_file = open_file_for_append(&log_dir.join("logq.log"))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env());
            tracing_subscriber::registry().with(file_layer).init();
            Ok(Some(guard))
        }
        None => {
            let stdout_layer = tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_filter(EnvFilter::from_default_env());
            tracing_subscriber::registry().with(stdout_layer).init();
            Ok(None)
        }
    }
}
