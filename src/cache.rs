// cache.rs - tile fetching and the per-session tile cache
//
// Fetches run on a small worker pool and report back over a channel; the
// event-loop thread drains completions with `TileCache::poll`. Every URL is
// fetched at most once while it is cached or in flight.

use crate::error::TileError;
use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Where tile images come from.
pub trait TileSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<RgbaImage, TileError>;
}

/// `http(s)://` URLs go over the network, anything else is read from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTileSource;

impl DefaultTileSource {
    fn read_bytes(url: &str) -> Result<Vec<u8>, TileError> {
        let fetch_err = |reason: String| TileError::Fetch { url: url.to_string(), reason };

        if url.starts_with("http://") || url.starts_with("https://") {
            let resp = ureq::get(url).call().map_err(|e| fetch_err(e.to_string()))?;
            let mut bytes = Vec::new();
            resp.into_reader()
                .read_to_end(&mut bytes)
                .map_err(|e| fetch_err(e.to_string()))?;
            Ok(bytes)
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            std::fs::read(path).map_err(|e| fetch_err(e.to_string()))
        }
    }
}

impl TileSource for DefaultTileSource {
    fn fetch(&self, url: &str) -> Result<RgbaImage, TileError> {
        let bytes = Self::read_bytes(url)?;
        decode_tile(url, &bytes)
    }
}

pub fn decode_tile(url: &str, bytes: &[u8]) -> Result<RgbaImage, TileError> {
    let decode_err = |reason: String| TileError::Decode { url: url.to_string(), reason };
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map(|img| img.to_rgba8())
        .map_err(|e| decode_err(e.to_string()))
}

/// Result of one fetch, reported exactly once.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub url: String,
    pub result: Result<Arc<RgbaImage>, TileError>,
}

struct Job {
    url: String,
    reply: Sender<FetchCompletion>,
}

enum Dispatch {
    Pool { jobs: Sender<Job>, _threads: Vec<thread::JoinHandle<()>> },
    Inline,
}

/// Executes tile fetches against a `TileSource`.
pub struct TileWorkers {
    source: Arc<dyn TileSource>,
    dispatch: Dispatch,
}

impl TileWorkers {
    /// Fixed pool of `count` fetch threads.
    pub fn spawn(source: Arc<dyn TileSource>, count: usize) -> Self {
        let (jobs, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let threads = (0..count.max(1))
            .map(|i| {
                let rx = Arc::clone(&rx);
                let source = Arc::clone(&source);
                thread::Builder::new()
                    .name(format!("tile-fetch-{i}"))
                    .spawn(move || worker_loop(rx, source))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("failed to spawn tile worker: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();

        if threads.is_empty() {
            log::warn!("no tile worker threads available, fetching inline");
            return Self::inline(source);
        }

        Self { source, dispatch: Dispatch::Pool { jobs, _threads: threads } }
    }

    /// Run each fetch on the calling thread at dispatch time. The completion
    /// still waits in the channel until the cache is polled.
    pub fn inline(source: Arc<dyn TileSource>) -> Self {
        Self { source, dispatch: Dispatch::Inline }
    }

    fn submit(&self, url: String, reply: Sender<FetchCompletion>) {
        match &self.dispatch {
            Dispatch::Pool { jobs, .. } => {
                if let Err(failed) = jobs.send(Job { url, reply }) {
                    let Job { url, reply } = failed.0;
                    let _ = reply.send(FetchCompletion {
                        result: Err(TileError::WorkersGone { url: url.clone() }),
                        url,
                    });
                }
            }
            Dispatch::Inline => {
                let result = self.source.fetch(&url).map(Arc::new);
                let _ = reply.send(FetchCompletion { url, result });
            }
        }
    }
}

fn worker_loop(jobs: Arc<Mutex<Receiver<Job>>>, source: Arc<dyn TileSource>) {
    loop {
        let job = {
            let Ok(rx) = jobs.lock() else { return };
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };
        let result = source.fetch(&job.url).map(Arc::new);
        if job.reply.send(FetchCompletion { url: job.url, result }).is_err() {
            return;
        }
    }
}

/// Outcome of asking the cache for a tile.
#[derive(Debug, Clone)]
pub enum TileLookup {
    Ready(Arc<RgbaImage>),
    Pending,
}

/// Memoised tile images keyed by fully resolved URL. No eviction: entries
/// live as long as the viewer session.
pub struct TileCache {
    workers: TileWorkers,
    tiles: HashMap<String, Arc<RgbaImage>>,
    in_flight: HashSet<String>,
    done_tx: Sender<FetchCompletion>,
    done_rx: Receiver<FetchCompletion>,
    fetches_dispatched: usize,
}

impl TileCache {
    pub fn new(workers: TileWorkers) -> Self {
        let (done_tx, done_rx) = channel();
        Self {
            workers,
            tiles: HashMap::new(),
            in_flight: HashSet::new(),
            done_tx,
            done_rx,
            fetches_dispatched: 0,
        }
    }

    /// Resolve a tile. The first request for an uncached URL starts a fetch;
    /// later requests for the same URL join it.
    pub fn load_tile(&mut self, url: &str) -> TileLookup {
        if let Some(img) = self.tiles.get(url) {
            return TileLookup::Ready(Arc::clone(img));
        }
        if self.in_flight.insert(url.to_string()) {
            self.fetches_dispatched += 1;
            log::debug!("fetching tile {url}");
            self.workers.submit(url.to_string(), self.done_tx.clone());
        }
        TileLookup::Pending
    }

    pub fn get(&self, url: &str) -> Option<Arc<RgbaImage>> {
        self.tiles.get(url).cloned()
    }

    /// Drain finished fetches without blocking.
    pub fn poll(&mut self) -> Vec<FetchCompletion> {
        let mut done = Vec::new();
        while let Ok(completion) = self.done_rx.try_recv() {
            done.push(self.record(completion));
        }
        done
    }

    /// Block up to `timeout` for at least one completion, then drain the rest.
    pub fn wait(&mut self, timeout: Duration) -> Vec<FetchCompletion> {
        if self.in_flight.is_empty() {
            return self.poll();
        }
        match self.done_rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut done = vec![self.record(first)];
                done.extend(self.poll());
                done
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }

    fn record(&mut self, completion: FetchCompletion) -> FetchCompletion {
        self.in_flight.remove(&completion.url);
        match &completion.result {
            Ok(img) => {
                // First insert wins; every waiter resolves to the same image.
                let cached = self
                    .tiles
                    .entry(completion.url.clone())
                    .or_insert_with(|| Arc::clone(img));
                FetchCompletion { url: completion.url, result: Ok(Arc::clone(cached)) }
            }
            Err(e) => {
                log::warn!("{e}");
                completion
            }
        }
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.tiles.contains_key(url)
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(url)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn fetches_dispatched(&self) -> usize {
        self.fetches_dispatched
    }
}
