use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use basedrop::{Collector, Shared, SharedCell};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use lazy_static::lazy_static;

use crate::{
    resampler::{
        interpolator::InterpPack,
        mipmap::{mip_map_fir, MipMap},
    },
    wavetable::{NUM_MIP_LEVELS, REPLICATED_TABLE_SAMPLES},
};

// -------------------------------------------------------------------------------------------------

pub mod blend;

// -------------------------------------------------------------------------------------------------

/// How often the worker polls for new slot data.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long the slot has to sit untouched before the worker starts
/// building. Load shedding: commits arriving in a burst collapse into a
/// single build.
const DEBOUNCE_MS: u64 = 60;

// -------------------------------------------------------------------------------------------------

/// State shared between the builder front end and its worker thread.
struct BuilderState {
    /// The single producer slot, sized `tripled_len`. Only ever touched by
    /// the producer and the worker, never by the audio thread.
    slot: Mutex<Vec<f32>>,
    slot_ready: AtomicBool,
    last_touch_ms: AtomicU64,
    building: AtomicBool,
    /// The most recently published mipmap. Readers get their own owning
    /// handle; retired maps are reclaimed on the worker thread once the
    /// last handle drops.
    active: SharedCell<MipMap>,
    epoch: Instant,
    tripled_len: usize,
    num_levels: usize,
}

// -------------------------------------------------------------------------------------------------

/// Background builder turning committed (triple-replicated) wavetable data
/// into ready-to-use [`MipMap`]s, published lock-free.
///
/// The producer writes into [`Self::write_slot`] and calls
/// [`Self::commit_slot`]; a background worker thread picks the data up
/// after a debounce interval, builds the pyramid and publishes it with a
/// single atomic pointer swap. Audio threads read [`Self::current`] at
/// block starts: the handle they get keeps the map alive for as long as
/// they hold it, so a publication can never pull a table out from under a
/// running voice.
///
/// [`Self::global`] returns the process-wide instance configured for the
/// standard wavetable layout; separate instances can be created for other
/// layouts or for isolation.
pub struct TableBuilder {
    state: Arc<BuilderState>,
    shutdown_send: Sender<()>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TableBuilder {
    /// Create a builder for sources of `tripled_len` samples with
    /// `num_levels` mipmap levels, and start its worker thread.
    pub fn new(tripled_len: usize, num_levels: usize) -> Self {
        let collector = Collector::new();
        let state = Arc::new(BuilderState {
            slot: Mutex::new(vec![0.0; tripled_len]),
            slot_ready: AtomicBool::new(false),
            last_touch_ms: AtomicU64::new(0),
            building: AtomicBool::new(false),
            active: SharedCell::new(Shared::new(&collector.handle(), MipMap::default())),
            epoch: Instant::now(),
            tripled_len,
            num_levels,
        });

        let (shutdown_send, shutdown_recv) = bounded(1);
        let worker_state = Arc::clone(&state);
        let worker = thread::spawn(move || worker_loop(collector, worker_state, shutdown_recv));

        Self {
            state,
            shutdown_send,
            worker: Some(worker),
        }
    }

    /// The process-wide builder for the standard wavetable layout.
    pub fn global() -> Arc<TableBuilder> {
        GLOBAL_BUILDER.clone()
    }

    /// Producer access to the internal slot buffer. The lock is only ever
    /// contended by the worker, never by audio threads.
    pub fn write_slot(&self) -> MutexGuard<'_, Vec<f32>> {
        self.state.slot.lock().unwrap()
    }

    /// Publish the slot contents. The worker starts building once no
    /// further commit has arrived for the debounce interval.
    pub fn commit_slot(&self) {
        let now_ms = self.state.epoch.elapsed().as_millis() as u64;
        self.state.last_touch_ms.store(now_ms, Ordering::Release);
        self.state.slot_ready.store(true, Ordering::Release);
    }

    /// The most recently published mipmap. Before the first publication
    /// this is an empty map that is not [`MipMap::is_ready`]. Real-time
    /// safe.
    pub fn current(&self) -> Shared<MipMap> {
        self.state.active.get()
    }

    /// Is the worker currently building a mipmap?
    pub fn is_building(&self) -> bool {
        self.state.building.load(Ordering::Acquire)
    }

    /// Source length, in samples, of the tables this builder produces.
    pub fn tripled_len(&self) -> usize {
        self.state.tripled_len
    }

    /// Number of mipmap levels this builder produces.
    pub fn num_levels(&self) -> usize {
        self.state.num_levels
    }
}

impl Drop for TableBuilder {
    fn drop(&mut self) {
        let _ = self.shutdown_send.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn worker_loop(mut collector: Collector, state: Arc<BuilderState>, shutdown: Receiver<()>) {
    let kernel = mip_map_fir();
    loop {
        match shutdown.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        // reclaim mipmaps whose last reader handle has dropped
        collector.collect();

        if !state.slot_ready.load(Ordering::Acquire) {
            continue;
        }
        let now_ms = state.epoch.elapsed().as_millis() as u64;
        let last_touch = state.last_touch_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last_touch) < DEBOUNCE_MS {
            // the producer is still editing, defer the build
            continue;
        }

        state.slot_ready.store(false, Ordering::Release);
        state.building.store(true, Ordering::Release);

        let mut mip_map = MipMap::new(
            state.tripled_len,
            InterpPack::len_pre(),
            InterpPack::len_post(),
            state.num_levels,
            &kernel,
        );
        let filled = {
            let slot = state.slot.lock().unwrap();
            mip_map.fill(&slot)
        };
        match filled {
            Ok(_) => {
                state
                    .active
                    .set(Shared::new(&collector.handle(), mip_map));
                log::debug!(
                    "published a new wavetable mipmap ({} levels)",
                    state.num_levels
                );
            }
            Err(err) => log::error!("wavetable mipmap build failed: {err}"),
        }

        state.building.store(false, Ordering::Release);
    }
    collector.collect();
}

// -------------------------------------------------------------------------------------------------

lazy_static! {
    static ref GLOBAL_BUILDER: Arc<TableBuilder> =
        Arc::new(TableBuilder::new(REPLICATED_TABLE_SAMPLES, NUM_MIP_LEVELS));
}

// -------------------------------------------------------------------------------------------------
