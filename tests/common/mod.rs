//! Shared helpers for integration tests
#![allow(dead_code)]

use image_classifier_node::{EnginePool, ImageClassifier, InferenceEngine, LabelSet, TempArtifactStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// What a scripted engine does when asked to predict
#[derive(Clone, Debug)]
pub enum Behavior {
    Scores(Vec<f32>),
    Fail,
    Panic,
}

/// Counters shared by every engine in a pool
#[derive(Default)]
pub struct EngineStats {
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    /// Set if a slot ever observed a second caller while busy
    pub double_assignment: AtomicBool,
    /// Paths seen by the engine, with whether the file existed at call time
    pub seen: Mutex<Vec<(PathBuf, bool)>>,
    /// Whether the file still existed when each call finished
    pub existed_at_end: Mutex<Vec<bool>>,
    pub slots_used: Mutex<Vec<usize>>,
}

pub struct ScriptedEngine {
    slot: usize,
    busy: AtomicBool,
    delay: Duration,
    behavior: Behavior,
    stats: Arc<EngineStats>,
}

impl ScriptedEngine {
    pub fn new(slot: usize, delay: Duration, behavior: Behavior, stats: Arc<EngineStats>) -> Self {
        Self {
            slot,
            busy: AtomicBool::new(false),
            delay,
            behavior,
            stats,
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    fn predict(&mut self, image_path: &Path) -> anyhow::Result<Vec<f32>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.stats.double_assignment.store(true, Ordering::SeqCst);
        }
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .seen
            .lock()
            .unwrap()
            .push((image_path.to_path_buf(), image_path.exists()));
        self.stats.slots_used.lock().unwrap().push(self.slot);

        std::thread::sleep(self.delay);
        self.stats.existed_at_end.lock().unwrap().push(image_path.exists());

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Scores(scores) => Ok(scores.clone()),
            Behavior::Fail => anyhow::bail!("corrupt image"),
            Behavior::Panic => panic!("engine fault"),
        }
    }
}

pub fn scripted_pool(
    size: usize,
    delay: Duration,
    behavior: Behavior,
    timeout: Option<Duration>,
) -> (EnginePool<ScriptedEngine>, Arc<EngineStats>) {
    let stats = Arc::new(EngineStats::default());
    let pool = EnginePool::from_factory(size, timeout, |slot| {
        Ok(ScriptedEngine::new(slot, delay, behavior.clone(), stats.clone()))
    })
    .unwrap();
    (pool, stats)
}

pub fn flower_labels() -> Arc<LabelSet> {
    Arc::new(LabelSet::from_labels(["daisy", "dandelion", "roses", "sunflowers", "tulips"]))
}

pub fn scripted_classifier(
    dir: &TempDir,
    size: usize,
    delay: Duration,
    behavior: Behavior,
) -> (ImageClassifier<ScriptedEngine>, Arc<EngineStats>) {
    let (pool, stats) = scripted_pool(size, delay, behavior, None);
    let classifier = ImageClassifier::new(TempArtifactStore::new(dir.path()), pool, flower_labels());
    (classifier, stats)
}

pub fn dir_entries(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}
