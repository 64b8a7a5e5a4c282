//! Budgeted asynchronous preloading.
//!
//! A [`Preloader`] resolves a set of resource paths over several ticks. The
//! owner polls it once per tick with a time budget; when everything is
//! resident the completion closure runs inside that same `poll` call, on the
//! tick thread, and acquires whatever the owner wants to keep.
//!
//! [`ResourcePreloader`] works in two phases. The fetch phase reads bytes from
//! the source and follows each loader's [`preload_hints`] to discover
//! dependencies; it either runs incrementally inside `poll` or, when a tokio
//! runtime handle is supplied, on a blocking worker thread. The create phase
//! always runs inside `poll`, dependencies first, so no resource is ever
//! created off the tick thread.
//!
//! [`preload_hints`]: crate::ResourceLoader::preload_hints

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use engine_component::NameHash;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::factory::ResourceFactory;
use crate::handle::ResourceHandle;

/// Outcome of one [`Preloader::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadResult {
    /// Work remains.
    Pending,
    /// Every path is resident and the completion closure succeeded.
    Ok,
    /// Loading or completion failed. Nothing the preloader created is kept.
    Error(ResourceError),
}

impl PreloadResult {
    /// Returns `true` for [`PreloadResult::Pending`].
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Runs once, inside `poll`, when every requested path is resident.
pub type PreloadComplete<'a> = dyn FnMut(&ResourceFactory) -> Result<(), ResourceError> + 'a;

/// A set of resources being loaded.
///
/// Dropping a preloader cancels it and releases every reference it holds.
pub trait Preloader: Send {
    /// Advance loading for at most `budget`, doing at least one unit of work.
    ///
    /// Once a non-pending result has been returned, further polls return the
    /// same result without running `on_complete` again.
    fn poll(&mut self, on_complete: &mut PreloadComplete<'_>, budget: Duration) -> PreloadResult;
}

/// Creates preloaders. Lives in the subsystem context so tests can script
/// preload timing.
pub trait PreloaderFactory: Send + Sync {
    /// Start loading `paths` into `store`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::OutOfResources`] if the store cannot take any
    /// more resources.
    fn create(
        &self,
        store: &Arc<ResourceFactory>,
        paths: Vec<String>,
    ) -> Result<Box<dyn Preloader>, ResourceError>;
}

/// Creates [`ResourcePreloader`]s, backed by a runtime when one is given.
#[derive(Debug, Clone, Default)]
pub struct DefaultPreloaderFactory {
    runtime: Option<Handle>,
}

impl DefaultPreloaderFactory {
    /// Preloaders that fetch incrementally inside `poll`.
    #[must_use]
    pub fn incremental() -> Self {
        Self { runtime: None }
    }

    /// Preloaders that fetch on blocking worker threads of `runtime`.
    #[must_use]
    pub fn background(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
        }
    }
}

impl PreloaderFactory for DefaultPreloaderFactory {
    fn create(
        &self,
        store: &Arc<ResourceFactory>,
        paths: Vec<String>,
    ) -> Result<Box<dyn Preloader>, ResourceError> {
        if store.is_full() {
            return Err(ResourceError::OutOfResources(store.resource_count()));
        }
        let preloader = match &self.runtime {
            Some(runtime) => ResourcePreloader::background(Arc::clone(store), paths, runtime),
            None => ResourcePreloader::incremental(Arc::clone(store), paths),
        };
        Ok(Box::new(preloader))
    }
}

/// Bytes fetched for one path, `None` if it was already resident.
type Fetched = (String, Option<Vec<u8>>);

/// Discovers and reads every path reachable from the requested ones.
struct Fetcher {
    queue: VecDeque<String>,
    seen: HashSet<NameHash>,
    fetched: Vec<Fetched>,
}

impl Fetcher {
    fn new(paths: Vec<String>) -> Self {
        let mut fetcher = Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            fetched: Vec::new(),
        };
        for path in paths {
            fetcher.push(path);
        }
        fetcher
    }

    fn push(&mut self, path: String) {
        if !path.is_empty() && self.seen.insert(NameHash::of(&path)) {
            self.queue.push_back(path);
        }
    }

    fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    /// Fetch the next queued path.
    fn step(&mut self, store: &ResourceFactory) -> Result<(), ResourceError> {
        let Some(path) = self.queue.pop_front() else {
            return Ok(());
        };
        if store.is_resident(&path) {
            self.fetched.push((path, None));
            return Ok(());
        }
        let loader = store.loader_for(&path)?;
        let bytes = store.source().read(&path)?;
        for hint in loader.preload_hints(&path, &bytes) {
            self.push(hint);
        }
        self.fetched.push((path, Some(bytes)));
        Ok(())
    }

    fn run_to_end(mut self, store: &ResourceFactory) -> Result<Vec<Fetched>, ResourceError> {
        while !self.is_done() {
            self.step(store)?;
        }
        Ok(self.fetched)
    }
}

enum Phase {
    Fetching(Fetcher),
    Waiting(oneshot::Receiver<Result<Vec<Fetched>, ResourceError>>),
    /// Paths still to create, dependencies last in the vector.
    Creating(Vec<Fetched>),
    Done(PreloadResult),
}

/// The default [`Preloader`].
pub struct ResourcePreloader {
    store: Arc<ResourceFactory>,
    phase: Phase,
    created: Vec<ResourceHandle>,
}

impl ResourcePreloader {
    /// A preloader that does all of its work inside `poll`.
    #[must_use]
    pub fn incremental(store: Arc<ResourceFactory>, paths: Vec<String>) -> Self {
        Self {
            store,
            phase: Phase::Fetching(Fetcher::new(paths)),
            created: Vec::new(),
        }
    }

    /// A preloader that reads bytes on a blocking worker of `runtime`.
    #[must_use]
    pub fn background(store: Arc<ResourceFactory>, paths: Vec<String>, runtime: &Handle) -> Self {
        let (tx, rx) = oneshot::channel();
        let worker_store = Arc::clone(&store);
        runtime.spawn_blocking(move || {
            let fetched = Fetcher::new(paths).run_to_end(&worker_store);
            // The receiver is gone if the preloader was dropped.
            let _ = tx.send(fetched);
        });
        Self {
            store,
            phase: Phase::Waiting(rx),
            created: Vec::new(),
        }
    }

    fn fail(&mut self, error: ResourceError) -> PreloadResult {
        warn!(%error, "preload failed");
        self.store.release_all(self.created.drain(..));
        let result = PreloadResult::Error(error);
        self.phase = Phase::Done(result.clone());
        result
    }

    /// One unit of work. Returns `Some` when `poll` should return.
    fn step(&mut self, on_complete: &mut PreloadComplete<'_>) -> Option<PreloadResult> {
        match &mut self.phase {
            Phase::Done(result) => Some(result.clone()),
            Phase::Fetching(fetcher) => {
                if let Err(e) = fetcher.step(&self.store) {
                    return Some(self.fail(e));
                }
                if fetcher.is_done() {
                    let fetched = std::mem::take(&mut fetcher.fetched);
                    debug!(resources = fetched.len(), "preload fetch finished");
                    self.phase = Phase::Creating(fetched);
                }
                None
            }
            Phase::Waiting(rx) => match rx.try_recv() {
                Ok(Ok(fetched)) => {
                    debug!(resources = fetched.len(), "preload fetch finished");
                    self.phase = Phase::Creating(fetched);
                    None
                }
                Ok(Err(e)) => Some(self.fail(e)),
                Err(oneshot::error::TryRecvError::Empty) => Some(PreloadResult::Pending),
                Err(oneshot::error::TryRecvError::Closed) => Some(self.fail(
                    ResourceError::Completion("preload worker stopped".to_string()),
                )),
            },
            Phase::Creating(remaining) => {
                let Some((path, bytes)) = remaining.pop() else {
                    return Some(self.complete(on_complete));
                };
                let created = match bytes {
                    Some(bytes) => self.store.acquire_with_bytes(&path, &bytes),
                    None => self.store.acquire(&path),
                };
                match created {
                    Ok(handle) => {
                        self.created.push(handle);
                        None
                    }
                    Err(e) => Some(self.fail(e)),
                }
            }
        }
    }

    fn complete(&mut self, on_complete: &mut PreloadComplete<'_>) -> PreloadResult {
        match on_complete(&self.store) {
            Ok(()) => {
                let result = PreloadResult::Ok;
                self.phase = Phase::Done(result.clone());
                result
            }
            Err(e) => self.fail(e),
        }
    }
}

impl Preloader for ResourcePreloader {
    fn poll(&mut self, on_complete: &mut PreloadComplete<'_>, budget: Duration) -> PreloadResult {
        let start = Instant::now();
        loop {
            if let Some(result) = self.step(on_complete) {
                return result;
            }
            if start.elapsed() >= budget {
                return PreloadResult::Pending;
            }
        }
    }
}

impl Drop for ResourcePreloader {
    fn drop(&mut self) {
        self.store.release_all(self.created.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::loader::{DescriptorLoader, LoadedResource, ResourceLoader, decode_descriptor};
    use crate::source::MemorySource;

    #[derive(Debug, Deserialize)]
    struct Leaf {}

    #[derive(Debug, Deserialize)]
    struct Node {
        children: Vec<String>,
    }

    struct NodeLoader;

    impl ResourceLoader for NodeLoader {
        fn extension(&self) -> &'static str {
            "node"
        }

        fn preload_hints(&self, path: &str, bytes: &[u8]) -> Vec<String> {
            decode_descriptor::<Node>(path, bytes)
                .map(|node| node.children)
                .unwrap_or_default()
        }

        fn create(
            &self,
            store: &ResourceFactory,
            path: &str,
            bytes: &[u8],
        ) -> Result<LoadedResource, ResourceError> {
            let node: Node = decode_descriptor(path, bytes)?;
            let mut acquired = Vec::new();
            for child in &node.children {
                match store.acquire(child) {
                    Ok(handle) => acquired.push(handle),
                    Err(e) => {
                        store.release_all(acquired);
                        return Err(e);
                    }
                }
            }
            Ok(LoadedResource::new(node).with_dependencies(acquired))
        }
    }

    fn store() -> Arc<ResourceFactory> {
        let source = MemorySource::new();
        source.insert("/root.node", r#"{"children":["/a.leaf","/mid.node"]}"#);
        source.insert("/mid.node", r#"{"children":["/b.leaf"]}"#);
        source.insert("/a.leaf", "{}");
        source.insert("/b.leaf", "{}");
        source.insert("/broken.node", r#"{"children":["/missing.leaf"]}"#);
        Arc::new(
            ResourceFactory::new(Arc::new(source))
                .with_loader(Arc::new(NodeLoader))
                .with_loader(Arc::new(DescriptorLoader::<Leaf>::new("leaf"))),
        )
    }

    fn poll_to_end(
        preloader: &mut dyn Preloader,
        keep: &mut Vec<ResourceHandle>,
        path: &str,
    ) -> (PreloadResult, usize) {
        let mut polls = 0;
        loop {
            polls += 1;
            let mut on_complete = |store: &ResourceFactory| {
                keep.push(store.acquire(path)?);
                Ok(())
            };
            let result = preloader.poll(&mut on_complete, Duration::ZERO);
            if !result.is_pending() {
                return (result, polls);
            }
            assert!(polls < 1000, "preloader never finished");
        }
    }

    #[test]
    fn test_incremental_resolves_dependencies() {
        let store = store();
        let mut preloader = ResourcePreloader::incremental(Arc::clone(&store), vec!["/root.node".to_string()]);
        let mut keep = Vec::new();

        let (result, polls) = poll_to_end(&mut preloader, &mut keep, "/root.node");
        assert_eq!(result, PreloadResult::Ok);
        // A zero budget still does one unit of work per poll.
        assert!(polls > 1);
        // Held by the preloader and by the node that references it.
        assert_eq!(store.ref_count("/b.leaf"), 2);
        assert_eq!(store.ref_count("/root.node"), 2);

        drop(preloader);
        assert_eq!(store.ref_count("/root.node"), 1);
        store.release_all(keep);
        assert_eq!(store.resource_count(), 0);
    }

    #[test]
    fn test_result_is_sticky() {
        let store = store();
        let mut preloader = ResourcePreloader::incremental(Arc::clone(&store), vec!["/a.leaf".to_string()]);
        let mut keep = Vec::new();
        let (result, _) = poll_to_end(&mut preloader, &mut keep, "/a.leaf");
        assert_eq!(result, PreloadResult::Ok);

        let mut calls = 0;
        let mut on_complete = |_: &ResourceFactory| {
            calls += 1;
            Ok(())
        };
        assert_eq!(preloader.poll(&mut on_complete, Duration::from_millis(10)), PreloadResult::Ok);
        assert_eq!(calls, 0);
        drop(preloader);
        store.release_all(keep);
    }

    #[test]
    fn test_missing_dependency_fails_without_leaks() {
        let store = store();
        let mut preloader = ResourcePreloader::incremental(Arc::clone(&store), vec!["/broken.node".to_string()]);
        let mut keep = Vec::new();

        let (result, _) = poll_to_end(&mut preloader, &mut keep, "/broken.node");
        assert_eq!(
            result,
            PreloadResult::Error(ResourceError::NotFound("/missing.leaf".to_string()))
        );
        assert!(keep.is_empty());
        assert_eq!(store.resource_count(), 0);
    }

    #[test]
    fn test_failed_completion_releases_created() {
        let store = store();
        let mut preloader = ResourcePreloader::incremental(Arc::clone(&store), vec!["/mid.node".to_string()]);
        let mut on_complete =
            |_: &ResourceFactory| Err(ResourceError::Completion("rejected".to_string()));

        let result = loop {
            let result = preloader.poll(&mut on_complete, Duration::from_millis(50));
            if !result.is_pending() {
                break result;
            }
        };
        assert!(matches!(result, PreloadResult::Error(ResourceError::Completion(_))));
        assert_eq!(store.resource_count(), 0);
    }

    #[test]
    fn test_drop_mid_load_restores_baseline() {
        let store = store();
        let baseline = store.acquire("/a.leaf").unwrap();
        let mut preloader = ResourcePreloader::incremental(Arc::clone(&store), vec!["/root.node".to_string()]);

        let mut on_complete = |_: &ResourceFactory| Ok(());
        // Fetch four paths, then create a couple before cancelling.
        for _ in 0..6 {
            assert!(preloader.poll(&mut on_complete, Duration::ZERO).is_pending());
        }
        assert!(store.resource_count() > 1);

        drop(preloader);
        assert_eq!(store.resource_count(), 1);
        assert_eq!(store.ref_count("/a.leaf"), 1);
        store.release(baseline);
    }

    #[test]
    fn test_background_fetch() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let store = store();
        let factory = DefaultPreloaderFactory::background(runtime.handle().clone());
        let mut preloader = factory.create(&store, vec!["/root.node".to_string()]).unwrap();
        let mut keep = Vec::new();

        let result = loop {
            let mut on_complete = |store: &ResourceFactory| {
                keep.push(store.acquire("/root.node")?);
                Ok(())
            };
            let result = preloader.poll(&mut on_complete, Duration::from_millis(1));
            if !result.is_pending() {
                break result;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(result, PreloadResult::Ok);
        drop(preloader);
        assert_eq!(store.ref_count("/root.node"), 1);
        store.release_all(keep);
        assert_eq!(store.resource_count(), 0);
    }

    #[test]
    fn test_factory_rejects_full_store() {
        let source = MemorySource::new();
        source.insert("/a.leaf", "{}");
        let store = Arc::new(
            ResourceFactory::new(Arc::new(source))
                .with_loader(Arc::new(DescriptorLoader::<Leaf>::new("leaf")))
                .with_max_resources(1),
        );
        let held = store.acquire("/a.leaf").unwrap();
        let factory = DefaultPreloaderFactory::incremental();
        assert!(matches!(
            factory.create(&store, vec!["/a.leaf".to_string()]),
            Err(ResourceError::OutOfResources(_))
        ));
        store.release(held);
    }
}
