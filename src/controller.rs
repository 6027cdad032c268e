use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::decoder::{Decode, DecodeError, DisplayBuffer, ViewportSize};
use crate::pick::spawn_copy;
use crate::prefetch::{PrefetchCache, Side, Waker};
use crate::session::{Session, SessionStore};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("no images found")]
    EmptyCatalog,
    /// The move (or resize) still happened; the current image shows a placeholder.
    #[error("image {} could not be shown: {source}", .index + 1)]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },
}

/// A request from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Next,
    Prev,
    Pick,
    Resize(ViewportSize),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Moved { index: usize, cache_hit: bool },
    /// Already at the first or last image; nothing changed.
    Boundary,
    Resized,
    Picked,
    Quit,
    /// The viewer has quit; the intent was ignored.
    Closed,
}

/// What is on screen for the current index.
#[derive(Debug)]
enum Current {
    Ready(DisplayBuffer),
    Failed(String),
}

pub struct ViewerOptions {
    pub output_dir: PathBuf,
    pub start_index: usize,
    pub viewport: ViewportSize,
    pub store: Option<SessionStore>,
}

/// Owns the navigation index, the current buffer and the prefetch window.
pub struct ViewerController<D: Decode> {
    catalog: Arc<Catalog>,
    decoder: Arc<D>,
    cache: PrefetchCache<D>,
    index: usize,
    current: Current,
    viewport: ViewportSize,
    output_dir: PathBuf,
    store: Option<SessionStore>,
    closed: bool,
}

impl<D: Decode> ViewerController<D> {
    pub fn new(catalog: Arc<Catalog>, decoder: Arc<D>, opts: ViewerOptions) -> Result<Self, ViewerError> {
        Self::with_waker(catalog, decoder, opts, None)
    }

    /// Like `new`, but `waker` runs on the worker thread after each prefetch
    /// result is queued, so the owner can schedule a `poll_prefetch`.
    pub fn with_waker(
        catalog: Arc<Catalog>,
        decoder: Arc<D>,
        opts: ViewerOptions,
        waker: Option<Waker>,
    ) -> Result<Self, ViewerError> {
        if catalog.is_empty() {
            return Err(ViewerError::EmptyCatalog);
        }
        let last = catalog.len() - 1;
        let index = if opts.start_index > last {
            log::warn!(
                "Saved position {} is past the last image ({}); starting at the end",
                opts.start_index + 1,
                last + 1
            );
            last
        } else {
            opts.start_index
        };

        let mut cache = PrefetchCache::new(Arc::clone(&catalog), Arc::clone(&decoder));
        if let Some(waker) = waker {
            cache.set_waker(waker);
        }

        let mut controller = Self {
            catalog,
            decoder,
            cache,
            index,
            current: Current::Failed(String::new()),
            viewport: opts.viewport,
            output_dir: opts.output_dir,
            store: opts.store,
            closed: false,
        };

        let decoded = controller.decode_now(index);
        if let Err(e) = controller.show(index, decoded) {
            log::warn!("Could not load image {}: {}", index + 1, e);
        }
        controller.cache.ensure_window(index, controller.viewport);
        Ok(controller)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn total_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.catalog.get(self.index).map(|image| image.path())
    }

    pub fn current_buffer(&self) -> Option<&DisplayBuffer> {
        match &self.current {
            Current::Ready(buffer) => Some(buffer),
            Current::Failed(_) => None,
        }
    }

    pub fn current_error(&self) -> Option<&str> {
        match &self.current {
            Current::Ready(_) => None,
            Current::Failed(msg) => Some(msg),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn cache(&self) -> &PrefetchCache<D> {
        &self.cache
    }

    #[cfg(test)]
    pub fn cache_mut(&mut self) -> &mut PrefetchCache<D> {
        &mut self.cache
    }

    /// Apply prefetch results that have arrived since the last call.
    pub fn poll_prefetch(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.cache.drain()
    }

    pub fn apply(&mut self, intent: Intent) -> Result<Outcome, ViewerError> {
        match intent {
            Intent::Next => self.navigate_next(),
            Intent::Prev => self.navigate_prev(),
            Intent::Resize(viewport) => self.resize(viewport),
            Intent::Pick => Ok(match self.pick() {
                Some(_detached) => Outcome::Picked,
                None => Outcome::Closed,
            }),
            Intent::Quit => {
                self.quit();
                Ok(Outcome::Quit)
            }
        }
    }

    pub fn navigate_next(&mut self) -> Result<Outcome, ViewerError> {
        self.navigate(Side::Next)
    }

    pub fn navigate_prev(&mut self) -> Result<Outcome, ViewerError> {
        self.navigate(Side::Prev)
    }

    fn navigate(&mut self, side: Side) -> Result<Outcome, ViewerError> {
        if self.closed {
            return Ok(Outcome::Closed);
        }
        let Some(target) = side.neighbor(self.index, self.catalog.len()) else {
            return Ok(Outcome::Boundary);
        };

        self.cache.drain();
        let (shown, cache_hit) = match self.cache.take_if_matches(side, target) {
            Some(buffer) => (self.show(target, Ok(buffer)), true),
            None => {
                let decoded = self.decode_now(target);
                (self.show(target, decoded), false)
            }
        };

        log::debug!(
            "[nav] move {} -> {} (cache_hit={})",
            self.index,
            target,
            cache_hit
        );
        self.index = target;
        // The slots still describe the old window; ensure_window re-targets both.
        self.cache.ensure_window(self.index, self.viewport);
        self.persist();

        shown.map_err(|source| ViewerError::Decode {
            index: target,
            source,
        })?;
        Ok(Outcome::Moved {
            index: target,
            cache_hit,
        })
    }

    /// Re-fit everything to a new viewport. A resize to the current size is a no-op.
    pub fn resize(&mut self, viewport: ViewportSize) -> Result<Outcome, ViewerError> {
        if self.closed {
            return Ok(Outcome::Closed);
        }
        if viewport == self.viewport {
            return Ok(Outcome::Resized);
        }
        log::debug!(
            "[resize] {}x{} -> {}x{}",
            self.viewport.width,
            self.viewport.height,
            viewport.width,
            viewport.height
        );
        self.viewport = viewport;
        self.cache.invalidate_all();

        let decoded = self.decode_now(self.index);
        let shown = self.show(self.index, decoded);
        self.cache.ensure_window(self.index, self.viewport);

        shown.map_err(|source| ViewerError::Decode {
            index: self.index,
            source,
        })?;
        Ok(Outcome::Resized)
    }

    /// Copy the current image into the output directory in the background.
    /// Returns `None` once the viewer has quit.
    pub fn pick(&mut self) -> Option<JoinHandle<()>> {
        if self.closed {
            return None;
        }
        let image = self.catalog.get(self.index)?;
        println!("Picking image: {}", image.path().display());
        Some(spawn_copy(image.path().to_path_buf(), self.output_dir.clone()))
    }

    /// Stop accepting intents. Prefetch jobs still running are left to finish
    /// and their results are never applied.
    pub fn quit(&mut self) {
        if !self.closed {
            log::info!(
                "Quitting at image {}/{} ({} prefetch jobs abandoned)",
                self.index + 1,
                self.catalog.len(),
                self.cache.in_flight()
            );
        }
        self.closed = true;
    }

    fn decode_now(&self, index: usize) -> Result<DisplayBuffer, DecodeError> {
        self.decoder.decode(&self.catalog[index], self.viewport)
    }

    fn show(&mut self, index: usize, decoded: Result<DisplayBuffer, DecodeError>) -> Result<(), DecodeError> {
        match decoded {
            Ok(buffer) => {
                self.current = Current::Ready(buffer);
                Ok(())
            }
            Err(e) => {
                self.current = Current::Failed(format!("Could not load image {}: {}", index + 1, e));
                Err(e)
            }
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let session = Session::new(
            self.catalog.root().to_path_buf(),
            self.output_dir.clone(),
            self.index,
            self.catalog.len(),
        );
        if let Err(e) = store.save(&session) {
            log::warn!("Could not save session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ImageRef;
    use crate::prefetch::SlotState;
    use crate::prefetch::tests::FakeDecoder;
    use std::fs;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);
    const VP: ViewportSize = ViewportSize { width: 80, height: 60 };

    struct Fixture {
        dir: tempfile::TempDir,
        decoder: Arc<FakeDecoder>,
        catalog: Arc<Catalog>,
    }

    impl Fixture {
        fn new(n: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("images");
            fs::create_dir_all(&root).unwrap();
            let images = (0..n)
                .map(|i| {
                    let path = root.join(format!("{i}.png"));
                    fs::write(&path, format!("image {i}")).unwrap();
                    ImageRef::new(path)
                })
                .collect();
            Self {
                catalog: Arc::new(Catalog::from_refs(root, images)),
                decoder: Arc::new(FakeDecoder::default()),
                dir,
            }
        }

        fn out_dir(&self) -> PathBuf {
            self.dir.path().join("picked")
        }

        fn store(&self) -> SessionStore {
            SessionStore::new(self.dir.path().join("state.json"))
        }

        fn viewer(&self, start_index: usize) -> ViewerController<FakeDecoder> {
            ViewerController::new(
                Arc::clone(&self.catalog),
                Arc::clone(&self.decoder),
                ViewerOptions {
                    output_dir: self.out_dir(),
                    start_index,
                    viewport: VP,
                    store: Some(self.store()),
                },
            )
            .unwrap()
        }
    }

    fn settle(viewer: &mut ViewerController<FakeDecoder>) {
        assert!(viewer.cache_mut().wait_idle(WAIT));
    }

    fn tag(viewer: &ViewerController<FakeDecoder>) -> u8 {
        viewer.current_buffer().unwrap().pixels[0]
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let fx = Fixture::new(0);
        let err = ViewerController::new(
            Arc::clone(&fx.catalog),
            Arc::clone(&fx.decoder),
            ViewerOptions {
                output_dir: fx.out_dir(),
                start_index: 0,
                viewport: VP,
                store: None,
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, ViewerError::EmptyCatalog));
    }

    #[test]
    fn start_index_is_clamped() {
        let fx = Fixture::new(3);
        let viewer = fx.viewer(10);
        assert_eq!(viewer.current_index(), 2);
        assert_eq!(tag(&viewer), 2);
    }

    #[test]
    fn next_promotes_ready_slot_without_decoding() {
        let fx = Fixture::new(5);
        let mut viewer = fx.viewer(2);
        settle(&mut viewer);
        let cached = match viewer.cache().slot(Side::Next).state() {
            SlotState::Ready { buffer, .. } => buffer.clone(),
            other => panic!("next slot not ready: {other:?}"),
        };

        let outcome = viewer.navigate_next().unwrap();

        assert_eq!(outcome, Outcome::Moved { index: 3, cache_hit: true });
        assert_eq!(viewer.current_buffer(), Some(&cached));
        assert_eq!(fx.decoder.calls_for("3.png"), 1);
    }

    #[test]
    fn miss_decodes_synchronously() {
        let fx = Fixture::new(5);
        fx.decoder.fail_once("3.png");
        let mut viewer = fx.viewer(2);
        settle(&mut viewer);
        assert!(matches!(viewer.cache().slot(Side::Next).state(), SlotState::Empty));

        let outcome = viewer.navigate_next().unwrap();

        assert_eq!(outcome, Outcome::Moved { index: 3, cache_hit: false });
        assert_eq!(tag(&viewer), 3);
        assert_eq!(fx.decoder.calls_for("3.png"), 2);
    }

    #[test]
    fn window_follows_navigation() {
        let fx = Fixture::new(5);
        let mut viewer = fx.viewer(2);
        settle(&mut viewer);
        viewer.navigate_next().unwrap();
        settle(&mut viewer);
        assert_eq!(viewer.cache().slot(Side::Prev).target(), Some(2));
        assert_eq!(viewer.cache().slot(Side::Next).target(), Some(4));

        viewer.navigate_next().unwrap();
        settle(&mut viewer);
        assert_eq!(viewer.cache().slot(Side::Prev).target(), Some(3));
        assert_eq!(viewer.cache().slot(Side::Next).target(), None);
    }

    #[test]
    fn boundaries_are_no_ops() {
        let fx = Fixture::new(3);
        let mut viewer = fx.viewer(0);
        settle(&mut viewer);
        let calls = fx.decoder.total_calls();

        assert_eq!(viewer.navigate_prev().unwrap(), Outcome::Boundary);
        assert_eq!(viewer.current_index(), 0);
        assert_eq!(viewer.cache().in_flight(), 0);
        assert_eq!(fx.decoder.total_calls(), calls);

        let mut viewer = fx.viewer(2);
        settle(&mut viewer);
        let calls = fx.decoder.total_calls();
        assert_eq!(viewer.navigate_next().unwrap(), Outcome::Boundary);
        assert_eq!(viewer.current_index(), 2);
        assert_eq!(viewer.cache().in_flight(), 0);
        assert_eq!(fx.decoder.total_calls(), calls);
    }

    #[test]
    fn navigation_persists_session() {
        let fx = Fixture::new(4);
        let mut viewer = fx.viewer(1);
        viewer.navigate_next().unwrap();

        let saved = fx.store().load().unwrap().unwrap();
        assert_eq!(saved.current_index, 2);
        assert_eq!(saved.total_images, 4);
        assert_eq!(saved.root, fx.catalog.root());
        assert_eq!(saved.output_dir, fx.out_dir());
    }

    #[test]
    fn failed_save_does_not_stop_navigation() {
        let fx = Fixture::new(3);
        let mut viewer = ViewerController::new(
            Arc::clone(&fx.catalog),
            Arc::clone(&fx.decoder),
            ViewerOptions {
                output_dir: fx.out_dir(),
                start_index: 0,
                viewport: VP,
                store: Some(SessionStore::new(fx.dir.path().join("missing/dir/state.json"))),
            },
        )
        .unwrap();
        assert!(matches!(viewer.navigate_next(), Ok(Outcome::Moved { index: 1, .. })));
    }

    #[test]
    fn decode_failure_moves_and_reports() {
        let fx = Fixture::new(5);
        fx.decoder.fail_on("3.png");
        let mut viewer = fx.viewer(2);
        settle(&mut viewer);

        let err = viewer.navigate_next().unwrap_err();
        assert!(matches!(err, ViewerError::Decode { index: 3, .. }));
        assert_eq!(viewer.current_index(), 3);
        assert!(viewer.current_buffer().is_none());
        assert!(viewer.current_error().unwrap().contains("image 4"));
        assert_eq!(fx.store().load().unwrap().unwrap().current_index, 3);

        settle(&mut viewer);
        assert_eq!(
            viewer.navigate_next().unwrap(),
            Outcome::Moved { index: 4, cache_hit: true }
        );
        assert!(viewer.current_error().is_none());
    }

    #[test]
    fn resize_invalidates_and_redecodes_current() {
        let fx = Fixture::new(5);
        let mut viewer = fx.viewer(2);
        settle(&mut viewer);
        let generations = (
            viewer.cache().slot(Side::Prev).generation(),
            viewer.cache().slot(Side::Next).generation(),
        );

        let big = ViewportSize::new(320, 240);
        assert_eq!(viewer.apply(Intent::Resize(big)).unwrap(), Outcome::Resized);

        let buf = viewer.current_buffer().unwrap();
        assert_eq!((buf.width, buf.height), (320, 240));
        assert!(viewer.cache().slot(Side::Prev).generation() > generations.0);
        assert!(viewer.cache().slot(Side::Next).generation() > generations.1);
        for side in [Side::Prev, Side::Next] {
            assert!(matches!(
                viewer.cache().slot(side).state(),
                SlotState::Pending { viewport, .. } if *viewport == big
            ));
        }

        let calls = fx.decoder.total_calls();
        assert_eq!(viewer.resize(big).unwrap(), Outcome::Resized);
        assert_eq!(fx.decoder.total_calls(), calls);
        settle(&mut viewer);
    }

    #[test]
    fn quit_is_terminal() {
        let fx = Fixture::new(3);
        let mut viewer = fx.viewer(1);
        assert_eq!(viewer.apply(Intent::Quit).unwrap(), Outcome::Quit);
        assert!(viewer.is_closed());
        assert_eq!(viewer.navigate_next().unwrap(), Outcome::Closed);
        assert_eq!(viewer.navigate_prev().unwrap(), Outcome::Closed);
        assert_eq!(viewer.resize(ViewportSize::new(5, 5)).unwrap(), Outcome::Closed);
        assert!(viewer.pick().is_none());
        assert_eq!(viewer.current_index(), 1);
        assert_eq!(viewer.poll_prefetch(), 0);
    }

    fn picked(out: &Path, name: &str) -> Option<String> {
        fs::read_to_string(out.join(name)).ok()
    }

    #[test]
    fn browse_resize_and_pick_scenario() {
        let fx = Fixture::new(5);
        let mut viewer = fx.viewer(2);

        match viewer.apply(Intent::Next).unwrap() {
            Outcome::Moved { index, .. } => assert_eq!(index, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tag(&viewer), 3);

        viewer.apply(Intent::Prev).unwrap();
        viewer.apply(Intent::Prev).unwrap();
        assert_eq!(viewer.current_index(), 1);
        assert_eq!(tag(&viewer), 1);

        let resized = ViewportSize::new(40, 30);
        viewer.apply(Intent::Resize(resized)).unwrap();
        assert_eq!(viewer.current_buffer().unwrap().width, 40);
        assert!(!viewer.cache().slot(Side::Prev).is_ready());
        assert!(!viewer.cache().slot(Side::Next).is_ready());

        viewer.pick().unwrap().join().unwrap();
        assert_eq!(picked(&fx.out_dir(), "1.png").as_deref(), Some("image 1"));

        assert_eq!(fx.store().load().unwrap().unwrap().current_index, 1);
        settle(&mut viewer);
    }
}
