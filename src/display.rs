//! Display registry: one overlay surface per connected display

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DisplayId = u32;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
    pub id: DisplayId,
    pub bounds: Bounds,
}

/// Payload pushed to every overlay when an episode starts
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShowCommand {
    pub duration_ms: u64,
    pub audio_enabled: bool,
}

/// Full-screen, input-transparent window bound to a single display.
///
/// All calls are fire-and-forget; completion comes back separately.
pub trait OverlaySurface {
    fn set_bounds(&mut self, bounds: Bounds);
    fn show(&mut self, command: &ShowCommand);
    fn close(self);
}

/// Notifications from the display backend to the core
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Full list of currently connected displays
    DisplaysChanged(Vec<Display>),
    /// A surface finished showing its overlay
    SurfaceCompleted(DisplayId),
    SurfaceError { display: DisplayId, message: String },
    /// The backend no longer has a surface for this display
    SurfaceLost { display: DisplayId, message: String },
    /// The backend is gone; no surface can exist anymore
    Closed,
}

pub trait SurfaceFactory {
    type Surface: OverlaySurface;

    /// Create a hidden surface covering `display`
    fn create(&mut self, display: &Display) -> anyhow::Result<Self::Surface>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: Vec<DisplayId>,
    pub removed: Vec<DisplayId>,
    pub updated: Vec<DisplayId>,
    pub failed: Vec<(DisplayId, String)>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

struct Tracked<S> {
    bounds: Bounds,
    surface: S,
}

pub struct DisplayRegistry<F: SurfaceFactory> {
    factory: F,
    surfaces: BTreeMap<DisplayId, Tracked<F::Surface>>,
}

impl<F: SurfaceFactory> DisplayRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            surfaces: BTreeMap::new(),
        }
    }

    /// Reconcile tracked surfaces with the live display set.
    ///
    /// Idempotent: calling it twice with the same displays changes nothing.
    /// Existing surfaces are moved in place, never recreated.
    pub fn sync(&mut self, live: &[Display]) -> SyncReport {
        let mut report = SyncReport::default();

        let stale: Vec<DisplayId> = self
            .surfaces
            .keys()
            .filter(|id| !live.iter().any(|d| d.id == **id))
            .copied()
            .collect();
        for id in stale {
            if let Some(tracked) = self.surfaces.remove(&id) {
                tracked.surface.close();
                report.removed.push(id);
            }
        }

        for display in live {
            match self.surfaces.get_mut(&display.id) {
                Some(tracked) => {
                    if tracked.bounds != display.bounds {
                        tracked.bounds = display.bounds;
                        tracked.surface.set_bounds(display.bounds);
                        report.updated.push(display.id);
                    }
                }
                None => match self.factory.create(display) {
                    Ok(surface) => {
                        self.surfaces.insert(
                            display.id,
                            Tracked {
                                bounds: display.bounds,
                                surface,
                            },
                        );
                        report.created.push(display.id);
                    }
                    Err(e) => report.failed.push((display.id, e.to_string())),
                },
            }
        }

        report
    }

    /// Send `command` to every surface alive right now; returns the count
    pub fn broadcast(&mut self, command: &ShowCommand) -> usize {
        for tracked in self.surfaces.values_mut() {
            tracked.surface.show(command);
        }
        self.surfaces.len()
    }

    /// Stop tracking a surface the backend already tore down.
    ///
    /// The next `sync()` listing the display creates a fresh surface.
    pub fn forget(&mut self, id: DisplayId) -> bool {
        self.surfaces.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    #[cfg(test)]
    pub fn display_ids(&self) -> Vec<DisplayId> {
        self.surfaces.keys().copied().collect()
    }

    pub fn close_all(&mut self) {
        for (_, tracked) in std::mem::take(&mut self.surfaces) {
            tracked.surface.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SurfaceCall {
        Create(DisplayId, Bounds),
        SetBounds(DisplayId, Bounds),
        Show(DisplayId, ShowCommand),
        Close(DisplayId),
    }

    pub type CallLog = Rc<RefCell<Vec<SurfaceCall>>>;

    pub struct FakeSurface {
        id: DisplayId,
        calls: CallLog,
    }

    impl OverlaySurface for FakeSurface {
        fn set_bounds(&mut self, bounds: Bounds) {
            self.calls.borrow_mut().push(SurfaceCall::SetBounds(self.id, bounds));
        }

        fn show(&mut self, command: &ShowCommand) {
            self.calls.borrow_mut().push(SurfaceCall::Show(self.id, *command));
        }

        fn close(self) {
            self.calls.borrow_mut().push(SurfaceCall::Close(self.id));
        }
    }

    /// Records every surface call; ids listed in `failing` refuse creation
    #[derive(Default)]
    pub struct FakeFactory {
        pub calls: CallLog,
        pub failing: Vec<DisplayId>,
    }

    impl SurfaceFactory for FakeFactory {
        type Surface = FakeSurface;

        fn create(&mut self, display: &Display) -> anyhow::Result<FakeSurface> {
            if self.failing.contains(&display.id) {
                anyhow::bail!("no output for display {}", display.id);
            }
            self.calls
                .borrow_mut()
                .push(SurfaceCall::Create(display.id, display.bounds));
            Ok(FakeSurface {
                id: display.id,
                calls: Rc::clone(&self.calls),
            })
        }
    }

    pub fn display(id: DisplayId, x: i32) -> Display {
        Display {
            id,
            bounds: Bounds {
                x,
                y: 0,
                width: 1920,
                height: 1080,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::rc::Rc;

    fn registry() -> (DisplayRegistry<FakeFactory>, CallLog) {
        let factory = FakeFactory::default();
        let calls = Rc::clone(&factory.calls);
        (DisplayRegistry::new(factory), calls)
    }

    #[test]
    fn test_sync_creates_one_surface_per_display() {
        let (mut registry, calls) = registry();
        let report = registry.sync(&[display(1, 0), display(2, 1920)]);

        assert_eq!(report.created, vec![1, 2]);
        assert_eq!(registry.display_ids(), vec![1, 2]);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (mut registry, calls) = registry();
        let displays = [display(1, 0), display(2, 1920)];
        registry.sync(&displays);
        let report = registry.sync(&displays);

        assert!(report.is_noop());
        assert!(report.updated.is_empty());
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_sync_removes_orphans() {
        let (mut registry, calls) = registry();
        registry.sync(&[display(1, 0), display(2, 1920)]);
        let report = registry.sync(&[display(2, 1920)]);

        assert_eq!(report.removed, vec![1]);
        assert_eq!(registry.display_ids(), vec![2]);
        assert!(calls.borrow().contains(&SurfaceCall::Close(1)));
    }

    #[test]
    fn test_bounds_change_updates_in_place() {
        let (mut registry, calls) = registry();
        registry.sync(&[display(1, 0)]);
        let moved = display(1, 2560);
        let report = registry.sync(&[moved]);

        assert_eq!(report.updated, vec![1]);
        assert!(report.created.is_empty());
        assert_eq!(
            calls.borrow().last(),
            Some(&SurfaceCall::SetBounds(1, moved.bounds))
        );
    }

    #[test]
    fn test_surfaces_match_live_set_across_sequences() {
        let (mut registry, _) = registry();
        let sequences: Vec<Vec<Display>> = vec![
            vec![display(1, 0)],
            vec![display(1, 0), display(2, 1920), display(3, 3840)],
            vec![display(3, 3840)],
            vec![],
            vec![display(4, 0), display(1, 1920)],
            vec![display(4, 0), display(4, 0)],
        ];

        for live in sequences {
            registry.sync(&live);
            let mut expected: Vec<DisplayId> = live.iter().map(|d| d.id).collect();
            expected.sort();
            expected.dedup();
            assert_eq!(registry.display_ids(), expected);
        }
    }

    #[test]
    fn test_failed_creation_retried_next_sync() {
        let mut factory = FakeFactory::default();
        factory.failing.push(2);
        let mut registry = DisplayRegistry::new(factory);

        let report = registry.sync(&[display(1, 0), display(2, 1920)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(registry.len(), 1);

        registry.factory.failing.clear();
        let report = registry.sync(&[display(1, 0), display(2, 1920)]);
        assert_eq!(report.created, vec![2]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_forgotten_surface_recreated_on_sync() {
        let (mut registry, calls) = registry();
        let displays = [display(1, 0), display(2, 1920)];
        registry.sync(&displays);

        assert!(registry.forget(2));
        assert!(!registry.forget(2));
        assert_eq!(registry.len(), 1);
        // Already gone on the backend side, so no close is sent
        assert!(!calls.borrow().contains(&SurfaceCall::Close(2)));

        let report = registry.sync(&displays);
        assert_eq!(report.created, vec![2]);
        assert_eq!(registry.display_ids(), vec![1, 2]);
        let creates = calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Create(2, _)))
            .count();
        assert_eq!(creates, 2);
    }

    #[test]
    fn test_broadcast_reaches_every_surface() {
        let (mut registry, calls) = registry();
        registry.sync(&[display(1, 0), display(2, 1920)]);
        let command = ShowCommand {
            duration_ms: 2000,
            audio_enabled: true,
        };

        assert_eq!(registry.broadcast(&command), 2);
        let shows: Vec<_> = calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Show(..)))
            .cloned()
            .collect();
        assert_eq!(
            shows,
            vec![SurfaceCall::Show(1, command), SurfaceCall::Show(2, command)]
        );
    }
}
