use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{AuralisError, Result};
use crate::math::{Orientation, Vec3};
use crate::room::{Listener, RoomGeometry, SoundSource};

/// Geometry the update thread regenerates responses from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Scene {
    pub room: RoomGeometry,
    pub listener: Listener,
    pub sources: Vec<SoundSource>,
}

impl Scene {
    /// Moves every head-tracking source onto the listener.
    pub fn snap_tracked_sources(&mut self) {
        let head = self.listener.position;
        for source in self.sources.iter_mut().filter(|s| s.track_head) {
            source.position = head;
        }
    }
}

/// Cross-thread flags of one engine.
#[derive(Debug, Default)]
pub(crate) struct EngineFlags {
    /// Set by the render thread once its first block reached the device
    pub running: AtomicBool,
    pub stop_requested: AtomicBool,
    /// Set by control calls, cleared by the update thread
    pub parameters_dirty: AtomicBool,
    /// Set after the first successful publish, never cleared
    pub responses_ready: AtomicBool,
}

impl EngineFlags {
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.parameters_dirty.store(true, Ordering::Release);
    }

    /// Clears the dirty flag and reports whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.parameters_dirty.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub blocks_rendered: AtomicU64,
    pub clipped_blocks: AtomicU64,
    pub responses_published: AtomicU64,
}

/// Counters reported by [`crate::Engine::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub blocks_rendered: u64,
    pub clipped_blocks: u64,
    pub responses_published: u64,
}

impl StatsCounters {
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            blocks_rendered: self.blocks_rendered.load(Ordering::Relaxed),
            clipped_blocks: self.clipped_blocks.load(Ordering::Relaxed),
            responses_published: self.responses_published.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the engine, its controllers and both threads.
#[derive(Debug)]
pub(crate) struct Shared {
    scene: Mutex<Scene>,
    pub flags: EngineFlags,
    pub stats: StatsCounters,
}

impl Shared {
    pub fn new(scene: Scene) -> Arc<Self> {
        Arc::new(Self {
            scene: Mutex::new(scene),
            flags: EngineFlags::default(),
            stats: StatsCounters::default(),
        })
    }

    fn scene(&self) -> MutexGuard<'_, Scene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the scene with head-tracking sources snapped; the snap is kept.
    pub fn snapshot_for_update(&self) -> Scene {
        let mut scene = self.scene();
        scene.snap_tracked_sources();
        scene.clone()
    }

    /// Applies `change` and marks the scene dirty only if it actually changed anything.
    fn modify(&self, change: impl FnOnce(&mut Scene) -> Result<()>) -> Result<bool> {
        let mut scene = self.scene();
        let mut updated = scene.clone();
        change(&mut updated)?;
        if updated == *scene {
            return Ok(false);
        }
        *scene = updated;
        drop(scene);
        self.flags.mark_dirty();
        Ok(true)
    }
}

/// Handle for changing geometry from any thread while the engine runs.
///
/// Every setter validates its input, stores it, and flags the update thread only when
/// the stored value changed. Setters return whether they changed anything.
#[derive(Clone)]
pub struct EngineController {
    shared: Arc<Shared>,
}

impl EngineController {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn set_listener(&self, listener: Listener) -> Result<bool> {
        self.shared.modify(|scene| {
            listener.validate(&scene.room)?;
            scene.listener = listener;
            Ok(())
        })
    }

    pub fn set_listener_position(&self, position: Vec3) -> Result<bool> {
        self.shared.modify(|scene| {
            let listener = Listener {
                position,
                ..scene.listener
            };
            listener.validate(&scene.room)?;
            scene.listener = listener;
            Ok(())
        })
    }

    pub fn set_listener_orientation(&self, orientation: Orientation) -> Result<bool> {
        self.shared.modify(|scene| {
            let listener = Listener {
                orientation,
                ..scene.listener
            };
            listener.validate(&scene.room)?;
            scene.listener = listener;
            Ok(())
        })
    }

    /// The listener and every source must still lie inside the new room.
    pub fn set_room(&self, room: RoomGeometry) -> Result<bool> {
        self.shared.modify(|scene| {
            room.validate()?;
            scene.listener.validate(&room)?;
            for source in scene.sources.iter().filter(|s| !s.track_head) {
                source.validate(&room)?;
            }
            scene.room = room;
            Ok(())
        })
    }

    /// Positions of head-tracking sources are overridden on the next update.
    pub fn set_source_position(&self, index: usize, position: Vec3) -> Result<bool> {
        self.shared.modify(|scene| {
            let room = scene.room;
            let source = source_mut(scene, index)?;
            let moved = SoundSource {
                position,
                ..*source
            };
            moved.validate(&room)?;
            *source = moved;
            Ok(())
        })
    }

    pub fn set_head_tracking(&self, index: usize, track_head: bool) -> Result<bool> {
        self.shared.modify(|scene| {
            source_mut(scene, index)?.track_head = track_head;
            Ok(())
        })
    }

    pub fn listener(&self) -> Listener {
        self.shared.scene().listener
    }

    pub fn room(&self) -> RoomGeometry {
        self.shared.scene().room
    }

    pub fn source(&self, index: usize) -> Option<SoundSource> {
        self.shared.scene().sources.get(index).copied()
    }

    pub fn source_count(&self) -> usize {
        self.shared.scene().sources.len()
    }

    /// Whether a change is waiting for the update thread.
    pub fn has_pending_changes(&self) -> bool {
        self.shared.flags.parameters_dirty.load(Ordering::Acquire)
    }
}

fn source_mut(scene: &mut Scene, index: usize) -> Result<&mut SoundSource> {
    let count = scene.sources.len();
    scene.sources.get_mut(index).ok_or_else(|| {
        AuralisError::Configuration(format!(
            "Source index {} out of range ({} sources)",
            index, count
        ))
    })
}
