use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision6d_3d::{MirrorAxis, MirrorState, Pose};

/// Poses closer than this element-wise count as the same pose when undoing.
const SAME_POSE_EPS: f64 = 1e-12;

/// Element-wise tolerance of the rigidity check on commit.
const RIGIDITY_EPS: f64 = 1e-6;

/// Error types for pose bookkeeping.
#[derive(Debug, Error, PartialEq)]
pub enum PoseStateError {
    /// No entity with this name is tracked.
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    /// An entity with this name is already tracked.
    #[error("Entity '{0}' is already tracked")]
    DuplicateEntity(String),

    /// A commit needs a reference entity but none is set.
    #[error("No reference entity is set")]
    NoReference,

    /// Only coupled entities can drive the shared pose.
    #[error("Entity '{0}' is not coupled to the reference")]
    NotCoupled(String),

    /// The committed matrix is not a rotation or reflection plus translation.
    #[error("Pose for '{0}' is not rigid")]
    NotRigid(String),

    /// Redo is switched off in [`PoseStateConfig`].
    #[error("Redo is disabled")]
    RedoDisabled,
}

/// Parameters of [`PoseState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseStateConfig {
    /// Maximum number of undo (and redo) entries.
    pub history_capacity: usize,
    /// Whether [`PoseState::redo`] is available.
    pub enable_redo: bool,
}

impl Default for PoseStateConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            enable_redo: false,
        }
    }
}

/// A bounded stack of poses. Pushing onto a full stack evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseHistory {
    capacity: usize,
    entries: VecDeque<Pose>,
}

impl PoseHistory {
    /// Create an empty history holding at most `capacity` poses.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Push `pose` as the most recent entry.
    pub fn push(&mut self, pose: Pose) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(pose);
    }

    /// Remove and return the most recent entry.
    pub fn pop(&mut self) -> Option<Pose> {
        self.entries.pop_back()
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<&Pose> {
        self.entries.back()
    }

    /// Number of stored poses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored poses.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Coupling {
    /// Follows the shared pose.
    Coupled,
    /// Keeps its own pose, mirror already applied.
    Free(Pose),
}

#[derive(Debug, Clone, PartialEq)]
struct Entity {
    mirror: MirrorState,
    coupling: Coupling,
}

/// Current poses of the tracked entities plus the shared undo/redo history.
///
/// Coupled entities share one mirror-free pose, the *shared pose*. Each of them is shown at
/// `mirror * shared`, so they can never drift apart. The history stores shared poses, which
/// keeps undo independent of mirror toggles. Uncoupled entities own their pose and are not
/// touched by commit, undo or redo.
#[derive(Debug, Clone)]
pub struct PoseState {
    config: PoseStateConfig,
    shared: Pose,
    initial: Pose,
    entities: BTreeMap<String, Entity>,
    reference: Option<String>,
    undo: PoseHistory,
    redo: PoseHistory,
}

impl Default for PoseState {
    fn default() -> Self {
        Self::new(PoseStateConfig::default())
    }
}

impl PoseState {
    /// Create an empty state with the identity as shared and initial pose.
    pub fn new(config: PoseStateConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            shared: Pose::IDENTITY,
            initial: Pose::IDENTITY,
            entities: BTreeMap::new(),
            reference: None,
            undo: PoseHistory::new(capacity),
            redo: PoseHistory::new(capacity),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &PoseStateConfig {
        &self.config
    }

    /// Track a coupled entity. The first coupled entity becomes the reference.
    pub fn track(&mut self, name: impl Into<String>) -> Result<(), PoseStateError> {
        let name = name.into();
        self.insert(name.clone(), Coupling::Coupled)?;
        if self.reference.is_none() {
            self.reference = Some(name);
        }
        Ok(())
    }

    /// Track an entity that keeps its own pose.
    pub fn track_uncoupled(
        &mut self,
        name: impl Into<String>,
        pose: Pose,
    ) -> Result<(), PoseStateError> {
        self.insert(name.into(), Coupling::Free(pose))
    }

    fn insert(&mut self, name: String, coupling: Coupling) -> Result<(), PoseStateError> {
        if self.entities.contains_key(&name) {
            return Err(PoseStateError::DuplicateEntity(name));
        }
        self.entities.insert(
            name,
            Entity {
                mirror: MirrorState::default(),
                coupling,
            },
        );
        Ok(())
    }

    /// Stop tracking `name`. Removing the reference hands the role to the first remaining
    /// coupled entity in name order.
    pub fn untrack(&mut self, name: &str) -> Result<(), PoseStateError> {
        if self.entities.remove(name).is_none() {
            return Err(PoseStateError::UnknownEntity(name.to_string()));
        }
        if self.reference.as_deref() == Some(name) {
            self.reference = self
                .entities
                .iter()
                .find(|(_, e)| e.coupling == Coupling::Coupled)
                .map(|(n, _)| n.clone());
        }
        Ok(())
    }

    /// Make `name` the entity whose commits drive the history.
    pub fn set_reference(&mut self, name: &str) -> Result<(), PoseStateError> {
        let entity = self.entity(name)?;
        if entity.coupling != Coupling::Coupled {
            return Err(PoseStateError::NotCoupled(name.to_string()));
        }
        self.reference = Some(name.to_string());
        Ok(())
    }

    /// Name of the reference entity.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Whether `name` is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Whether `name` follows the shared pose.
    pub fn is_coupled(&self, name: &str) -> Result<bool, PoseStateError> {
        Ok(self.entity(name)?.coupling == Coupling::Coupled)
    }

    /// Names of all tracked entities, in name order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entities.keys().map(String::as_str)
    }

    /// Current pose of `name`, mirror included.
    pub fn pose(&self, name: &str) -> Result<Pose, PoseStateError> {
        Ok(self.resolve(self.entity(name)?))
    }

    /// Current pose of the reference entity.
    pub fn reference_pose(&self) -> Result<Pose, PoseStateError> {
        let name = self.reference.as_deref().ok_or(PoseStateError::NoReference)?;
        self.pose(name)
    }

    /// Current pose of every tracked entity, in name order.
    pub fn poses(&self) -> Vec<(String, Pose)> {
        self.entities
            .iter()
            .map(|(name, e)| (name.clone(), self.resolve(e)))
            .collect()
    }

    /// Mirror flags of `name`.
    pub fn mirror_state(&self, name: &str) -> Result<MirrorState, PoseStateError> {
        Ok(self.entity(name)?.mirror)
    }

    /// The shared, mirror-free pose of the coupled entities.
    pub fn shared_pose(&self) -> Pose {
        self.shared
    }

    /// The initial (ground-truth) shared pose.
    pub fn initial_pose(&self) -> Pose {
        self.initial
    }

    /// Number of undo entries.
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo entries.
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Commit a new pose for the reference entity.
    pub fn commit(&mut self, pose: Pose) -> Result<(), PoseStateError> {
        let name = self.reference.clone().ok_or(PoseStateError::NoReference)?;
        self.commit_entity(&name, pose)
    }

    /// Commit a new pose, mirror included, for `name`.
    ///
    /// For a coupled entity the previous shared pose goes onto the undo stack, the redo stack
    /// is cleared and every coupled entity moves along. An uncoupled entity just takes the pose.
    /// Poses that are not rigid up to a reflection are rejected and leave the state untouched.
    pub fn commit_entity(&mut self, name: &str, pose: Pose) -> Result<(), PoseStateError> {
        if !pose.is_orthonormal_up_to_reflection(RIGIDITY_EPS) {
            return Err(PoseStateError::NotRigid(name.to_string()));
        }
        let entity = self
            .entities
            .get_mut(name)
            .ok_or_else(|| PoseStateError::UnknownEntity(name.to_string()))?;
        let shared = match entity.coupling {
            // Reflections are their own inverse.
            Coupling::Coupled => entity.mirror.apply(&pose),
            Coupling::Free(ref mut own) => {
                *own = pose;
                return Ok(());
            }
        };
        self.push_shared(shared);
        Ok(())
    }

    fn push_shared(&mut self, shared: Pose) {
        self.undo.push(self.shared);
        self.redo.clear();
        self.shared = shared;
        log::debug!("committed shared pose, undo depth {}", self.undo.len());
    }

    /// Restore the previous shared pose. Returns the restored pose, or `None` when the history
    /// is empty.
    ///
    /// An entry identical to the current pose, left by a duplicate commit, is skipped when an
    /// older entry exists.
    pub fn undo(&mut self) -> Option<Pose> {
        let mut restored = self.undo.pop()?;
        if restored.abs_diff_eq(&self.shared, SAME_POSE_EPS) {
            if let Some(older) = self.undo.pop() {
                restored = older;
            }
        }
        self.redo.push(self.shared);
        self.shared = restored;
        log::debug!(
            "undo: {} entries left, {} to redo",
            self.undo.len(),
            self.redo.len()
        );
        Some(restored)
    }

    /// Re-apply the most recently undone shared pose.
    pub fn redo(&mut self) -> Result<Option<Pose>, PoseStateError> {
        if !self.config.enable_redo {
            return Err(PoseStateError::RedoDisabled);
        }
        let Some(restored) = self.redo.pop() else {
            return Ok(None);
        };
        self.undo.push(self.shared);
        self.shared = restored;
        Ok(Some(restored))
    }

    /// Toggle the mirror flag of `name` along `axis` and return its new pose. History is left
    /// alone.
    pub fn apply_mirror(&mut self, name: &str, axis: MirrorAxis) -> Result<Pose, PoseStateError> {
        let entity = self
            .entities
            .get_mut(name)
            .ok_or_else(|| PoseStateError::UnknownEntity(name.to_string()))?;
        entity.mirror.toggle(axis);
        if let Coupling::Free(ref mut own) = entity.coupling {
            *own = own.mirrored(axis);
        }
        self.pose(name)
    }

    /// Replace the initial pose and start over from it with an empty history.
    pub fn set_initial(&mut self, shared: Pose) {
        self.initial = shared;
        self.shared = shared;
        self.undo.clear();
        self.redo.clear();
    }

    /// Move the coupled entities back to the initial pose. Undoable.
    pub fn reset_to_initial(&mut self) {
        self.push_shared(self.initial);
    }

    /// Make the current shared pose the initial pose.
    pub fn update_initial(&mut self) {
        self.initial = self.shared;
    }

    fn entity(&self, name: &str) -> Result<&Entity, PoseStateError> {
        self.entities
            .get(name)
            .ok_or_else(|| PoseStateError::UnknownEntity(name.to_string()))
    }

    fn resolve(&self, entity: &Entity) -> Pose {
        match entity.coupling {
            Coupling::Coupled => entity.mirror.apply(&self.shared),
            Coupling::Free(own) => own,
        }
    }
}
