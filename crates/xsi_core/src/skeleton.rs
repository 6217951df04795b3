//! Joint hierarchy and per-frame animation channels.

use xsi_math::{euler_xyz_degrees, Affine3A, Mirror, Quat, Vec3};

/// Default playback rate the skeleton is normalised to.
pub const DEFAULT_FRAME_RATE: f32 = 60.0;

/// Parent-relative joint transform components.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPose {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
    /// Source Euler rotation in degrees
    pub euler: Vec3,
}

impl Default for JointPose {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            euler: Vec3::ZERO,
        }
    }
}

impl JointPose {
    /// Build a pose from scale, Euler degrees and translation.
    pub fn from_srt(scale: Vec3, euler_degrees: Vec3, translation: Vec3) -> Self {
        Self {
            scale,
            rotation: euler_xyz_degrees(euler_degrees),
            translation,
            euler: euler_degrees,
        }
    }

    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Which transform component an animation track drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Track {
    Scale,
    Rotation,
    Translation,
}

/// Sampled animation for one joint.
///
/// Tracks are allocated on first write and seeded from the start pose, so
/// components that are never animated keep their static value. Rotation keys
/// are written as Euler degrees and converted by [`AnimChannel::resolve_rotation`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimChannel {
    pub start: JointPose,
    /// Number of keys shared by every allocated track
    pub keys: usize,
    pub scale: Option<Vec<Vec3>>,
    pub rotation: Option<Vec<Quat>>,
    pub translation: Option<Vec<Vec3>>,
    /// Raw Euler rotation keys, pending conversion
    pub euler: Option<Vec<Vec3>>,
}

impl AnimChannel {
    pub fn new(start: JointPose) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    /// True when no track was ever written.
    pub fn is_static(&self) -> bool {
        self.scale.is_none()
            && self.rotation.is_none()
            && self.translation.is_none()
            && self.euler.is_none()
    }

    /// Key storage for a track, allocated from the start pose on first use.
    pub fn track_mut(&mut self, track: Track) -> &mut Vec<Vec3> {
        let keys = self.keys;
        let (storage, seed) = match track {
            Track::Scale => (&mut self.scale, self.start.scale),
            Track::Rotation => (&mut self.euler, self.start.euler),
            Track::Translation => (&mut self.translation, self.start.translation),
        };
        storage.get_or_insert_with(|| vec![seed; keys])
    }

    /// Convert Euler rotation keys to quaternions and drop the raw keys.
    pub fn resolve_rotation(&mut self) {
        if let Some(euler) = self.euler.take() {
            self.rotation = Some(euler.into_iter().map(euler_xyz_degrees).collect());
        }
    }

    /// Mirror the start pose and every translation and rotation key.
    pub fn mirror(&mut self, mirror: Mirror) {
        if mirror == Mirror::None {
            return;
        }
        self.start.translation = mirror.vector(self.start.translation);
        self.start.rotation = mirror.rotation(self.start.rotation);
        if let Some(keys) = self.translation.as_mut() {
            keys.iter_mut().for_each(|t| *t = mirror.vector(*t));
        }
        if let Some(keys) = self.rotation.as_mut() {
            keys.iter_mut().for_each(|q| *q = mirror.rotation(*q));
        }
    }

    /// Pose at a key index; static components fall back to the start pose.
    pub fn pose_at(&self, key: usize) -> JointPose {
        let pick = |track: &Option<Vec<Vec3>>, fallback: Vec3| {
            track
                .as_ref()
                .and_then(|keys| keys.get(key.min(keys.len().saturating_sub(1))))
                .copied()
                .unwrap_or(fallback)
        };
        let rotation = self
            .rotation
            .as_ref()
            .and_then(|keys| keys.get(key.min(keys.len().saturating_sub(1))))
            .copied()
            .unwrap_or(self.start.rotation);

        JointPose {
            scale: pick(&self.scale, self.start.scale),
            rotation,
            translation: pick(&self.translation, self.start.translation),
            euler: self.start.euler,
        }
    }
}

/// A node in the joint hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    pub name: String,

    /// Parent joint; always an index below this joint's own
    pub parent: Option<usize>,

    /// Absolute rest transform
    pub static_pose: Affine3A,

    /// Inverse-bind matrix used for skinning
    pub base_pose: Option<Affine3A>,

    pub channel: AnimChannel,
}

/// Append-only joint forest.
#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
    /// Seconds per key
    pub frame_time: f32,
}

impl Default for Skeleton {
    fn default() -> Self {
        Self {
            joints: Vec::new(),
            frame_time: 1.0 / DEFAULT_FRAME_RATE,
        }
    }
}

impl Skeleton {
    /// Append a joint and return its index.
    ///
    /// A parent that does not precede the new joint is dropped so the
    /// hierarchy stays acyclic.
    pub fn add_joint(&mut self, name: impl Into<String>, parent: Option<usize>) -> usize {
        let id = self.joints.len();
        let parent = parent.filter(|&p| p < id);
        self.joints.push(Joint {
            name: name.into(),
            parent,
            static_pose: Affine3A::IDENTITY,
            base_pose: None,
            channel: AnimChannel::default(),
        });
        id
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Longest key count over all channels.
    pub fn key_count(&self) -> usize {
        self.joints.iter().map(|j| j.channel.keys).max().unwrap_or(0)
    }

    pub fn is_animated(&self) -> bool {
        self.joints.iter().any(|j| !j.channel.is_static())
    }

    /// Set the playback time per key.
    pub fn fix_time(&mut self, frame_time: f32) {
        self.frame_time = frame_time;
    }

    /// Length of the animation in seconds.
    pub fn duration(&self) -> f32 {
        self.key_count().saturating_sub(1) as f32 * self.frame_time
    }

    /// Append another skeleton, offsetting its parent indices.
    pub fn append(&mut self, other: Skeleton) {
        let base = self.joints.len();
        self.joints.extend(other.joints.into_iter().map(|mut j| {
            j.parent = j.parent.map(|p| p + base);
            j
        }));
    }
}
