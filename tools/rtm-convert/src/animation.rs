//! Animation resampler and keyframe compressor
//!
//! Clips arrive with arbitrarily-timed position/rotation/scale key
//! tracks per joint. Resampling walks a fixed-rate frame clock over each
//! track: scale is lerped per axis (only X feeds the stored uniform
//! scale), rotation is slerped, and the combined rotation+translation is
//! screw-interpolated between dual quaternions built at the bracketing
//! keys. All clips are then concatenated along one global frame timeline
//! and each joint's track is compressed by dropping interior frames that
//! interpolation reconstructs within tolerance.

use glam::Quat;
use hashbrown::HashMap;
use tracing::debug;

use rtm_common::{AnimationAction, DualQuat, KeyFrameSet};

use crate::scene::{SceneAnimation, SceneChannel};
use crate::skeleton::Skeleton;

/// Per-component tolerance for dropping a reconstructable keyframe.
const COMPRESS_THRESHOLD: f32 = 1e-3;

// ============================================================================
// Track cursor
// ============================================================================

/// A bracketing pair of key indices with the interpolation fraction
/// between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: usize,
    pub upper: usize,
    pub fraction: f32,
}

/// Monotonic search cursor over one key track.
///
/// The resampler queries frame times in increasing order; the cursor
/// remembers the previous bracket's upper index and resumes scanning
/// there instead of from the start. Consumed and returned by value so
/// the track itself stays untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackCursor {
    upper: usize,
}

impl TrackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the keys bracketing `time`.
    ///
    /// Queries past the last key clamp to the final pair; a zero-length
    /// bracket yields fraction 0. Panics on an empty track.
    pub fn seek<T: Copy>(self, keys: &[(f32, T)], time: f32) -> (Self, Bracket) {
        assert!(!keys.is_empty(), "Seek on an empty key track");

        if keys.len() == 1 {
            let bracket = Bracket {
                lower: 0,
                upper: 0,
                fraction: 0.0,
            };
            return (Self { upper: 0 }, bracket);
        }

        let mut i = self.upper;
        while i < keys.len() && keys[i].0 < time {
            i += 1;
        }

        let (lower, upper) = if i == 0 {
            (0, 1)
        } else if i >= keys.len() - 1 {
            (keys.len() - 2, keys.len() - 1)
        } else {
            (i - 1, i)
        };

        let span = keys[upper].0 - keys[lower].0;
        let fraction = if span == 0.0 {
            0.0
        } else {
            ((time - keys[lower].0) / span).clamp(0.0, 1.0)
        };

        (Self { upper }, Bracket {
            lower,
            upper,
            fraction,
        })
    }
}

// ============================================================================
// Resampling
// ============================================================================

/// Resample one joint's channel to fixed-rate frames
/// `[start_frame, end_frame)`. `ticks_per_frame` converts a frame index
/// to the track's native time base.
pub fn resample_track(
    channel: &SceneChannel,
    start_frame: u32,
    end_frame: u32,
    ticks_per_frame: f32,
) -> KeyFrameSet {
    let rotation_at = |i: usize| {
        channel
            .rotation_keys
            .get(i.min(channel.rotation_keys.len().saturating_sub(1)))
            .map(|k| k.1)
            .unwrap_or(Quat::IDENTITY)
    };

    let mut kf = KeyFrameSet::default();
    let mut pos_cursor = TrackCursor::new();
    let mut rot_cursor = TrackCursor::new();
    let mut scale_cursor = TrackCursor::new();

    for frame in start_frame..end_frame {
        let time = frame as f32 * ticks_per_frame;

        let mut scale = 1.0;
        let mut real = Quat::IDENTITY;
        let mut dual = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
        let mut rot_upper = 0;

        if !channel.scale_keys.is_empty() {
            let (cursor, bracket) = scale_cursor.seek(&channel.scale_keys, time);
            scale_cursor = cursor;
            let lerped = channel.scale_keys[bracket.lower]
                .1
                .lerp(channel.scale_keys[bracket.upper].1, bracket.fraction);
            // Only X feeds the stored uniform scale
            scale = lerped.x;
        }
        if !channel.rotation_keys.is_empty() {
            let (cursor, bracket) = rot_cursor.seek(&channel.rotation_keys, time);
            rot_cursor = cursor;
            rot_upper = bracket.upper;
            real = channel.rotation_keys[bracket.lower]
                .1
                .slerp(channel.rotation_keys[bracket.upper].1, bracket.fraction);
        }
        if !channel.position_keys.is_empty() {
            let (cursor, bracket) = pos_cursor.seek(&channel.position_keys, time);
            pos_cursor = cursor;

            // The dual part comes from screw interpolation between dual
            // quaternions built at the position brackets, not from a
            // naive lerp of translations.
            let from = DualQuat::from_rotation_translation(
                rotation_at(bracket.lower),
                channel.position_keys[bracket.lower].1,
            );
            let to = DualQuat::from_rotation_translation(
                rotation_at(rot_upper),
                channel.position_keys[bracket.upper].1,
            );
            dual = from.sclerp(to, bracket.fraction).dual;
        }

        let sample = DualQuat::new(real, dual).canonicalized();
        kf.push(frame, sample, scale);
    }

    kf
}

/// One clip resampled across the whole skeleton.
struct ResampledClip {
    name: String,
    num_frames: u32,
    tracks: HashMap<u32, KeyFrameSet>,
}

fn resample_clip(skeleton: &Skeleton, anim: &SceneAnimation, frame_rate: u32) -> ResampledClip {
    let num_frames = ((anim.duration_seconds() * frame_rate as f32).ceil() as u32).max(1);
    let ticks_per_frame = if anim.ticks_per_second > 0.0 {
        anim.ticks_per_second / frame_rate as f32
    } else {
        0.0
    };

    let mut tracks = HashMap::new();
    for channel in &anim.channels {
        let Some(joint_id) = skeleton.joint_index(&channel.node_name) else {
            debug!(
                "Ignoring channel for {:?} in {:?}: not a joint",
                channel.node_name, anim.name
            );
            continue;
        };
        tracks.insert(
            joint_id,
            resample_track(channel, 0, num_frames, ticks_per_frame),
        );
    }

    // Joints the clip does not animate hold their local bind pose in a
    // single frame-0 key.
    for (joint_id, joint) in skeleton.joints.iter().enumerate() {
        tracks.entry(joint_id as u32).or_insert_with(|| {
            let mut kf = KeyFrameSet::default();
            kf.push(0, joint.local_bind, joint.local_scale);
            kf
        });
    }

    ResampledClip {
        name: anim.name.clone(),
        num_frames,
        tracks,
    }
}

/// Resample every clip, concatenate along one global frame timeline,
/// and compress each joint's track after each clip is appended.
///
/// Returns one keyframe set per joint, the action list, and the total
/// frame count.
pub fn build_animation(
    skeleton: &Skeleton,
    animations: &[SceneAnimation],
    frame_rate: u32,
) -> (Vec<KeyFrameSet>, Vec<AnimationAction>, u32) {
    let mut key_frame_sets = vec![KeyFrameSet::default(); skeleton.len()];
    let mut actions = Vec::with_capacity(animations.len());
    let mut frame_offset = 0u32;

    for anim in animations {
        let clip = resample_clip(skeleton, anim, frame_rate);
        debug!(
            "Clip {:?}: {} frames at {} fps",
            clip.name, clip.num_frames, frame_rate
        );

        actions.push(AnimationAction {
            name: clip.name,
            start_frame: frame_offset,
            end_frame: frame_offset + clip.num_frames,
        });

        for (joint_id, track) in clip.tracks {
            let kf = &mut key_frame_sets[joint_id as usize];
            for i in 0..track.len() {
                kf.push(track.frame_ids[i] + frame_offset, track.binds[i], track.scales[i]);
            }
            compress_key_frames(kf);
        }

        frame_offset += clip.num_frames;
    }

    (key_frame_sets, actions, frame_offset)
}

// ============================================================================
// Compression
// ============================================================================

/// Greedily drop interior keyframes that screw interpolation between
/// their neighbors reconstructs within [`COMPRESS_THRESHOLD`].
///
/// The first and last samples always survive. Single-pass: once a frame
/// fails the test the cursor moves on and never looks back.
pub fn compress_key_frames(kf: &mut KeyFrameSet) {
    let mut base = 0;
    while base + 2 < kf.len() {
        let frame0 = kf.frame_ids[base];
        let frame1 = kf.frame_ids[base + 1];
        let frame2 = kf.frame_ids[base + 2];
        let factor = (frame1 - frame0) as f32 / (frame2 - frame0) as f32;

        let mut interp = kf.binds[base].sclerp(kf.binds[base + 2], factor);
        let interp_scale = kf.scales[base] + (kf.scales[base + 2] - kf.scales[base]) * factor;

        let actual = kf.binds[base + 1];
        if actual.real.dot(interp.real) < 0.0 {
            interp = -interp;
        }

        let diff = actual.inverse().mul(interp);
        let diff_scale = interp_scale / kf.scales[base + 1];

        let within = diff.real.x.abs() < COMPRESS_THRESHOLD
            && diff.real.y.abs() < COMPRESS_THRESHOLD
            && diff.real.z.abs() < COMPRESS_THRESHOLD
            && (diff.real.w - 1.0).abs() < COMPRESS_THRESHOLD
            && diff.dual.x.abs() < COMPRESS_THRESHOLD
            && diff.dual.y.abs() < COMPRESS_THRESHOLD
            && diff.dual.z.abs() < COMPRESS_THRESHOLD
            && diff.dual.w.abs() < COMPRESS_THRESHOLD
            && (diff_scale - 1.0).abs() < COMPRESS_THRESHOLD;

        if within {
            kf.remove(base + 1);
        } else {
            base += 1;
        }
    }
}
