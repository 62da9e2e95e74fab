//! Ambient audio seam.

/// One looping sound source on the robot (siren, wheels, spray).
pub trait AudioChannel: Send {
    fn set_muted(&mut self, muted: bool);

    /// Start (or restart) playback.
    fn play(&mut self);

    /// Volume in `[0, 1]`.  Out-of-range values are clamped by the caller.
    fn set_volume(&mut self, volume: f32);
}
