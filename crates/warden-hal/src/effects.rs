//! Visual effect seams: fog puffs and the distraction reactors.

/// Opaque handle to one spawned effect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub u64);

/// Host-side factory for transient fog effects.
///
/// Every spawn happens at the robot's fixed emission point and is parented
/// under the robot's effect container; the caller owns the returned handle
/// and is responsible for despawning it.
pub trait EffectSpawner: Send {
    /// Instantiate one effect and return its handle.
    fn spawn(&mut self) -> EffectId;

    /// Destroy a previously spawned effect.  Unknown handles are ignored.
    fn despawn(&mut self, id: EffectId);
}

/// Screens, lights, arms and siren used to distract the actor.
pub trait Reactors: Send {
    /// Show or hide the calm (idle) screen.
    fn set_calm_screen(&mut self, visible: bool);

    /// Replace the text on the calm screen.
    fn set_calm_text(&mut self, text: &str);

    /// Fire the alert: alert screen on, siren on, arm and light triggers,
    /// arm lights on, top/front lights toggled.
    fn alert(&mut self);

    /// Put every light into its resting configuration.
    fn lights_off(&mut self);

    /// Deactivate arms, light rig and siren entirely.
    fn disable(&mut self);
}
