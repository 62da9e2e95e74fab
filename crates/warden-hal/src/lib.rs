//! `warden-hal` – the seams between the pursuit core and the host engine.
//!
//! The core never drives an engine directly.  It talks to these traits, and
//! the host (or the simulated stand-ins in [`sim`]) implements them.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`][navigator::Navigator]: the external
//!   path-following service that receives a destination and a speed.
//! - [`effects`] – [`EffectSpawner`][effects::EffectSpawner] (fog puffs) and
//!   [`Reactors`][effects::Reactors] (screens, siren, lights).
//! - [`audio`] – [`AudioChannel`][audio::AudioChannel]: volume/mute control
//!   for ambient robot sounds.
//! - [`sim`] – in-process implementations of every seam for headless runs
//!   and tests.

pub mod audio;
pub mod effects;
pub mod navigator;
pub mod sim;

pub use audio::AudioChannel;
pub use effects::{EffectId, EffectSpawner, Reactors};
pub use navigator::{Navigator, PathStatus};
