//! [`FogEffectPool`] – the bounded FIFO of fog puffs a robot leaves behind.
//!
//! The pool is driven once per *active* controller tick.  Only every Nth
//! tick may emit: on an emitting tick a puff is spawned if fog is enabled
//! and the actor is visible, and then, whether or not anything was spawned,
//! the oldest puff is evicted if the pool is over capacity.  At most one
//! puff is evicted per emitting tick.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;
use warden_hal::{EffectId, EffectSpawner};

/// Emission cadence and capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Emit on every `skip`-th active tick.  `0` and `1` both mean every tick.
    pub skip: u32,
    /// Largest number of live puffs.
    pub max: usize,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self { skip: 4, max: 30 }
    }
}

/// What one [`FogEffectPool::on_tick`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogTick {
    /// Not an emitting tick.
    Skipped,
    Emitted {
        spawned: Option<EffectId>,
        evicted: Option<EffectId>,
    },
}

/// Owns every live fog puff, oldest first.
pub struct FogEffectPool {
    spawner: Box<dyn EffectSpawner>,
    live: VecDeque<EffectId>,
    step: u32,
    skip: u32,
    max: usize,
    enabled: bool,
}

impl FogEffectPool {
    /// Create an empty pool.  With `enabled` false nothing is ever spawned.
    pub fn new(spawner: Box<dyn EffectSpawner>, config: &FogConfig, enabled: bool) -> Self {
        Self {
            spawner,
            live: VecDeque::with_capacity(config.max + 1),
            step: 0,
            skip: config.skip,
            max: config.max,
            enabled,
        }
    }

    /// Advance the skip counter and, on emitting ticks, spawn and trim.
    pub fn on_tick(&mut self, visible: bool) -> FogTick {
        self.step += 1;
        if self.step < self.skip {
            return FogTick::Skipped;
        }
        self.step = 0;

        let spawned = (self.enabled && visible).then(|| {
            let id = self.spawner.spawn();
            self.live.push_back(id);
            id
        });

        let evicted = if self.live.len() > self.max {
            self.live.pop_front().inspect(|&id| self.spawner.despawn(id))
        } else {
            None
        };

        trace!(live = self.live.len(), ?spawned, ?evicted, "fog tick");
        FogTick::Emitted { spawned, evicted }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live puffs, oldest first.
    pub fn live(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.live.iter().copied()
    }

    /// Despawn every live puff.
    pub fn clear(&mut self) {
        for id in self.live.drain(..) {
            self.spawner.despawn(id);
        }
    }
}

impl std::fmt::Debug for FogEffectPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FogEffectPool")
            .field("live", &self.live)
            .field("step", &self.step)
            .field("skip", &self.skip)
            .field("max", &self.max)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
