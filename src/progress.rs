// progress.rs - debounced loading indicator fed by load-cycle events

use crate::streaming::LoadEvent;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinnerState {
    /// No load has ever started.
    Pristine,
    Idle,
    /// A load is running; the spinner appears at `deadline` unless it ends first.
    Armed { deadline: Instant },
    Visible,
}

/// Turns load-started / tile-loaded / load-ended events into a spinner flag
/// and a percentage. The first load shows the spinner immediately; later
/// loads only after `delay`, so quick loads never flicker.
#[derive(Debug, Clone)]
pub struct LoadingProgressTracker {
    delay: Duration,
    state: SpinnerState,
    total_tiles: usize,
    loaded_tiles: usize,
}

impl LoadingProgressTracker {
    pub fn new(delay: Duration) -> Self {
        Self { delay, state: SpinnerState::Pristine, total_tiles: 0, loaded_tiles: 0 }
    }

    pub fn state(&self) -> SpinnerState {
        self.state
    }

    pub fn handle(&mut self, event: &LoadEvent, now: Instant) {
        match event {
            LoadEvent::LoadStarted { count } => self.load_started(*count, now),
            LoadEvent::TileLoaded => self.tile_loaded(),
            LoadEvent::LoadEnded => self.load_ended(),
        }
    }

    pub fn load_started(&mut self, total: usize, now: Instant) {
        self.total_tiles = total;
        self.loaded_tiles = 0;
        self.state = match self.state {
            SpinnerState::Pristine => SpinnerState::Visible,
            SpinnerState::Visible => SpinnerState::Visible,
            SpinnerState::Idle | SpinnerState::Armed { .. } => {
                SpinnerState::Armed { deadline: now + self.delay }
            }
        };
    }

    pub fn tile_loaded(&mut self) {
        self.loaded_tiles += 1;
    }

    pub fn load_ended(&mut self) {
        self.state = SpinnerState::Idle;
    }

    /// Fire the pending timer if its deadline has passed.
    pub fn update(&mut self, now: Instant) {
        if let SpinnerState::Armed { deadline } = self.state {
            if now >= deadline {
                self.state = SpinnerState::Visible;
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == SpinnerState::Visible
    }

    /// Percentage of the current load that has arrived, 0 when nothing is expected.
    pub fn progress(&self) -> f32 {
        if self.total_tiles == 0 {
            return 0.0;
        }
        (self.loaded_tiles as f32 / self.total_tiles as f32 * 100.0).min(100.0)
    }
}
