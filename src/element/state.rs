//! Element states and transitions.

use std::fmt;

/// Lifecycle state of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum ElementState {
    /// Created, holding no resources.
    #[default]
    Null,
    /// Ready to negotiate.
    Ready,
    /// Negotiated, data may arrive.
    Paused,
    /// Data is flowing.
    Playing,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementState::Null => "NULL",
            ElementState::Ready => "READY",
            ElementState::Paused => "PAUSED",
            ElementState::Playing => "PLAYING",
        })
    }
}

/// A single step between two adjacent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// NULL to READY.
    NullToReady,
    /// READY to PAUSED.
    ReadyToPaused,
    /// PAUSED to PLAYING.
    PausedToPlaying,
    /// PLAYING to PAUSED.
    PlayingToPaused,
    /// PAUSED to READY; the stream stops here.
    PausedToReady,
    /// READY to NULL.
    ReadyToNull,
}

impl StateChange {
    /// State before the transition.
    pub const fn source_state(&self) -> ElementState {
        match self {
            StateChange::NullToReady => ElementState::Null,
            StateChange::ReadyToPaused | StateChange::ReadyToNull => ElementState::Ready,
            StateChange::PausedToPlaying | StateChange::PausedToReady => ElementState::Paused,
            StateChange::PlayingToPaused => ElementState::Playing,
        }
    }

    /// State after the transition.
    pub const fn target_state(&self) -> ElementState {
        match self {
            StateChange::ReadyToNull => ElementState::Null,
            StateChange::NullToReady | StateChange::PausedToReady => ElementState::Ready,
            StateChange::ReadyToPaused | StateChange::PlayingToPaused => ElementState::Paused,
            StateChange::PausedToPlaying => ElementState::Playing,
        }
    }

    /// Whether this transition moves towards NULL.
    pub const fn is_downward(&self) -> bool {
        matches!(
            self,
            StateChange::PlayingToPaused | StateChange::PausedToReady | StateChange::ReadyToNull
        )
    }

    /// Transition between two adjacent states, if there is one.
    pub const fn between(from: ElementState, to: ElementState) -> Option<StateChange> {
        match (from, to) {
            (ElementState::Null, ElementState::Ready) => Some(StateChange::NullToReady),
            (ElementState::Ready, ElementState::Paused) => Some(StateChange::ReadyToPaused),
            (ElementState::Paused, ElementState::Playing) => Some(StateChange::PausedToPlaying),
            (ElementState::Playing, ElementState::Paused) => Some(StateChange::PlayingToPaused),
            (ElementState::Paused, ElementState::Ready) => Some(StateChange::PausedToReady),
            (ElementState::Ready, ElementState::Null) => Some(StateChange::ReadyToNull),
            _ => None,
        }
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_state(), self.target_state())
    }
}
