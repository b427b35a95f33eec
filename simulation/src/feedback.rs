use std::collections::BTreeSet;

use corral_core::{EntityId, Feedback, FeedbackError};

/// Cue that was played on an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayedCue {
    /// Entity the cue was played on.
    pub entity: EntityId,
    /// Cue name.
    pub cue: String,
}

/// [`Feedback`] sink that records every cue in order.
///
/// With a library attached, cues outside it are refused with
/// [`FeedbackError::MissingCue`] and not recorded.
#[derive(Clone, Debug, Default)]
pub struct CueLog {
    played: Vec<PlayedCue>,
    library: Option<BTreeSet<String>>,
}

impl CueLog {
    /// Creates a log that accepts any cue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log that only accepts cues named in `library`.
    #[must_use]
    pub fn with_library<I, S>(library: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            played: Vec::new(),
            library: Some(library.into_iter().map(Into::into).collect()),
        }
    }

    /// Cues played so far.
    #[must_use]
    pub fn played(&self) -> &[PlayedCue] {
        &self.played
    }
}

impl Feedback for CueLog {
    fn play(&mut self, entity: EntityId, cue: &str) -> Result<(), FeedbackError> {
        if let Some(library) = &self.library {
            if !library.contains(cue) {
                return Err(FeedbackError::MissingCue {
                    cue: cue.to_owned(),
                });
            }
        }
        self.played.push(PlayedCue {
            entity,
            cue: cue.to_owned(),
        });
        Ok(())
    }
}
