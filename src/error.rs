//! Guild-scoped error types.
//!
//! None of these are fatal to the process. The `Display` text of each variant is the
//! message shown to the user who issued the command.

use thiserror::Error;

/// Failures of a scheduler command for one guild.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    #[error("I'm not in a voice channel")]
    NotInVoice,

    #[error("There is nothing playing at the moment")]
    NothingPlaying,

    #[error("I'm not paused")]
    NotPaused,

    #[error("There is no next song in the queue to skip to")]
    NoNextSong,

    #[error("There is nothing in the queue to clear")]
    NothingToClear,

    #[error("The queue is full (maximum {0} songs)")]
    QueueFull(usize),

    /// The voice connection refused a command or dropped.
    #[error("Something went wrong with the voice connection: {0}")]
    Transport(String),

    /// The guild's session was removed while the command was in flight.
    #[error("I'm not in a voice channel")]
    SessionClosed,
}

impl PlayerError {
    /// Wrong-state errors that leave the session untouched.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

/// Failures of the track resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("I didn't find anything for: {0}")]
    NothingFound(String),

    #[error("Only Spotify or YouTube links are supported")]
    UnsupportedLink,

    #[error("Spotify links are not enabled on this bot")]
    SpotifyDisabled,

    #[error("Lookup failed: {0}")]
    Lookup(String),
}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        Self::Lookup(e.to_string())
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        Self::Lookup(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_facing() {
        assert_eq!(
            PlayerError::NoNextSong.to_string(),
            "There is no next song in the queue to skip to"
        );
        assert_eq!(PlayerError::SessionClosed.to_string(), PlayerError::NotInVoice.to_string());
        assert_eq!(
            ResolveError::UnsupportedLink.to_string(),
            "Only Spotify or YouTube links are supported"
        );
    }

    #[test]
    fn test_transport_is_not_a_precondition() {
        assert!(PlayerError::NothingPlaying.is_precondition());
        assert!(!PlayerError::Transport("dropped".into()).is_precondition());
    }
}
