use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::error::PlayerError;

pub const UNTITLED: &str = "Untitled";

/// A resolved, playable audio item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Locator handed to the voice transport (a direct media stream URL).
    pub audio_source: String,
    pub title: String,
    /// Page the track was resolved from, for display.
    pub page_url: Option<String>,
    pub duration: Option<Duration>,
}

impl Track {
    pub fn new(audio_source: impl Into<String>, title: Option<String>) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        Self {
            audio_source: audio_source.into(),
            title,
            page_url: None,
            duration: None,
        }
    }

    pub fn with_page_url(mut self, page_url: String) -> Self {
        self.page_url = Some(page_url);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Strict FIFO backlog of pending tracks for one guild.
///
/// Only three mutations exist: append at the tail, pop from the head, clear.
/// Ordering is insertion order and nothing is deduplicated.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Appends a track at the tail.
    pub fn push(&mut self, track: Track) -> Result<(), PlayerError> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }

        info!("➕ Added to queue: {}", track.title);
        self.items.push_back(track);
        Ok(())
    }

    /// Removes and returns the head track.
    pub fn pop(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => debug!("➡️ Next in queue: {}", track.title),
            None => debug!("📭 Queue empty, no next track"),
        }
        next
    }

    /// Empties the queue, returning how many tracks were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if removed > 0 {
            info!("🗑️ Cleared {} tracks from queue", removed);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.items.iter().map(|t| t.title.clone()).collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|t| t.duration).sum()
    }
}
