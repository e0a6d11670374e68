//! In-memory transport and notifier used by the scheduler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc};

use crate::{
    audio::{
        events::CompletionBridge,
        queue::Track,
        transport::{ChannelNotifier, VoiceBinding, VoiceConnection},
    },
    error::PlayerError,
};

pub fn track(title: &str) -> Track {
    Track::new(format!("https://media.example/{title}.m4a"), Some(title.to_string()))
}

pub fn binding(voice: &Arc<FakeVoice>, notifier: &Arc<RecordingNotifier>) -> VoiceBinding {
    VoiceBinding {
        connection: voice.clone(),
        notifier: notifier.clone(),
    }
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    current: Option<(String, CompletionBridge)>,
    started: Vec<String>,
    failing: HashSet<String>,
    fail_controls: bool,
    fail_disconnect: bool,
    stops: usize,
    disconnects: usize,
}

/// Records transport calls. Like songbird, stopping or replacing a source raises its
/// completion notification.
#[derive(Default)]
pub struct FakeVoice {
    state: Mutex<FakeState>,
}

impl FakeVoice {
    pub fn connected() -> Arc<Self> {
        let voice = Self::default();
        voice.state.lock().connected = true;
        Arc::new(voice)
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().started.clone()
    }

    pub fn current_title(&self) -> Option<String> {
        self.state.lock().current.as_ref().map(|(title, _)| title.clone())
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Ends the current source naturally.
    pub fn finish_current(&self) {
        let current = self.state.lock().current.take();
        if let Some((_, bridge)) = current {
            bridge.notify(None);
        }
    }

    /// Ends the current source with a streaming error.
    pub fn error_current(&self, error: &str) {
        let current = self.state.lock().current.take();
        if let Some((_, bridge)) = current {
            bridge.notify(Some(error.to_string()));
        }
    }

    /// Bridge of the current source, without ending it.
    pub fn current_bridge(&self) -> Option<CompletionBridge> {
        self.state.lock().current.as_ref().map(|(_, bridge)| bridge.clone())
    }

    pub fn fail_on(&self, title: &str) {
        self.state.lock().failing.insert(title.to_string());
    }

    pub fn fail_controls(&self) {
        self.state.lock().fail_controls = true;
    }

    pub fn fail_disconnect(&self) {
        self.state.lock().fail_disconnect = true;
    }

    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn play(&self, track: &Track, on_end: CompletionBridge) -> Result<(), PlayerError> {
        let replaced = {
            let mut state = self.state.lock();
            if state.failing.contains(&track.title) {
                return Err(PlayerError::Transport("codec error".into()));
            }
            state.started.push(track.title.clone());
            state.current.replace((track.title.clone(), on_end))
        };
        if let Some((_, bridge)) = replaced {
            bridge.notify(None);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        match self.state.lock().fail_controls {
            true => Err(PlayerError::Transport("track handle gone".into())),
            false => Ok(()),
        }
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        match self.state.lock().fail_controls {
            true => Err(PlayerError::Transport("track handle gone".into())),
            false => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        let current = {
            let mut state = self.state.lock();
            state.stops += 1;
            state.current.take()
        };
        if let Some((_, bridge)) = current {
            bridge.notify(None);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PlayerError> {
        let current = {
            let mut state = self.state.lock();
            state.disconnects += 1;
            if state.fail_disconnect {
                return Err(PlayerError::Transport("gateway unreachable".into()));
            }
            state.connected = false;
            state.current.take()
        };
        if let Some((_, bridge)) = current {
            bridge.notify(None);
        }
        Ok(())
    }
}

/// Collects every channel notification.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl ChannelNotifier for RecordingNotifier {
    async fn notify(&self, message: String) {
        self.messages.lock().push(message);
    }
}
