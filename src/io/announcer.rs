//! Spoken announcement contract
//!
//! The navigator hands prioritized text and named sound cues to an `Announcer`.
//! Delivery is fire-and-forget: nothing the announcer does is reported back.

use tracing::info;

/// Utterance priority, larger is more urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const NORMAL: Priority = Priority(0);
    pub const GUIDANCE: Priority = Priority(5);
    pub const URGENT: Priority = Priority(10);
}

/// Named sound cues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCue {
    NavigationStart,
    NavigationEnd,
    Error,
    Success,
}

impl SoundCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundCue::NavigationStart => "navigation_start",
            SoundCue::NavigationEnd => "navigation_end",
            SoundCue::Error => "error",
            SoundCue::Success => "success",
        }
    }
}

/// Sink for spoken output
pub trait Announcer: Send + Sync {
    fn speak(&self, text: &str, priority: Priority, interrupt: bool);

    fn play_sound(&self, cue: SoundCue);
}

/// One announcement as produced by the navigator
#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    Speech { text: String, priority: Priority, interrupt: bool },
    Sound(SoundCue),
}

impl Announcement {
    pub fn speech(text: impl Into<String>) -> Self {
        Announcement::Speech { text: text.into(), priority: Priority::NORMAL, interrupt: false }
    }

    pub fn guidance(text: impl Into<String>) -> Self {
        Announcement::Speech { text: text.into(), priority: Priority::GUIDANCE, interrupt: false }
    }

    pub fn urgent(text: impl Into<String>) -> Self {
        Announcement::Speech { text: text.into(), priority: Priority::URGENT, interrupt: true }
    }

    /// Hand this announcement to `announcer`
    pub fn deliver(&self, announcer: &dyn Announcer) {
        match self {
            Announcement::Speech { text, priority, interrupt } => {
                announcer.speak(text, *priority, *interrupt)
            }
            Announcement::Sound(cue) => announcer.play_sound(*cue),
        }
    }
}

/// "{instruction}, {d} meters", or just the instruction when the distance rounds to zero
pub fn instruction_text(instruction: &str, distance_m: f64) -> String {
    let instruction = if instruction.trim().is_empty() { "Continue straight" } else { instruction };
    if distance_m.round() >= 1.0 {
        format!("{instruction}, {distance_m:.0} meters")
    } else {
        instruction.to_string()
    }
}

/// Announcer that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnnouncer;

impl Announcer for TracingAnnouncer {
    fn speak(&self, text: &str, priority: Priority, interrupt: bool) {
        info!(text = %text, priority = %priority.0, interrupt = %interrupt, "speak");
    }

    fn play_sound(&self, cue: SoundCue) {
        info!(cue = %cue.as_str(), "play_sound");
    }
}
