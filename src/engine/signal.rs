use serde::{Deserialize, Serialize};

use crate::display::{DisplayId, NaturalOrientation, Rotation};

/// A platform notification that something on screen may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// Accessibility event on a display. Re-reads every platform fact for
    /// that display and, when worthwhile, the window list.
    Accessibility { display: DisplayId },
    /// The window list changed; rebuild the snapshot unconditionally.
    WindowsChanged { display: DisplayId },
    ScreenPower { display: DisplayId, on: bool },
    Keyguard { locked: bool },
    NotificationCount { count: u32 },
    Keyboard { display: DisplayId, showing: bool },
    Rotation {
        display: DisplayId,
        rotation: Rotation,
        #[serde(default)]
        natural: NaturalOrientation,
    },
}

/// Serial lane a signal runs on. Signals sharing a strand never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Global,
    Display(DisplayId),
}

impl Signal {
    pub fn display(&self) -> Option<DisplayId> {
        match *self {
            Signal::Accessibility { display }
            | Signal::WindowsChanged { display }
            | Signal::ScreenPower { display, .. }
            | Signal::Keyboard { display, .. }
            | Signal::Rotation { display, .. } => Some(display),
            Signal::Keyguard { .. } | Signal::NotificationCount { .. } => None,
        }
    }

    pub fn strand(&self) -> Strand {
        self.display().map_or(Strand::Global, Strand::Display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_facts_share_one_strand() {
        assert_eq!(Signal::Keyguard { locked: true }.strand(), Strand::Global);
        assert_eq!(Signal::NotificationCount { count: 2 }.strand(), Strand::Global);
        assert_eq!(
            Signal::ScreenPower {
                display: DisplayId(3),
                on: true
            }
            .strand(),
            Strand::Display(DisplayId(3))
        );
    }

    #[test]
    fn parses_tagged_json() {
        let signal: Signal =
            serde_json::from_str(r#"{"kind":"rotation","display":0,"rotation":"90"}"#)
                .expect("parse signal");
        assert_eq!(
            signal,
            Signal::Rotation {
                display: DisplayId::DEFAULT,
                rotation: Rotation::R90,
                natural: NaturalOrientation::Portrait,
            }
        );
    }
}
