//! Live browser entities as reported by the window/tab service

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Browser window identifier, stable for the lifetime of the window
    WindowId
);
entity_id!(
    /// Tab identifier, stable across window moves
    TabId
);
entity_id!(
    /// Tab group identifier
    TabGroupId
);

/// Colors a browser tab group can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabGroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl TabGroupColor {
    /// Every color, in the order the browser lists them
    pub const ALL: [TabGroupColor; 9] = [
        TabGroupColor::Grey,
        TabGroupColor::Blue,
        TabGroupColor::Red,
        TabGroupColor::Yellow,
        TabGroupColor::Green,
        TabGroupColor::Pink,
        TabGroupColor::Purple,
        TabGroupColor::Cyan,
        TabGroupColor::Orange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TabGroupColor::Grey => "grey",
            TabGroupColor::Blue => "blue",
            TabGroupColor::Red => "red",
            TabGroupColor::Yellow => "yellow",
            TabGroupColor::Green => "green",
            TabGroupColor::Pink => "pink",
            TabGroupColor::Purple => "purple",
            TabGroupColor::Cyan => "cyan",
            TabGroupColor::Orange => "orange",
        }
    }
}

impl fmt::Display for TabGroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TabGroupColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TabGroupColor::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown tab group color: {}", s))
    }
}

/// Kind of browser window; only normal windows are ever managed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Normal,
    Popup,
    Panel,
    App,
    Devtools,
}

/// A live browser window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserWindow {
    pub id: WindowId,
    pub focused: bool,
    #[serde(default)]
    pub kind: WindowKind,
}

/// A live browser tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    pub id: TabId,
    pub window_id: WindowId,
    /// Position within the window's tab strip
    pub index: usize,
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    pub group_id: Option<TabGroupId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A live browser tab group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTabGroup {
    pub id: TabGroupId,
    pub window_id: WindowId,
    pub color: TabGroupColor,
    pub collapsed: bool,
    #[serde(default)]
    pub title: Option<String>,
}

impl BrowserTabGroup {
    /// Title with the browser's "no title" convention normalized to `None`
    pub fn title_text(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_round_trip_str() {
        for color in TabGroupColor::ALL {
            assert_eq!(color.as_str().parse::<TabGroupColor>().unwrap(), color);
        }
        assert!("magenta".parse::<TabGroupColor>().is_err());
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&TabGroupId::new(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_tab_group_wire_format() {
        let group = BrowserTabGroup {
            id: TabGroupId::new(7),
            window_id: WindowId::new(1),
            color: TabGroupColor::Cyan,
            collapsed: true,
            title: Some(String::new()),
        };
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["windowId"], 1);
        assert_eq!(json["color"], "cyan");
        assert_eq!(group.title_text(), None);
    }
}
