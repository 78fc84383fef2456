//! Domain models: live browser entities and the active-window records kept about them

mod browser;
mod window;

pub use browser::{
    BrowserTab, BrowserTabGroup, BrowserWindow, TabGroupColor, TabGroupId, TabId, WindowId,
    WindowKind,
};
pub use window::{
    ActiveWindow, ActiveWindowPatch, ActiveWindowTabGroup, FocusMode, FocusModeColors,
    SavedTabGroupColor, TabGroupPatch,
};

use serde::{Deserialize, Deserializer};

/// Deserialize a field that is present (including as `null`) into `Some(..)`.
///
/// Paired with `#[serde(default)]` this tells "absent" from "explicitly null"
/// for `Option<Option<T>>` fields in patches and change payloads.
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
