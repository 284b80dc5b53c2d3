//! # Status indicator configuration.
//!
//! [`StatusSpec`] describes the persistent, user-visible indicator that keeps
//! the worker process in the foreground. [`StatusOverrides`] is a partial spec
//! merged field-by-field over a base (defaults at start, current spec on update).
//!
//! ## Sticky semantics
//! - `sticky = true`: if the user dismisses the indicator, the worker re-shows
//!   the identical indicator without re-running task setup.
//! - `sticky = false`: dismissal is allowed and inert; the worker keeps running
//!   with no visible indicator.

use crate::ipc::Payload;

/// Importance level of the indicator's channel (`0..=4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Importance {
    None = 0,
    Min = 1,
    #[default]
    Low = 2,
    Default = 3,
    High = 4,
}

impl Importance {
    /// Maps a raw level; values above 4 saturate to [`Importance::High`].
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => Importance::None,
            1 => Importance::Min,
            2 => Importance::Low,
            3 => Importance::Default,
            _ => Importance::High,
        }
    }

    #[inline]
    pub fn level(self) -> u8 {
        self as u8
    }
}

/// Full indicator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSpec {
    pub channel_id: String,
    pub channel_name: String,
    pub title: String,
    pub text: String,
    pub importance: Importance,
    /// Re-show on dismissal.
    pub sticky: bool,
}

impl Default for StatusSpec {
    fn default() -> Self {
        Self {
            channel_id: "headless_channel".to_string(),
            channel_name: "Headless Task".to_string(),
            title: "Background work in progress".to_string(),
            text: "Working in background!".to_string(),
            importance: Importance::Low,
            sticky: false,
        }
    }
}

impl StatusSpec {
    /// Returns a copy with every set field of `overrides` applied.
    pub fn merged(&self, overrides: &StatusOverrides) -> Self {
        let mut out = self.clone();
        if let Some(v) = &overrides.channel_id {
            out.channel_id.clone_from(v);
        }
        if let Some(v) = &overrides.channel_name {
            out.channel_name.clone_from(v);
        }
        if let Some(v) = &overrides.title {
            out.title.clone_from(v);
        }
        if let Some(v) = &overrides.text {
            out.text.clone_from(v);
        }
        if let Some(v) = overrides.importance {
            out.importance = v;
        }
        if let Some(v) = overrides.sticky {
            out.sticky = v;
        }
        out
    }
}

/// Partial [`StatusSpec`]; unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOverrides {
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub importance: Option<Importance>,
    pub sticky: Option<bool>,
}

impl StatusOverrides {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn sticky(mut self, sticky: bool) -> Self {
        self.sticky = Some(sticky);
        self
    }

    pub fn importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn channel(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.channel_id = Some(id.into());
        self.channel_name = Some(name.into());
        self
    }

    /// Encodes the set fields as a map payload (for `STATUS_UPDATE`).
    pub(crate) fn to_payload(&self) -> Payload {
        let mut entries: Vec<(&str, Payload)> = Vec::new();
        if let Some(v) = &self.channel_id {
            entries.push(("channelId", v.as_str().into()));
        }
        if let Some(v) = &self.channel_name {
            entries.push(("channelName", v.as_str().into()));
        }
        if let Some(v) = &self.title {
            entries.push(("title", v.as_str().into()));
        }
        if let Some(v) = &self.text {
            entries.push(("text", v.as_str().into()));
        }
        if let Some(v) = self.importance {
            entries.push(("importance", Payload::Int(i64::from(v.level()))));
        }
        if let Some(v) = self.sticky {
            entries.push(("sticky", v.into()));
        }
        Payload::map(entries)
    }

    /// Reads overrides from a map payload; wrongly typed fields are ignored.
    pub(crate) fn from_payload(payload: &Payload) -> Self {
        let text_field = |key: &str| payload.get(key).and_then(Payload::as_str).map(str::to_string);
        Self {
            channel_id: text_field("channelId"),
            channel_name: text_field("channelName"),
            title: text_field("title"),
            text: text_field("text"),
            importance: payload
                .get("importance")
                .and_then(Payload::as_i64)
                .map(Importance::from_level),
            sticky: payload.get("sticky").and_then(Payload::as_bool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unset_fields() {
        let base = StatusSpec::default();
        let merged = base.merged(&StatusOverrides::default().title("Syncing").sticky(true));
        assert_eq!(merged.title, "Syncing");
        assert!(merged.sticky);
        assert_eq!(merged.text, base.text);
        assert_eq!(merged.importance, Importance::Low);
    }

    #[test]
    fn test_overrides_survive_payload_encoding() {
        let o = StatusOverrides::default()
            .text("50%")
            .importance(Importance::High)
            .channel("sync", "Sync");
        assert_eq!(StatusOverrides::from_payload(&o.to_payload()), o);
    }

    #[test]
    fn test_importance_saturates() {
        assert_eq!(Importance::from_level(-3), Importance::None);
        assert_eq!(Importance::from_level(9), Importance::High);
        assert_eq!(Importance::Default.level(), 3);
    }
}
