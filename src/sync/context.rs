//! View-wide state handed over once at startup.
//!
//! Replaces ambient globals: the view reads user settings and the self-promo
//! filter state from one context object built from the backend's
//! [`StartupState`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::FilterId;

/// Backend answer to the view's initialization request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupState {
    /// Boolean user settings by key.
    pub settings: BTreeMap<String, bool>,
    /// Every enabled filter, hidden ones included.
    pub enabled_filter_ids: Vec<FilterId>,
    /// Filter hidden from the catalog, toggled through its own switch.
    pub self_promo_filter_id: FilterId,
}

#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    settings: BTreeMap<String, bool>,
    self_promo_filter_id: FilterId,
    self_promo_enabled: bool,
}

impl ViewContext {
    pub fn from_startup(state: StartupState) -> Self {
        let self_promo_enabled = state
            .enabled_filter_ids
            .contains(&state.self_promo_filter_id);
        Self {
            settings: state.settings,
            self_promo_filter_id: state.self_promo_filter_id,
            self_promo_enabled,
        }
    }

    /// Value of a boolean user setting; unset keys read as `false`.
    pub fn setting(&self, key: &str) -> bool {
        self.settings.get(key).copied().unwrap_or(false)
    }

    pub(crate) fn set_setting(&mut self, key: &str, value: bool) {
        self.settings.insert(key.to_owned(), value);
    }

    pub fn self_promo_filter_id(&self) -> FilterId {
        self.self_promo_filter_id
    }

    /// Whether the hidden self-promo filter is on ("allow acceptable ads").
    pub fn self_promo_enabled(&self) -> bool {
        self.self_promo_enabled
    }

    /// The self-promo filter never appears in snapshots, so its state
    /// changes are tracked here instead of in the cache.
    pub(crate) fn set_self_promo_enabled(&mut self, enabled: bool) {
        self.self_promo_enabled = enabled;
    }
}
