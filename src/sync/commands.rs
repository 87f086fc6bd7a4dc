//! View -> backend command vocabulary and replies.
//!
//! Commands are identified on the wire by a `type` discriminator. Only the
//! snapshot fetch, the startup request and the custom-filter lookup carry a
//! reply; everything else is fire-and-forget and its effect comes back as a
//! [`SyncEvent`](super::events::SyncEvent).

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::context::StartupState;
use crate::catalog::{CatalogSnapshot, FilterId, GroupId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "initializeOptionsPage")]
    InitializeOptionsPage,
    #[serde(rename = "getFiltersMetadata")]
    GetFiltersMetadata,
    #[serde(rename = "addAndEnableFilter", rename_all = "camelCase")]
    EnableFilter {
        #[serde(deserialize_with = "lenient_id")]
        filter_id: FilterId,
    },
    #[serde(rename = "disableFilter", rename_all = "camelCase")]
    DisableFilter {
        #[serde(deserialize_with = "lenient_id")]
        filter_id: FilterId,
    },
    #[serde(rename = "addAndEnableFiltersByGroupId", rename_all = "camelCase")]
    EnableGroup {
        #[serde(deserialize_with = "lenient_id")]
        group_id: GroupId,
    },
    #[serde(rename = "disableAntiBannerFiltersByGroupId", rename_all = "camelCase")]
    DisableGroup {
        #[serde(deserialize_with = "lenient_id")]
        group_id: GroupId,
    },
    #[serde(rename = "removeAntiBannerFilter", rename_all = "camelCase")]
    RemoveFilter {
        #[serde(deserialize_with = "lenient_id")]
        filter_id: FilterId,
    },
    #[serde(rename = "checkAntiBannerFiltersUpdate")]
    CheckFiltersUpdate,
    #[serde(rename = "changeUserSetting")]
    ChangeUserSetting { key: String, value: bool },
    #[serde(rename = "loadCustomFilterInfo")]
    LoadCustomFilterInfo { url: String },
}

impl Command {
    /// Wire discriminator, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::InitializeOptionsPage => "initializeOptionsPage",
            Command::GetFiltersMetadata => "getFiltersMetadata",
            Command::EnableFilter { .. } => "addAndEnableFilter",
            Command::DisableFilter { .. } => "disableFilter",
            Command::EnableGroup { .. } => "addAndEnableFiltersByGroupId",
            Command::DisableGroup { .. } => "disableAntiBannerFiltersByGroupId",
            Command::RemoveFilter { .. } => "removeAntiBannerFilter",
            Command::CheckFiltersUpdate => "checkAntiBannerFiltersUpdate",
            Command::ChangeUserSetting { .. } => "changeUserSetting",
            Command::LoadCustomFilterInfo { .. } => "loadCustomFilterInfo",
        }
    }
}

/// Ids sometimes arrive as strings (read back from markup attributes).
fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Metadata of a list fetched for the custom-filter flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFilterInfo {
    pub filter_id: FilterId,
    pub name: String,
    pub description: String,
    pub version: String,
    pub rules_count: u64,
    pub homepage: String,
    pub custom_url: String,
}

/// Why a custom filter could not be added. Nothing is stored in that case.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "camelCase")]
pub enum CustomFilterError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("could not download the list: {0}")]
    Unreachable(String),
    #[error("not a filter list")]
    NotAFilterList,
    #[error("could not store the filter: {0}")]
    Storage(String),
}

pub type CustomFilterOutcome = Result<CustomFilterInfo, CustomFilterError>;

/// Wire form of a [`CustomFilterOutcome`]: an explicit `ok` flag instead of
/// an empty response on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFilterReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<CustomFilterInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CustomFilterError>,
}

impl From<CustomFilterOutcome> for CustomFilterReply {
    fn from(outcome: CustomFilterOutcome) -> Self {
        match outcome {
            Ok(info) => Self {
                ok: true,
                filter: Some(info),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                filter: None,
                error: Some(e),
            },
        }
    }
}

/// Backend answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Fire-and-forget command accepted.
    Ack,
    Startup(StartupState),
    Snapshot(CatalogSnapshot),
    CustomFilter(CustomFilterOutcome),
}
