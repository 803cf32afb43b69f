//! Gateway event intents.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::ConfigError;

/// Category of gateway events a bot subscribes to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Intent {
    /// Guild create/update/delete, channel create/update/delete.
    Guilds,
    /// Guild member add/update/remove.
    GuildMembers,
    /// All guild messages (private bots only).
    GuildMessages,
    /// Message reaction add/remove.
    GuildMessageReactions,
    /// Direct messages.
    DirectMessage,
    /// Forum events for public bots.
    OpenForumsEvent,
    /// Audio or live channel member enter/exit.
    AudioOrLiveChannelMember,
    /// Group chat and C2C messages.
    #[serde(rename = "GROUP_AND_C2C_EVENT")]
    #[strum(to_string = "GROUP_AND_C2C_EVENT")]
    GroupAndC2cEvent,
    /// Interaction callbacks.
    Interaction,
    /// Message audit pass/reject.
    MessageAudit,
    /// Forum events (private bots only).
    ForumsEvent,
    /// Audio playback events.
    AudioAction,
    /// Messages that @-mention the bot.
    PublicGuildMessages,
}

impl Intent {
    /// Bit this intent occupies in the identify bitmask.
    pub const fn bit(self) -> u32 {
        match self {
            Intent::Guilds => 1 << 0,
            Intent::GuildMembers => 1 << 1,
            Intent::GuildMessages => 1 << 9,
            Intent::GuildMessageReactions => 1 << 10,
            Intent::DirectMessage => 1 << 12,
            Intent::OpenForumsEvent => 1 << 18,
            Intent::AudioOrLiveChannelMember => 1 << 19,
            Intent::GroupAndC2cEvent => 1 << 25,
            Intent::Interaction => 1 << 26,
            Intent::MessageAudit => 1 << 27,
            Intent::ForumsEvent => 1 << 28,
            Intent::AudioAction => 1 << 29,
            Intent::PublicGuildMessages => 1 << 30,
        }
    }

    /// OR a list of intents into one bitmask.
    pub fn fold(intents: &[Intent]) -> u32 {
        intents.iter().fold(0, |bits, intent| bits | intent.bit())
    }

    /// Intents whose bits are set in `bits`.
    pub fn from_bits(bits: u32) -> Vec<Intent> {
        Intent::iter().filter(|i| bits & i.bit() != 0).collect()
    }
}

/// Parse a comma-separated intent list such as `GUILDS, PUBLIC_GUILD_MESSAGES`.
///
/// Blank entries are skipped; duplicates are dropped keeping first position.
pub fn parse_intents(raw: &str) -> Result<Vec<Intent>, ConfigError> {
    let mut intents = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let intent =
            Intent::from_str(name).map_err(|_| ConfigError::UnknownIntent(name.to_string()))?;
        if !intents.contains(&intent) {
            intents.push(intent);
        }
    }
    Ok(intents)
}
