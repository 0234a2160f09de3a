use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serenity::all::{ChannelType, Guild};

/// Snapshot of a guild copied out of the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildRecord {
    pub id: u64,
    pub name: String,
    pub channel_ids: HashSet<u64>,
    pub owner_id: u64,
    pub member_count: u64,
    pub emoji_count: usize,
    pub joined_at: Option<DateTime<Utc>>,
    pub features: Vec<String>,
    /// Text channels ordered by position.
    pub text_channels: Vec<u64>,
}

impl GuildRecord {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        channel_ids: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            channel_ids: channel_ids.into_iter().collect(),
            owner_id: 0,
            member_count: 0,
            emoji_count: 0,
            joined_at: None,
            features: Vec::new(),
            text_channels: Vec::new(),
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

impl From<&Guild> for GuildRecord {
    fn from(guild: &Guild) -> Self {
        let mut text_channels: Vec<_> = guild
            .channels
            .values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .map(|channel| (channel.position, channel.id.get()))
            .collect();
        text_channels.sort_unstable();

        Self {
            owner_id: guild.owner_id.get(),
            member_count: guild.member_count,
            emoji_count: guild.emojis.len(),
            joined_at: DateTime::from_timestamp(guild.joined_at.unix_timestamp(), 0),
            features: guild.features.clone(),
            text_channels: text_channels.into_iter().map(|(_, id)| id).collect(),
            ..Self::new(
                guild.id.get(),
                guild.name.clone(),
                guild.channels.keys().map(|id| id.get()),
            )
        }
    }
}

/// User input naming a guild, classified before it reaches a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    NumericId(u64),
    Text(String),
}

impl Token {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.parse() {
            Ok(id) => Self::NumericId(id),
            Err(_) => Self::Text(input.to_owned()),
        }
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            Self::NumericId(id) => Some(*id),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NumericId(id) => write!(f, "{id}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unable to convert \"{0}\" to a guild.")]
    NotFound(String),
}

fn matches(token: &str, candidate: &GuildRecord) -> bool {
    let lowered = token.to_lowercase();
    let name = candidate.name.to_lowercase();
    if name.contains(&lowered) || lowered.contains(&name) {
        return true;
    }
    if candidate.id.to_string() == token {
        return true;
    }
    token
        .parse::<u64>()
        .is_ok_and(|id| candidate.channel_ids.contains(&id))
}

/// Picks the first guild whose name overlaps `token`, whose ID is `token`, or
/// which owns the channel `token`.
pub fn resolve<'a>(
    token: &str,
    candidates: impl IntoIterator<Item = &'a GuildRecord>,
) -> Result<&'a GuildRecord, ResolveError> {
    candidates
        .into_iter()
        .find(|candidate| matches(token, candidate))
        .ok_or_else(|| ResolveError::NotFound(token.to_owned()))
}

/// Best three fuzzy matches of `needle` among `haystack`, best first.
pub fn fuzzy_search<'b, T>(
    needle: &'b str,
    haystack: impl Iterator<Item = T> + 'b,
    key: impl Fn(&T) -> &str,
) -> Vec<(i64, T)> {
    static MATCHER: LazyLock<SkimMatcherV2> =
        LazyLock::new(|| SkimMatcherV2::default().smart_case().use_cache(true));
    let mut scores: Vec<_> = haystack
        .filter_map(|s| MATCHER.fuzzy_match(key(&s), needle).map(|score| (score, s)))
        .collect();
    scores.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
    scores.truncate(3);
    scores
}

/// Names of the guilds closest to `partial`, best first.
pub fn suggest_names(partial: &str, guilds: &[GuildRecord]) -> Vec<String> {
    fuzzy_search(partial, guilds.iter(), |g| &g.name)
        .into_iter()
        .map(|(_, guild)| guild.name.clone())
        .collect()
}
