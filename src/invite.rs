use serenity::all::{ChannelId, CreateInvite, GuildId, Http};

use crate::resolve::GuildRecord;

pub(crate) const TEMP_INVITE_MAX_AGE: u32 = 60;
pub(crate) const TEMP_INVITE_MAX_USES: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Listing {
    /// The bot can't see the guild's invites.
    Forbidden,
    Infinite(String),
    NoInfinite,
}

/// First status line of the invite lookup.
pub(crate) fn progress_message(listing: &Listing) -> &'static str {
    match listing {
        Listing::Forbidden => "Attempting to create an invite.",
        Listing::Infinite(_) | Listing::NoInfinite => "Attempting to find an invite.",
    }
}

/// URL of the first invite that never expires.
pub(crate) fn first_infinite<'a>(
    invites: impl IntoIterator<Item = (u32, &'a str)>,
) -> Option<String> {
    invites
        .into_iter()
        .find(|(max_age, _)| *max_age == 0)
        .map(|(_, url)| url.to_owned())
}

pub(crate) async fn vanity_invite(
    http: &Http,
    guild: &GuildRecord,
) -> anyhow::Result<Option<String>> {
    if !guild.has_feature("VANITY_URL") {
        return Ok(None);
    }
    let url = GuildId::new(guild.id).vanity_url(http).await?;
    Ok(Some(url))
}

pub(crate) async fn existing_invite(http: &Http, guild: &GuildRecord) -> Listing {
    let invites = match GuildId::new(guild.id).invites(http).await {
        Ok(invites) => invites,
        Err(err) => {
            tracing::debug!("cannot list invites of {}: {err}", guild.id);
            return Listing::Forbidden;
        }
    };
    let urls: Vec<_> = invites.iter().map(|i| (i.max_age, i.url())).collect();
    match first_infinite(urls.iter().map(|(age, url)| (*age, url.as_str()))) {
        Some(url) => Listing::Infinite(url),
        None => Listing::NoInfinite,
    }
}

/// Creates a single-use invite in the first text channel that allows it.
pub(crate) async fn temporary_invite(
    http: &Http,
    guild: &GuildRecord,
    reason: &str,
) -> Option<String> {
    for channel in &guild.text_channels {
        let builder = CreateInvite::new()
            .max_age(TEMP_INVITE_MAX_AGE)
            .max_uses(TEMP_INVITE_MAX_USES)
            .unique(true)
            .audit_log_reason(reason);
        match ChannelId::new(*channel).create_invite(http, builder).await {
            Ok(invite) => return Some(invite.url()),
            Err(err) => tracing::debug!("cannot create invite in {channel}: {err}"),
        }
    }
    None
}

pub(crate) fn temporary_message(url: Option<&str>) -> String {
    match url {
        Some(url) => format!(
            "Temp invite: {url} -> max age: {TEMP_INVITE_MAX_AGE}s, \
             max uses: {TEMP_INVITE_MAX_USES}"
        ),
        None => "Unable to create an invite - missing permissions.".to_owned(),
    }
}
