use std::time::Duration;

use poise::CreateReply;
use serenity::all::{Colour, CreateEmbed, CreateEmbedFooter, GuildId, User, UserId};

use crate::format::{self, intcomma, Paginator};
use crate::invite::{self, Listing};
use crate::resolve::{self, GuildRecord, Token};
use crate::search::{self, SearchQuery};
use crate::{Context, Error};

const VANITY_REPLY_LIFETIME: Duration = Duration::from_secs(10);
const GROWTH_ROWS: usize = 60;

/// Guilds the bot is in, oldest join first.
fn guild_snapshot(ctx: Context<'_>) -> Vec<GuildRecord> {
    let cache = ctx.cache();
    let mut guilds: Vec<_> = cache
        .guilds()
        .into_iter()
        .filter_map(|id| cache.guild(id).map(|guild| GuildRecord::from(&*guild)))
        .collect();
    guilds.sort_by_key(|guild| (guild.joined_at, guild.id));
    guilds
}

fn guilds_with_member<'a>(
    ctx: Context<'_>,
    user: UserId,
    guilds: &'a [GuildRecord],
) -> Vec<&'a GuildRecord> {
    guilds
        .iter()
        .filter(|record| {
            ctx.cache()
                .guild(GuildId::new(record.id))
                .is_some_and(|guild| guild.members.contains_key(&user))
        })
        .collect()
}

fn resolve_guild(ctx: Context<'_>, input: &str) -> Result<GuildRecord, Error> {
    let guilds = guild_snapshot(ctx);
    match resolve::resolve(input, &guilds) {
        Ok(guild) => Ok(guild.clone()),
        Err(err) => {
            let suggestions: Vec<_> = resolve::suggest_names(input, &guilds)
                .into_iter()
                .map(|name| format!("`{name}`"))
                .collect();
            if suggestions.is_empty() {
                Err(err.into())
            } else {
                Err(anyhow::anyhow!("{err} Did you mean {}?", suggestions.join(", ")))
            }
        }
    }
}

async fn autocomplete_guild<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    resolve::suggest_names(partial, &guild_snapshot(ctx)).into_iter()
}

/// ✅ on the invoking message.
async fn acknowledge(ctx: Context<'_>) -> Result<(), Error> {
    match ctx {
        poise::Context::Prefix(prefix) => {
            prefix.msg.react(ctx, '✅').await?;
        }
        poise::Context::Application(_) => {
            ctx.say("✅").await?;
        }
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CommandCounts {
    single: usize,
    groups: usize,
    subcommands: usize,
}

fn count_commands<U, E>(commands: &[poise::Command<U, E>]) -> CommandCounts {
    fn walk<U, E>(commands: &[poise::Command<U, E>], nested: bool, counts: &mut CommandCounts) {
        for command in commands {
            if nested {
                counts.subcommands += 1;
            }
            if !command.subcommands.is_empty() {
                counts.groups += 1;
                walk(&command.subcommands, true, counts);
            }
        }
    }

    let mut counts = CommandCounts {
        single: commands.len(),
        ..Default::default()
    };
    walk(commands, false, &mut counts);
    counts
}

async fn send_pages(ctx: Context<'_>, pages: &[String]) -> Result<(), Error> {
    for page in pages {
        ctx.say(page.as_str()).await?;
    }
    Ok(())
}

async fn overview(ctx: Context<'_>) -> Result<(), Error> {
    let guilds = guild_snapshot(ctx);
    let (average, samples) = ctx.data().latency.read();
    let counts = count_commands(&ctx.framework().options.commands);

    let channels: usize = guilds.iter().map(|g| g.channel_ids.len()).sum();
    let emojis: usize = guilds.iter().map(|g| g.emoji_count).sum();
    let statistics = format!(
        "**Guilds:** {}\n\
         **Channels:** {}\n\
         **Users:** {}\n\
         **Emojis:** {}\n\
         **Average Ping:** `{:.3}ms`\n\
         \n\
         **Total single commands:** {}\n\
         **Total group commands:** {}\n\
         **Total sub commands:** {}",
        intcomma(guilds.len() as u64),
        intcomma(channels as u64),
        intcomma(ctx.cache().user_count() as u64),
        intcomma(emojis as u64),
        average,
        counts.single,
        counts.groups,
        counts.subcommands,
    );

    let banned = ctx.data().bans.banned().await.len();
    let uptime = (chrono::Utc::now() - ctx.data().loaded)
        .to_std()
        .unwrap_or_default();
    let info = format!(
        "**Loaded:** {} ago\n**Sampled Pings:** {}\n**Banned Servers:** {}\n**Version:** {}",
        humantime::format_duration(Duration::from_secs(uptime.as_secs())),
        intcomma(samples),
        banned,
        env!("CARGO_PKG_VERSION"),
    );

    let owners = format::rank_owners(&guilds, 10)
        .iter()
        .enumerate()
        .map(|(n, share)| {
            format!("{}. <@{}> ({}%)", n + 1, share.owner_id, share.percent)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let embed = CreateEmbed::new()
        .title(format!("You have: {} guilds.", guilds.len()))
        .field("All Statistics:", statistics, false)
        .field("Cog Info", info, false)
        .field(
            "Guild owners, sorted by number of servers they own that uses the bot:",
            if owners.is_empty() { "None".to_owned() } else { owners },
            false,
        )
        .footer(CreateEmbedFooter::new(chrono::Utc::now().to_rfc2822()));
    ctx.send(CreateReply::default().embed(embed)).await?;

    let mut paginator = Paginator::new("", "", 1990);
    for (n, guild) in guilds.iter().enumerate() {
        paginator.add_line(format!(
            "{}. {} (`{}`): {}",
            intcomma(n as u64 + 1),
            guild.name,
            guild.id,
            guild.member_count
        ));
    }
    let pages = paginator.pages();
    if !pages.is_empty() {
        let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
        poise::builtins::paginate(ctx, &pages).await?;
    }

    Ok(())
}

/// Shows a nice list of your bot's servers.
#[poise::command(
    prefix_command,
    slash_command,
    owners_only,
    aliases("servers", "gm", "sm"),
    subcommands("list", "invite", "leave", "mutual", "search", "growth", "ban", "unban")
)]
pub async fn guilds(ctx: Context<'_>) -> Result<(), Error> {
    overview(ctx).await
}

/// Shows a nice list of your bot's servers.
#[poise::command(prefix_command, slash_command, owners_only)]
async fn list(ctx: Context<'_>) -> Result<(), Error> {
    overview(ctx).await
}

/// Tries to get an invite to a guild.
///
/// Uses the vanity URL if there is one, then an existing invite that never
/// expires, and finally creates a single-use invite that lasts a minute.
#[poise::command(prefix_command, slash_command, owners_only)]
async fn invite(
    ctx: Context<'_>,
    #[description = "Guild name, ID, or one of its channel IDs"]
    #[autocomplete = autocomplete_guild]
    #[rest]
    guild: String,
) -> Result<(), Error> {
    let guild = resolve_guild(ctx, &guild)?;
    let http = &*ctx.serenity_context().http;

    if let Some(url) = invite::vanity_invite(http, &guild).await? {
        let handle = ctx.say(format!("Vanity Invite: <{url}>")).await?;
        tokio::time::sleep(VANITY_REPLY_LIFETIME).await;
        handle.delete(ctx).await?;
        return Ok(());
    }

    let listing = invite::existing_invite(http, &guild).await;
    let handle = ctx.say(invite::progress_message(&listing)).await?;
    match listing {
        Listing::Infinite(url) => {
            handle
                .edit(
                    ctx,
                    CreateReply::default().content(format!("Infinite Invite: {url}")),
                )
                .await?;
            return Ok(());
        }
        Listing::NoInfinite => {
            handle
                .edit(
                    ctx,
                    CreateReply::default().content("No Infinite Invites found - creating."),
                )
                .await?;
        }
        Listing::Forbidden => {}
    }

    let reason = format!(
        "Invite requested by {} via official management command. \
         Do not be alarmed, this is usually just to check something.",
        ctx.author().name
    );
    let url = invite::temporary_invite(http, &guild, &reason).await;
    handle
        .edit(
            ctx,
            CreateReply::default().content(invite::temporary_message(url.as_deref())),
        )
        .await?;

    Ok(())
}

/// Leaves a server.
#[poise::command(prefix_command, slash_command, owners_only, aliases("rem", "remove"))]
async fn leave(
    ctx: Context<'_>,
    #[description = "Guild name, ID, or one of its channel IDs"]
    #[autocomplete = autocomplete_guild]
    #[rest]
    guild: String,
) -> Result<(), Error> {
    let guild = resolve_guild(ctx, &guild)?;
    GuildId::new(guild.id).leave(&ctx.serenity_context().http).await?;
    tracing::info!("left guild {} ({})", guild.name, guild.id);
    acknowledge(ctx).await
}

/// Tells you how many guilds the bot shares with another user.
#[poise::command(prefix_command, slash_command, owners_only, aliases("in"))]
async fn mutual(
    ctx: Context<'_>,
    #[description = "User to look for"] user: User,
) -> Result<(), Error> {
    let guilds = guild_snapshot(ctx);
    let shared = guilds_with_member(ctx, user.id, &guilds);
    if shared.is_empty() {
        ctx.say("`0` mutual guilds.").await?;
        return Ok(());
    }

    let mut paginator = Paginator::code_block("md", 1900);
    for (n, guild) in shared.iter().enumerate() {
        paginator.add_line(format!("{}. {}", n + 1, guild.name));
    }
    let mut pages = paginator.pages();
    if let Some(first) = pages.first_mut() {
        *first = format!("`{}` mutual guilds:\n{first}", shared.len());
    }
    send_pages(ctx, &pages).await
}

/// Finds guilds by owner, ID, or name.
///
/// Mention a user to list the guilds they own, give an ID to match guild or
/// owner IDs, or anything else to match guild names.
#[poise::command(prefix_command, slash_command, owners_only, aliases("find", "query"))]
async fn search(
    ctx: Context<'_>,
    #[description = "Owner mention, guild or owner ID, or guild name"]
    #[rest]
    query: String,
) -> Result<(), Error> {
    let guilds = guild_snapshot(ctx);
    match search::search_pages(&SearchQuery::parse(&query), &guilds) {
        Some(pages) => send_pages(ctx, &pages).await,
        None => {
            ctx.say("No matches.").await?;
            Ok(())
        }
    }
}

/// Shows how many guilds the bot has been in over time.
#[poise::command(prefix_command, slash_command, owners_only, aliases("graph"))]
async fn growth(ctx: Context<'_>) -> Result<(), Error> {
    let guilds = guild_snapshot(ctx);
    let series = format::growth_series(guilds.iter().filter_map(|g| g.joined_at));
    let shown = &series[series.len().saturating_sub(GROWTH_ROWS)..];

    let embed = CreateEmbed::new()
        .title("Guilds over time")
        .colour(Colour::ORANGE)
        .description(format::growth_chart(shown));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Bans a server from using the bot.
///
/// If `leave_too` is true the bot leaves the server after banning it.
/// Otherwise it stays, but refuses every command there.
// Prefix only: an optional argument ahead of a required one can't be a slash command.
#[poise::command(prefix_command, owners_only)]
async fn ban(
    ctx: Context<'_>,
    leave_too: Option<bool>,
    #[rest] guild: String,
) -> Result<(), Error> {
    let guild = resolve_guild(ctx, &guild)?;
    let bans = &ctx.data().bans;

    let guilds = guild_snapshot(ctx);
    let author_guilds: Vec<u64> = guilds_with_member(ctx, ctx.author().id, &guilds)
        .iter()
        .map(|g| g.id)
        .collect();
    if bans.would_softlock(&author_guilds, guild.id).await {
        ctx.say("Unable to ban as this would softlock the bot.").await?;
        return Ok(());
    }

    if !bans.ban(guild.id).await? {
        ctx.say(format!("The server {} is already banned.", guild.id))
            .await?;
        return Ok(());
    }
    tracing::info!("banned guild {} ({})", guild.name, guild.id);

    if leave_too.unwrap_or(false) {
        GuildId::new(guild.id).leave(&ctx.serenity_context().http).await?;
        tracing::info!("left banned guild {}", guild.id);
    }

    ctx.say(format!("✅ banned the server {}.", guild.id)).await?;
    Ok(())
}

/// Unbans a server. See `ban`.
#[poise::command(prefix_command, slash_command, owners_only)]
async fn unban(
    ctx: Context<'_>,
    #[description = "Guild name or ID"]
    #[autocomplete = autocomplete_guild]
    #[rest]
    guild: String,
) -> Result<(), Error> {
    let token = Token::parse(&guild);
    let guild_id = match resolve_guild(ctx, &guild) {
        Ok(guild) => guild.id,
        Err(err) => token.as_id().ok_or(err)?,
    };

    if !ctx.data().bans.unban(guild_id).await? {
        ctx.say(format!("The server {guild_id} is not banned.")).await?;
        return Ok(());
    }
    tracing::info!("unbanned guild {guild_id}");

    ctx.say(format!("✅ unbanned the server {guild_id}.")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type Command = poise::Command<(), anyhow::Error>;

    fn group(subcommands: Vec<Command>) -> Command {
        Command {
            subcommands,
            ..Default::default()
        }
    }

    #[test]
    fn counts_commands_like_a_tree() {
        let commands = vec![
            Command::default(),
            group(vec![
                Command::default(),
                group(vec![Command::default(), Command::default()]),
            ]),
        ];
        assert_eq!(
            count_commands(&commands),
            CommandCounts {
                single: 2,
                groups: 2,
                subcommands: 4,
            }
        );
    }

    #[test]
    fn guilds_group_has_every_subcommand() {
        let root = guilds();
        let names: Vec<_> = root.subcommands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            ["list", "invite", "leave", "mutual", "search", "growth", "ban", "unban"]
        );
        assert!(root.owners_only);
        assert!(root.subcommands.iter().all(|c| c.owners_only));
        assert_eq!(root.aliases, ["servers", "gm", "sm"]);
    }

    #[test]
    fn everything_but_ban_is_a_slash_command() {
        let root = guilds();
        assert!(root.prefix_action.is_some());
        for command in &root.subcommands {
            assert!(command.prefix_action.is_some(), "{}", command.name);
            let is_slash = command.slash_action.is_some();
            assert_eq!(is_slash, command.name != "ban", "{}", command.name);
        }
    }

    #[test]
    fn guild_arguments_autocomplete() {
        let root = guilds();
        for name in ["invite", "leave", "unban"] {
            let command = root.subcommands.iter().find(|c| c.name == name).unwrap();
            assert!(command.parameters[0].autocomplete_callback.is_some(), "{name}");
        }
    }
}
