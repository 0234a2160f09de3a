use crate::format::{percent, Paginator};
use crate::resolve::GuildRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SearchQuery {
    Owner(u64),
    Id(u64),
    Name(String),
}

fn parse_mention(input: &str) -> Option<u64> {
    let inner = input.strip_prefix("<@")?.strip_suffix('>')?;
    inner.strip_prefix('!').unwrap_or(inner).parse().ok()
}

impl SearchQuery {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Some(id) = parse_mention(input) {
            Self::Owner(id)
        } else if let Ok(id) = input.parse() {
            Self::Id(id)
        } else {
            Self::Name(input.to_owned())
        }
    }

    pub fn matches(&self, guild: &GuildRecord) -> bool {
        match self {
            Self::Owner(owner) => guild.owner_id == *owner,
            Self::Id(id) => guild.owner_id == *id || guild.id == *id,
            Self::Name(name) => {
                let name = name.to_lowercase();
                let guild_name = guild.name.to_lowercase();
                guild_name.contains(&name) || name.contains(&guild_name)
            }
        }
    }
}

/// Pages of search results, or `None` when nothing matched.
pub(crate) fn search_pages(query: &SearchQuery, guilds: &[GuildRecord]) -> Option<Vec<String>> {
    let matches: Vec<_> = guilds.iter().filter(|g| query.matches(g)).collect();
    if matches.is_empty() {
        return None;
    }

    let mut paginator = Paginator::code_block("md", 1800);
    for (n, guild) in matches.iter().enumerate() {
        paginator.add_line(format!("{}. {} ({})", n + 1, guild.name, guild.id));
    }
    let mut pages = paginator.pages();

    if let SearchQuery::Owner(owner) = query {
        let share = percent(matches.len() as f64, guilds.len() as f64, 2);
        if let Some(first) = pages.first_mut() {
            *first = format!("<@{owner}> owns {share}% of the bot's servers:\n{first}");
        }
    }
    Some(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guilds() -> Vec<GuildRecord> {
        [(1, "Rust Lang", 10), (2, "Gophers", 20), (3, "rustaceans", 10), (4, "Cafe", 30)]
            .into_iter()
            .map(|(id, name, owner)| {
                let mut guild = GuildRecord::new(id, name, []);
                guild.owner_id = owner;
                guild
            })
            .collect()
    }

    #[test]
    fn parses_queries() {
        assert_eq!(SearchQuery::parse("<@10>"), SearchQuery::Owner(10));
        assert_eq!(SearchQuery::parse("<@!10>"), SearchQuery::Owner(10));
        assert_eq!(SearchQuery::parse("42"), SearchQuery::Id(42));
        assert_eq!(SearchQuery::parse("<@abc>"), SearchQuery::Name("<@abc>".to_owned()));
        assert_eq!(SearchQuery::parse(" rust "), SearchQuery::Name("rust".to_owned()));
    }

    #[test]
    fn owner_search_reports_share() {
        let pages = search_pages(&SearchQuery::Owner(10), &guilds()).unwrap();
        assert_eq!(
            pages,
            vec![
                "<@10> owns 50% of the bot's servers:\n\
                 ```md\n1. Rust Lang (1)\n2. rustaceans (3)\n```"
            ]
        );
    }

    #[test]
    fn id_search_matches_owner_or_guild() {
        let pages = search_pages(&SearchQuery::Id(30), &guilds()).unwrap();
        assert_eq!(pages, vec!["```md\n1. Cafe (4)\n```"]);
        let pages = search_pages(&SearchQuery::Id(2), &guilds()).unwrap();
        assert_eq!(pages, vec!["```md\n1. Gophers (2)\n```"]);
    }

    #[test]
    fn name_search_is_case_insensitive_both_ways() {
        let pages = search_pages(&SearchQuery::Name("RUST".to_owned()), &guilds()).unwrap();
        assert_eq!(pages, vec!["```md\n1. Rust Lang (1)\n2. rustaceans (3)\n```"]);
        let query = SearchQuery::Name("the cafe downtown".to_owned());
        let pages = search_pages(&query, &guilds()).unwrap();
        assert_eq!(pages, vec!["```md\n1. Cafe (4)\n```"]);
    }

    #[test]
    fn no_matches() {
        assert_eq!(search_pages(&SearchQuery::Name("python".to_owned()), &guilds()), None);
        assert_eq!(search_pages(&SearchQuery::Owner(99), &[]), None);
    }
}
