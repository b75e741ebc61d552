//! Hands out roles to members whose custom status contains a configured text.

use {
    std::collections::BTreeMap,
    itertools::Itertools as _,
    serde::{
        Deserialize,
        Serialize,
    },
    serenity::{
        builder::{
            CreateEmbed,
            CreateMessage,
        },
        framework::standard::{
            Args,
            CommandResult,
            macros::command,
        },
        model::prelude::*,
        prelude::*,
    },
    tracing::warn,
    crate::parse,
};

/// Discord caps custom statuses at 128 characters, so longer texts could never match.
pub const MAX_TEXT_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("a required status text can't be more than {MAX_TEXT_LEN} characters due to maximum status lengths")]
    TextTooLong,
    #[error("that text has not been added yet")]
    UnknownText,
}

/// The status-role rules of one guild: required text → role to assign.
/// Texts are stored lowercased and matched as substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Rules(BTreeMap<String, RoleId>);

impl Rules {
    pub fn add(&mut self, text: &str, role: RoleId) -> Result<(), Error> {
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(Error::TextTooLong)
        }
        self.0.insert(text.to_lowercase(), role);
        Ok(())
    }

    pub fn remove(&mut self, text: &str) -> Result<RoleId, Error> {
        self.0.remove(&text.to_lowercase()).ok_or(Error::UnknownText)
    }

    /// Every role whose required text occurs in the given status.
    pub fn matches(&self, status: &str) -> Vec<RoleId> {
        let status = status.to_lowercase();
        self.0.iter()
            .filter(|&(text, _)| status.contains(text.as_str()))
            .map(|(_, &role)| role)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RoleId)> {
        self.0.iter().map(|(text, &role)| (text.as_str(), role))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-guild rule sets, seeded from the config file. Also serves as `typemap`
/// key for itself.
#[derive(Debug, Default)]
pub struct Store(pub BTreeMap<GuildId, Rules>);

impl Store {
    pub fn new(seed: BTreeMap<GuildId, Rules>) -> Store {
        Store(seed)
    }
}

impl TypeMapKey for Store {
    type Value = Store;
}

/// Handles a presence update: if the member's custom status contains any of
/// the guild's configured texts, they get the corresponding roles. Per-role
/// failures (e.g. missing permissions) are logged and skipped.
pub async fn handle_presence(ctx: &Context, presence: &Presence) -> Result<(), crate::Error> {
    if presence.user.bot.unwrap_or(false) { return Ok(()) }
    let Some(guild_id) = presence.guild_id else { return Ok(()) };
    let Some(status) = presence.activities.iter()
        .find(|activity| activity.kind == ActivityType::Custom)
        .and_then(|activity| activity.state.as_deref())
    else { return Ok(()) };
    let roles = {
        let data = ctx.data.read().await;
        let store = data.get::<Store>().ok_or(crate::Error::MissingStore)?;
        store.0.get(&guild_id).map(|rules| rules.matches(status)).unwrap_or_default()
    };
    for role in roles {
        if let Err(e) = ctx.http.add_member_role(guild_id, presence.user.id, role, Some("member has a set text in their status")).await {
            warn!(%guild_id, %role, "failed to assign status role: {e}");
        }
    }
    Ok(())
}

#[command("add")]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn sr_add(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let mut cmd = args.message();
    let Some(role) = parse::eat_role_mention(&mut cmd) else {
        msg.reply(ctx, "You must mention the role to assign.").await?;
        return Ok(())
    };
    let text = cmd.trim();
    if text.is_empty() {
        msg.reply(ctx, "You must include the status text that should trigger the role.").await?;
        return Ok(())
    }
    let reply = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<Store>().expect("missing status role store");
        match store.0.entry(guild_id).or_default().add(text, role) {
            Ok(()) => format!("You will now get the role {} if your status contains `{}`.", role.mention(), text.to_lowercase()),
            Err(e) => e.to_string(),
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command("remove")]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn sr_remove(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let text = args.message().trim();
    if text.is_empty() {
        msg.reply(ctx, "You must include the status text to remove.").await?;
        return Ok(())
    }
    let reply = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<Store>().expect("missing status role store");
        match store.0.entry(guild_id).or_default().remove(text) {
            Ok(role) => format!("You will no longer get the role {} with the text `{}`.", role.mention(), text.to_lowercase()),
            Err(e) => e.to_string(),
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command("list")]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn sr_list(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let lines = {
        let data = ctx.data.read().await;
        let store = data.get::<Store>().expect("missing status role store");
        store.0.get(&guild_id)
            .filter(|rules| !rules.is_empty())
            .map(|rules| rules.iter().map(|(text, role)| format!("**{text}**, {}", role.mention())).join("\n"))
    };
    match lines {
        Some(lines) => {
            let embed = CreateEmbed::new().title("Status roles").description(lines);
            msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
        }
        None => { msg.reply(ctx, "This server has no status roles.").await?; }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lowercases_and_limits_length() {
        let mut rules = Rules::default();
        rules.add("Gaming Tonight", RoleId::new(1)).unwrap();
        assert_eq!(rules.iter().next(), Some(("gaming tonight", RoleId::new(1))));
        assert_eq!(rules.add(&"x".repeat(MAX_TEXT_LEN + 1), RoleId::new(2)), Err(Error::TextTooLong));
        assert!(rules.add(&"x".repeat(MAX_TEXT_LEN), RoleId::new(2)).is_ok());
    }

    #[test]
    fn remove_reports_unknown_texts() {
        let mut rules = Rules::default();
        rules.add("afk", RoleId::new(1)).unwrap();
        assert_eq!(rules.remove("AFK"), Ok(RoleId::new(1)));
        assert_eq!(rules.remove("afk"), Err(Error::UnknownText));
    }

    #[test]
    fn matches_substrings_case_insensitively() {
        let mut rules = Rules::default();
        rules.add("gaming", RoleId::new(1)).unwrap();
        rules.add("stream", RoleId::new(2)).unwrap();
        assert_eq!(rules.matches("GAMING and streaming all day"), vec![RoleId::new(1), RoleId::new(2)]);
        assert_eq!(rules.matches("sleeping"), Vec::<RoleId>::new());
        assert_eq!(rules.matches("on stream"), vec![RoleId::new(2)]);
    }
}
