//! The collaborative counting game: numbers must be spelled out in English words.

use {
    std::collections::HashMap,
    serde::{
        Deserialize,
        Serialize,
    },
    serenity::{
        builder::{
            CreateEmbed,
            CreateEmbedAuthor,
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
    crate::parse,
};

/// The highest count an operator may set via `setcount`.
pub const MAX_COUNT: u64 = 999_999_999;
/// The highest number the suffix table can spell out (billions).
pub const MAX_SPELLABLE: u64 = 999_999_999_999;

const UNDER_TWENTY: [&str; 20] = [
    "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
];

const TENS: [&str; 10] = ["", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];

/// Magnitude suffixes for base-1000 groups, lowest first. The empty entry is the base group.
const SUFFIXES: [&str; 4] = ["", "thousand", "million", "billion"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("numbers of a trillion or more can't be spelled out")]
    UnsupportedMagnitude,
    #[error("the count must be between 1 and 999,999,999")]
    OutOfRange,
    #[error("word counting is not enabled in this guild")]
    InvalidState,
}

/// Spells out `n` in lowercase English words, without "and" or hyphens.
///
/// Zero is spelled `zero` even though it never comes up in a running game.
pub fn words_for(n: u64) -> Result<String, Error> {
    if n > MAX_SPELLABLE {
        return Err(Error::UnsupportedMagnitude)
    }
    if n == 0 {
        return Ok(format!("zero"))
    }
    let mut groups = Vec::default();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }
    let mut words = Vec::default();
    for (magnitude, &group) in groups.iter().enumerate().rev() {
        // all-zero groups contribute neither words nor their suffix
        if group == 0 { continue }
        words.push(group_words(group));
        if magnitude > 0 {
            words.push(SUFFIXES[magnitude].to_owned());
        }
    }
    Ok(words.join(" "))
}

/// Renders a single base-1000 group in `1..=999`.
fn group_words(group: u64) -> String {
    let group = group as usize;
    if group < 20 {
        UNDER_TWENTY[group].to_owned()
    } else if group < 100 {
        let (tens, ones) = (group / 10, group % 10);
        if ones == 0 {
            TENS[tens].to_owned()
        } else {
            format!("{} {}", TENS[tens], UNDER_TWENTY[ones])
        }
    } else {
        let rest = group % 100;
        if rest == 0 {
            format!("{} hundred", UNDER_TWENTY[group / 100])
        } else {
            format!("{} hundred {}", UNDER_TWENTY[group / 100], group_words(rest as u64))
        }
    }
}

/// Lowercases a submission and strips the "and" connective and hyphens, so
/// that e.g. `Twenty-three` and `twenty and three` compare equal to the
/// spelling `words_for` produces.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().replace(" and ", " ").replace('-', " ")
}

/// Formats `n` with thousands separators for user-facing messages.
pub fn humanize(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// The outcome of a single submission. `Rejected` and `Ignored` are normal
/// verdicts, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted { new_number: u64 },
    Rejected { failed_number: u64 },
    RepeatContributorRejected,
    Ignored,
}

/// Per-guild counting state. Owned exclusively by its guild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    /// The channel the game runs in. `None` means counting is disabled.
    pub channel: Option<ChannelId>,
    pub next_number: u64,
    pub last_contributor: Option<UserId>,
    pub allow_repeat_contributor: bool,
    pub ignore_incorrect: bool,
}

impl Default for Session {
    fn default() -> Session {
        Session {
            channel: None,
            next_number: 1,
            last_contributor: None,
            allow_repeat_contributor: false,
            ignore_incorrect: false,
        }
    }
}

impl Session {
    /// Validates a single submission and applies the resulting state change.
    ///
    /// The repeat-contributor check runs first, before the text is even
    /// looked at, so a repeated wrong answer is rejected as a repeat rather
    /// than as a mismatch. The only error case is a `next_number` beyond the
    /// suffix table, which `set_count` already rules out.
    pub fn submit(&mut self, contributor: UserId, raw_text: &str) -> Result<Verdict, Error> {
        if !self.allow_repeat_contributor && self.last_contributor == Some(contributor) {
            self.reset();
            return Ok(Verdict::RepeatContributorRejected)
        }
        let expected = words_for(self.next_number)?;
        if normalize(raw_text) == expected {
            self.next_number += 1;
            self.last_contributor = Some(contributor);
            Ok(Verdict::Accepted { new_number: self.next_number })
        } else if self.ignore_incorrect {
            Ok(Verdict::Ignored)
        } else {
            let failed_number = self.next_number;
            self.reset();
            Ok(Verdict::Rejected { failed_number })
        }
    }

    /// Moves the count to an operator-supplied value in `1..=MAX_COUNT`.
    pub fn set_count(&mut self, count: u64) -> Result<(), Error> {
        if !(1..=MAX_COUNT).contains(&count) {
            return Err(Error::OutOfRange)
        }
        self.next_number = count;
        Ok(())
    }

    /// Starts the count over. Toggles and the configured channel are kept.
    pub fn reset(&mut self) {
        self.next_number = 1;
        self.last_contributor = None;
    }
}

/// Repository for per-guild sessions. The core only ever works on values
/// passed in and out, so persistence stays in the calling layer.
pub trait SessionStore {
    fn get(&self, guild: GuildId) -> Option<Session>;
    fn save(&mut self, guild: GuildId, session: Session);

    /// The session for `guild` if counting is enabled there.
    fn enabled(&self, guild: GuildId) -> Result<Session, Error> {
        match self.get(guild) {
            Some(session) if session.channel.is_some() => Ok(session),
            _ => Err(Error::InvalidState),
        }
    }
}

/// In-memory session repository, seeded from the config file. Also serves as
/// `typemap` key for itself.
#[derive(Debug, Default)]
pub struct MemoryStore(HashMap<GuildId, Session>);

impl MemoryStore {
    pub fn new(seed: impl IntoIterator<Item = (GuildId, Session)>) -> MemoryStore {
        MemoryStore(seed.into_iter().collect())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, guild: GuildId) -> Option<Session> {
        self.0.get(&guild).cloned()
    }

    fn save(&mut self, guild: GuildId, session: Session) {
        self.0.insert(guild, session);
    }
}

impl TypeMapKey for MemoryStore {
    type Value = MemoryStore;
}

/// Handles a regular message in a guild: if it was sent to that guild's
/// counting channel, validates it and reports the verdict back to the
/// channel. State changes are applied under the same lock that produced the
/// verdict, so they land atomically.
pub async fn handle_message(ctx: &Context, msg: &Message) -> Result<(), crate::Error> {
    let Some(guild_id) = msg.guild_id else { return Ok(()) };
    let (attempted, verdict) = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<MemoryStore>().ok_or(crate::Error::MissingStore)?;
        let Some(mut session) = store.get(guild_id) else { return Ok(()) };
        if session.channel != Some(msg.channel_id) { return Ok(()) }
        let attempted = session.next_number;
        let verdict = session.submit(msg.author.id, &msg.content)?;
        store.save(guild_id, session);
        (attempted, verdict)
    };
    match verdict {
        Verdict::Accepted { .. } => { msg.react(&ctx.http, '✅').await?; }
        Verdict::Ignored => {}
        Verdict::Rejected { failed_number } => send_failed(ctx, msg, failed_number, "Next time check your spelling.").await?,
        Verdict::RepeatContributorRejected => send_failed(ctx, msg, attempted, "Next time don't count multiple times in a row.").await?,
    }
    Ok(())
}

async fn send_failed(ctx: &Context, msg: &Message, failed_number: u64, hint: &str) -> Result<(), crate::Error> {
    let embed = CreateEmbed::new()
        .title("The count got ruined!")
        .description(format!(
            "{} messed up the counting streak at **{} ({})**.\nThe next number is now **1 (one)**. {hint}",
            msg.author.mention(), humanize(failed_number), words_for(failed_number)?,
        ))
        .colour(0xff3c26)
        .author(CreateEmbedAuthor::new(msg.author.name.clone()).icon_url(msg.author.face()));
    msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

#[command]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn settings(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let session = {
        let data = ctx.data.read().await;
        let store = data.get::<MemoryStore>().expect("missing counting session store");
        store.get(guild_id).unwrap_or_default()
    };
    let channel = session.channel.map_or_else(|| format!("none"), |channel| channel.mention().to_string());
    let embed = CreateEmbed::new()
        .title("Word Counting Settings")
        .field("Channel:", channel, true)
        .field("Ignore incorrect numbers:", session.ignore_incorrect.to_string(), false)
        .field("Allow counting multiple times in a row:", session.allow_repeat_contributor.to_string(), false)
        .field("Next number:", format!("{} ({})", humanize(session.next_number), words_for(session.next_number)?), false);
    msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

#[command]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn channel(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let mut cmd = args.message();
    let reply = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<MemoryStore>().expect("missing counting session store");
        if let Some(channel_id) = parse::eat_channel_mention(&mut cmd) {
            let mut session = store.get(guild_id).unwrap_or_default();
            session.channel = Some(channel_id);
            store.save(guild_id, session);
            format!("{} has been set for word counting.", channel_id.mention())
        } else {
            match store.get(guild_id) {
                Some(mut session) if session.channel.is_some() => {
                    session.channel = None;
                    store.save(guild_id, session);
                    format!("Word counting is now disabled.")
                }
                _ => format!("Word counting is already disabled. Mention a channel to enable it."),
            }
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn ignorefailed(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let toggle = args.single::<bool>().ok();
    let reply = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<MemoryStore>().expect("missing counting session store");
        match store.enabled(guild_id) {
            Ok(mut session) => {
                let target = toggle.unwrap_or(!session.ignore_incorrect);
                session.ignore_incorrect = target;
                store.save(guild_id, session);
                format!("Incorrect numbers will {} be ignored.", if target { "now" } else { "no longer" })
            }
            Err(e) => e.to_string(),
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn multicount(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let toggle = args.single::<bool>().ok();
    let reply = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<MemoryStore>().expect("missing counting session store");
        match store.enabled(guild_id) {
            Ok(mut session) => {
                let target = toggle.unwrap_or(!session.allow_repeat_contributor);
                session.allow_repeat_contributor = target;
                store.save(guild_id, session);
                format!("You can {} count multiple times in a row.", if target { "now" } else { "no longer" })
            }
            Err(e) => e.to_string(),
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn setcount(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let Ok(count) = args.single::<u64>() else {
        msg.reply(ctx, "You must include a valid number.").await?;
        return Ok(())
    };
    let outcome = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<MemoryStore>().expect("missing counting session store");
        store.enabled(guild_id).and_then(|mut session| {
            session.set_count(count)?;
            let channel = session.channel.expect("enabled session has a channel");
            store.save(guild_id, session);
            Ok(channel)
        })
    };
    match outcome {
        Ok(channel) => {
            let embed = CreateEmbed::new()
                .title("Next Number Updated")
                .description(format!("The next number is now **{} ({})**.", humanize(count), words_for(count)?));
            channel.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
            if channel != msg.channel_id {
                msg.reply(ctx, format!("The next number has been updated to {}. I have notified everyone counting in {}.", humanize(count), channel.mention())).await?;
            }
        }
        Err(e) => { msg.reply(ctx, e.to_string()).await?; }
    }
    Ok(())
}

#[command]
#[only_in(guilds)]
#[required_permissions(MANAGE_GUILD)]
async fn resetcount(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = msg.guild_id.expect("guild-only command");
    let outcome = {
        let mut data = ctx.data.write().await;
        let store = data.get_mut::<MemoryStore>().expect("missing counting session store");
        store.enabled(guild_id).map(|mut session| {
            session.reset();
            let channel = session.channel.expect("enabled session has a channel");
            store.save(guild_id, session);
            channel
        })
    };
    match outcome {
        Ok(channel) => {
            let embed = CreateEmbed::new()
                .title("Counting has been reset")
                .description("The next number is now **1 (one)**.");
            channel.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
            if channel != msg.channel_id {
                msg.reply(ctx, format!("Counting has been reset to 1. I have notified everyone counting in {}.", channel.mention())).await?;
            }
        }
        Err(e) => { msg.reply(ctx, e.to_string()).await?; }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_session() -> Session {
        Session { channel: Some(ChannelId::new(42)), ..Session::default() }
    }

    #[test]
    fn spells_out_numbers_below_one_thousand() {
        assert_eq!(words_for(1).unwrap(), "one");
        assert_eq!(words_for(19).unwrap(), "nineteen");
        assert_eq!(words_for(20).unwrap(), "twenty");
        assert_eq!(words_for(21).unwrap(), "twenty one");
        assert_eq!(words_for(100).unwrap(), "one hundred");
        assert_eq!(words_for(123).unwrap(), "one hundred twenty three");
        assert_eq!(words_for(999).unwrap(), "nine hundred ninety nine");
    }

    #[test]
    fn spells_out_grouped_numbers() {
        assert_eq!(words_for(1000).unwrap(), "one thousand");
        assert_eq!(words_for(1001).unwrap(), "one thousand one");
        assert_eq!(words_for(1_000_000).unwrap(), "one million");
        assert_eq!(words_for(1_000_001).unwrap(), "one million one");
        assert_eq!(words_for(123_456_789).unwrap(), "one hundred twenty three million four hundred fifty six thousand seven hundred eighty nine");
        assert_eq!(words_for(2_000_000_010).unwrap(), "two billion ten");
    }

    #[test]
    fn spells_out_zero() {
        assert_eq!(words_for(0).unwrap(), "zero");
    }

    #[test]
    fn rejects_unsupported_magnitudes() {
        assert_eq!(words_for(MAX_SPELLABLE).unwrap(), "nine hundred ninety nine billion nine hundred ninety nine million nine hundred ninety nine thousand nine hundred ninety nine");
        assert_eq!(words_for(MAX_SPELLABLE + 1), Err(Error::UnsupportedMagnitude));
        assert_eq!(words_for(u64::MAX), Err(Error::UnsupportedMagnitude));
    }

    #[test]
    fn output_has_no_connectives_below_one_thousand() {
        for n in 1..=999 {
            let words = words_for(n).unwrap();
            assert!(!words.contains("and"), "{n} spelled with a connective: {words}");
            assert!(!words.contains('-'), "{n} spelled with a hyphen: {words}");
            assert!(!words.contains("  "), "{n} spelled with a double space: {words}");
            assert_eq!(words, words_for(n).unwrap());
        }
    }

    #[test]
    fn accepts_a_correct_submission() {
        let mut session = enabled_session();
        let verdict = session.submit(UserId::new(1), "one").unwrap();
        assert_eq!(verdict, Verdict::Accepted { new_number: 2 });
        assert_eq!(session.next_number, 2);
        assert_eq!(session.last_contributor, Some(UserId::new(1)));
    }

    #[test]
    fn rejects_a_repeat_contributor_and_resets() {
        let mut session = enabled_session();
        session.submit(UserId::new(1), "one").unwrap();
        let verdict = session.submit(UserId::new(1), "two").unwrap();
        assert_eq!(verdict, Verdict::RepeatContributorRejected);
        assert_eq!(session.next_number, 1);
        assert_eq!(session.last_contributor, None);
    }

    #[test]
    fn repeat_check_runs_before_the_spelling_check() {
        let mut session = enabled_session();
        session.submit(UserId::new(1), "one").unwrap();
        // a wrong answer by the same contributor is still a repeat, not a mismatch
        let verdict = session.submit(UserId::new(1), "seventeen").unwrap();
        assert_eq!(verdict, Verdict::RepeatContributorRejected);
    }

    #[test]
    fn allows_repeats_when_toggled() {
        let mut session = Session { allow_repeat_contributor: true, ..enabled_session() };
        session.submit(UserId::new(1), "one").unwrap();
        let verdict = session.submit(UserId::new(1), "two").unwrap();
        assert_eq!(verdict, Verdict::Accepted { new_number: 3 });
    }

    #[test]
    fn mismatch_resets_the_count() {
        let mut session = Session { next_number: 5, ..enabled_session() };
        let verdict = session.submit(UserId::new(2), "six").unwrap();
        assert_eq!(verdict, Verdict::Rejected { failed_number: 5 });
        assert_eq!(session.next_number, 1);
        assert_eq!(session.last_contributor, None);
    }

    #[test]
    fn mismatch_is_ignored_when_toggled() {
        let mut session = Session { next_number: 5, ignore_incorrect: true, last_contributor: Some(UserId::new(1)), ..enabled_session() };
        let before = session.clone();
        let verdict = session.submit(UserId::new(2), "six").unwrap();
        assert_eq!(verdict, Verdict::Ignored);
        assert_eq!(session, before);
    }

    #[test]
    fn normalization_accepts_hyphen_and_connective_variants() {
        for text in ["twenty three", "twenty-three", "twenty and three", "Twenty-Three"] {
            let mut session = Session { next_number: 23, ..enabled_session() };
            let verdict = session.submit(UserId::new(2), text).unwrap();
            assert_eq!(verdict, Verdict::Accepted { new_number: 24 }, "rejected {text:?}");
        }
    }

    #[test]
    fn set_count_is_range_checked() {
        let mut session = enabled_session();
        assert_eq!(session.set_count(0), Err(Error::OutOfRange));
        assert_eq!(session.set_count(MAX_COUNT + 1), Err(Error::OutOfRange));
        session.set_count(MAX_COUNT).unwrap();
        assert_eq!(session.next_number, MAX_COUNT);
        session.set_count(1000).unwrap();
        assert_eq!(session.next_number, 1000);
    }

    #[test]
    fn store_reports_disabled_guilds() {
        let mut store = MemoryStore::default();
        let guild = GuildId::new(7);
        assert_eq!(store.enabled(guild), Err(Error::InvalidState));
        store.save(guild, Session::default());
        assert_eq!(store.enabled(guild), Err(Error::InvalidState));
        store.save(guild, enabled_session());
        assert_eq!(store.enabled(guild).unwrap().channel, Some(ChannelId::new(42)));
    }

    #[test]
    fn humanize_inserts_thousands_separators() {
        assert_eq!(humanize(1), "1");
        assert_eq!(humanize(999), "999");
        assert_eq!(humanize(1000), "1,000");
        assert_eq!(humanize(999_999_999), "999,999,999");
    }
}
