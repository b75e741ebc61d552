//! Clash of Clans stats lookups backed by the official API.

use {
    std::{
        collections::BTreeMap,
        fmt,
        str::FromStr,
    },
    chrono::NaiveDateTime,
    itertools::Itertools as _,
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
};

const BASE_URL: &str = "https://api.clashofclans.com/v1";
/// The alphabet the API uses for player and clan tags.
const TAG_ALPHABET: &str = "0289PYLQGRJCUV";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`{0}` is not a valid tag")]
    InvalidTag(String),
    #[error("{0} was not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("the Clash of Clans API returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub token: String,
}

/// A normalized player or clan tag, stored without the leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag(String);

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Tag, Error> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("%23").unwrap_or(trimmed);
        let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed);
        // the game renders tags with O for 0
        let tag = trimmed.to_uppercase().replace('O', "0");
        if tag.is_empty() || !tag.chars().all(|c| TAG_ALPHABET.contains(c)) {
            return Err(Error::InvalidTag(s.to_owned()))
        }
        Ok(Tag(tag))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    pub tag: String,
    pub town_hall_level: u8,
    pub exp_level: u32,
    pub trophies: u32,
    pub best_trophies: u32,
    pub donations: u32,
    pub donations_received: u32,
    pub attack_wins: u32,
    pub defense_wins: u32,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub clan: Option<PlayerClan>,
    #[serde(default)]
    pub heroes: Vec<Unit>,
    #[serde(default)]
    pub troops: Vec<Unit>,
    #[serde(default)]
    pub spells: Vec<Unit>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerClan {
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    pub level: u32,
    pub max_level: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clan {
    pub name: String,
    pub tag: String,
    pub clan_level: u32,
    pub clan_points: u32,
    #[serde(default)]
    pub clan_versus_points: u32,
    pub members: u32,
    #[serde(default)]
    pub description: String,
    pub badge_urls: BadgeUrls,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub member_list: Vec<ClanMember>,
    pub is_war_log_public: bool,
    #[serde(default)]
    pub war_wins: u32,
    #[serde(default)]
    pub war_losses: Option<u32>,
    #[serde(default)]
    pub war_ties: Option<u32>,
    #[serde(default)]
    pub war_win_streak: u32,
    #[serde(default)]
    pub war_league: Option<Label>,
    #[serde(default)]
    pub required_trophies: u32,
    #[serde(default)]
    pub required_townhall_level: Option<u8>,
    #[serde(rename = "type")]
    pub join_type: String,
    #[serde(default)]
    pub location: Option<Label>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeUrls {
    pub small: String,
    pub large: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMember {
    pub name: String,
    pub tag: String,
    pub role: String,
    pub donations: u32,
    pub donations_received: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct War {
    pub state: String,
    #[serde(default)]
    pub team_size: Option<u32>,
    #[serde(default)]
    pub attacks_per_member: Option<u32>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub clan: Option<WarClan>,
    #[serde(default)]
    pub opponent: Option<WarClan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarClan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub attacks: u32,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub destruction_percentage: f64,
}

/// The API client. Cheap to clone; commands clone it out of the typemap so
/// requests don't hold the data lock. Also serves as `typemap` key for itself.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    token: String,
}

impl Client {
    pub fn new(config: &Config) -> Result<Client, Error> {
        Ok(Client {
            http: reqwest::Client::builder().user_agent(concat!("tally/", env!("CARGO_PKG_VERSION"))).build()?,
            token: config.token.clone(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, kind: &'static str, path: String) -> Result<T, Error> {
        let response = self.http.get(format!("{BASE_URL}{path}")).bearer_auth(&self.token).send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(Error::NotFound(kind)),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(Error::Status(status)),
        }
    }

    pub async fn player(&self, tag: &Tag) -> Result<Player, Error> {
        self.get("Player", format!("/players/%23{tag}")).await
    }

    pub async fn clan(&self, tag: &Tag) -> Result<Clan, Error> {
        self.get("Clan", format!("/clans/%23{tag}")).await
    }

    pub async fn current_war(&self, tag: &Tag) -> Result<War, Error> {
        self.get("Clan", format!("/clans/%23{tag}/currentwar")).await
    }
}

impl TypeMapKey for Client {
    type Value = Client;
}

/// Clash accounts and clans linked to Discord users. Also serves as `typemap`
/// key for itself.
#[derive(Debug, Default)]
pub struct Links(pub BTreeMap<UserId, UserLinks>);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserLinks {
    pub accounts: Vec<Tag>,
    pub clan: Option<Tag>,
}

impl TypeMapKey for Links {
    type Value = Links;
}

/// Troop, spell and hero categories, in the order the army overview lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Elixir,
    Dark,
    Siege,
    Pet,
    Builder,
    Hero,
    ElixirSpell,
    DarkSpell,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Elixir,
        Category::Dark,
        Category::Siege,
        Category::Pet,
        Category::Builder,
        Category::Hero,
        Category::ElixirSpell,
        Category::DarkSpell,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            Category::Elixir => "Elixir Troops",
            Category::Dark => "Dark Elixir Troops",
            Category::Siege => "Siege Machines",
            Category::Pet => "Pets",
            Category::Builder => "Builder Base Troops",
            Category::Hero => "Heroes",
            Category::ElixirSpell => "Elixir Spells",
            Category::DarkSpell => "Dark Elixir Spells",
        }
    }
}

/// Looks up the category a unit is listed under. Baby Dragon is special: it
/// exists in both villages, so the army overview reassigns the second
/// occurrence to the builder base.
pub fn category(unit_name: &str) -> Option<Category> {
    Some(match unit_name.to_lowercase().as_str() {
        "barbarian" | "archer" | "goblin" | "giant" | "wall breaker" | "balloon" | "wizard" | "healer"
        | "dragon" | "p.e.k.k.a" | "miner" | "electro dragon" | "yeti" | "dragon rider" | "baby dragon" => Category::Elixir,
        "minion" | "hog rider" | "valkyrie" | "golem" | "witch" | "lava hound" | "bowler" | "ice golem"
        | "headhunter" => Category::Dark,
        "wall wrecker" | "battle blimp" | "stone slammer" | "siege barracks" | "log launcher" => Category::Siege,
        "l.a.s.s.i" | "electro owl" | "mighty yak" | "unicorn" => Category::Pet,
        "raged barbarian" | "sneaky archer" | "boxer giant" | "beta minion" | "bomber" | "cannon cart"
        | "night witch" | "drop ship" | "super p.e.k.k.a" | "hog glider" => Category::Builder,
        "barbarian king" | "archer queen" | "grand warden" | "royal champion" | "battle machine" => Category::Hero,
        "lightning spell" | "healing spell" | "rage spell" | "jump spell" | "freeze spell" | "clone spell"
        | "invisibility spell" => Category::ElixirSpell,
        "poison spell" | "earthquake spell" | "haste spell" | "skeleton spell" | "bat spell" => Category::DarkSpell,
        _ => return None,
    })
}

/// Abbreviates a number the way the game renders loot, e.g. `1.23M`.
pub fn millify(n: u64) -> String {
    const NAMES: [&str; 4] = ["", "K", "M", "B"];
    let mut value = n as f64;
    let mut idx = 0;
    while idx + 1 < NAMES.len() && value >= 1000.0 {
        value /= 1000.0;
        idx += 1;
    }
    format!("{value:.2}{}", NAMES[idx])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Loot {
    pub gold: u64,
    pub elixir: u64,
    pub dark_elixir: u64,
}

/// Pulls the lifetime loot totals out of the achievement list.
pub fn total_loot(achievements: &[Achievement]) -> Loot {
    let mut loot = Loot::default();
    for achievement in achievements {
        match achievement.name.as_str() {
            "Gold Grab" => loot.gold = achievement.value,
            "Elixir Escapade" => loot.elixir = achievement.value,
            "Heroic Heist" => loot.dark_elixir = achievement.value,
            _ => {}
        }
    }
    loot
}

pub fn townhall_image(level: u8) -> Option<&'static str> {
    Some(match level {
        1 => "https://static.wikia.nocookie.net/clashofclans/images/f/fd/Town_Hall1.png/",
        2 => "https://static.wikia.nocookie.net/clashofclans/images/7/7d/Town_Hall2.png/",
        3 => "https://static.wikia.nocookie.net/clashofclans/images/d/dd/Town_Hall3.png/",
        4 => "https://static.wikia.nocookie.net/clashofclans/images/e/e7/Town_Hall4.png/",
        5 => "https://static.wikia.nocookie.net/clashofclans/images/a/a3/Town_Hall5.png/",
        6 => "https://static.wikia.nocookie.net/clashofclans/images/5/52/Town_Hall6.png/",
        7 => "https://static.wikia.nocookie.net/clashofclans/images/7/75/Town_Hall7.png/",
        8 => "https://static.wikia.nocookie.net/clashofclans/images/f/fa/Town_Hall8.png/",
        9 => "https://static.wikia.nocookie.net/clashofclans/images/e/e0/Town_Hall9.png/",
        10 => "https://static.wikia.nocookie.net/clashofclans/images/5/5c/Town_Hall10.png/",
        11 => "https://static.wikia.nocookie.net/clashofclans/images/9/96/Town_Hall11.png/",
        12 => "https://static.wikia.nocookie.net/clashofclans/images/c/c7/Town_Hall12-1.png/",
        13 => "https://static.wikia.nocookie.net/clashofclans/images/9/98/Town_Hall13-1.png/",
        14 => "https://static.wikia.nocookie.net/clashofclans/images/e/e0/Town_Hall14-1.png/",
        _ => return None,
    })
}

/// Parses the API's timestamp format (e.g. `20200728T191244.000Z`) into a
/// unix timestamp for Discord's `<t:…:R>` rendering.
pub fn war_timestamp(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S%.3fZ").ok().map(|dt| dt.and_utc().timestamp())
}

fn link_url(action: &str, raw_tag: &str) -> String {
    format!("https://link.clashofclans.com/en?action={action}&tag=%23{}", raw_tag.trim_start_matches('#'))
}

async fn client(ctx: &Context) -> Option<Client> {
    ctx.data.read().await.get::<Client>().cloned()
}

async fn reply_disabled(ctx: &Context, msg: &Message) -> CommandResult {
    msg.reply(ctx, "Clash of Clans commands are disabled: no API token is configured.").await?;
    Ok(())
}

/// Resolves the tag argument for player commands: an explicit tag, or every
/// linked account. Replies and returns `None` when neither is available.
async fn player_tags(ctx: &Context, msg: &Message, args: &Args) -> CommandResult<Option<Vec<Tag>>> {
    let raw = args.message().trim();
    if raw.is_empty() {
        let linked = {
            let data = ctx.data.read().await;
            let links = data.get::<Links>().expect("missing clash account links");
            links.0.get(&msg.author.id).map(|links| links.accounts.clone()).unwrap_or_default()
        };
        if linked.is_empty() {
            msg.reply(ctx, "Please enter a valid player tag or link your account using `clash link <playerTag>`.").await?;
            return Ok(None)
        }
        Ok(Some(linked))
    } else {
        match raw.parse::<Tag>() {
            Ok(tag) => Ok(Some(vec![tag])),
            Err(e) => {
                msg.reply(ctx, e.to_string()).await?;
                Ok(None)
            }
        }
    }
}

/// Resolves the tag argument for clan commands: an explicit tag, or the
/// linked clan. Replies and returns `None` when neither is available.
async fn clan_tag(ctx: &Context, msg: &Message, args: &Args) -> CommandResult<Option<Tag>> {
    let raw = args.message().trim();
    if raw.is_empty() {
        let linked = {
            let data = ctx.data.read().await;
            let links = data.get::<Links>().expect("missing clash account links");
            links.0.get(&msg.author.id).and_then(|links| links.clan.clone())
        };
        if linked.is_none() {
            msg.reply(ctx, "Please enter a valid clan tag or link your clan using `clash linkclan <clanTag>`.").await?;
        }
        Ok(linked)
    } else {
        match raw.parse::<Tag>() {
            Ok(tag) => Ok(Some(tag)),
            Err(e) => {
                msg.reply(ctx, e.to_string()).await?;
                Ok(None)
            }
        }
    }
}

fn player_embed(player: &Player) -> CreateEmbed {
    let loot = total_loot(&player.achievements);
    let mut author = CreateEmbedAuthor::new(format!("{} ({})", player.name, player.tag)).url(link_url("OpenPlayerProfile", &player.tag));
    if let Some(image) = townhall_image(player.town_hall_level) {
        author = author.icon_url(image);
    }
    let mut embed = CreateEmbed::new()
        .description(format!("**TH {}, {} trophies, Level {}**", player.town_hall_level, player.trophies, player.exp_level))
        .author(author)
        .field("Current Season Stats", format!(
            "**Troops Donated**\n{}\n**Troops Received**\n{}\n**Attacks Won**\n{}\n**Defenses Won**\n{}",
            player.donations, player.donations_received, player.attack_wins, player.defense_wins,
        ), false);
    if let Some(image) = townhall_image(player.town_hall_level) {
        embed = embed.thumbnail(image);
    }
    if let Some(clan) = &player.clan {
        let position = player.role.as_deref().unwrap_or("member");
        embed = embed.field("Clan", format!("[**{} ({})**]({})\n**Position**: {}", clan.name, clan.tag, link_url("OpenClanProfile", &clan.tag), position), false);
    }
    embed = embed.field("Achievements", format!(
        "**Total Loot**\n**Gold** {}, **Elixir** {}, **Dark Elixir** {}\n**Best Trophies**\n{} trophies",
        millify(loot.gold), millify(loot.elixir), millify(loot.dark_elixir), player.best_trophies,
    ), false);
    if !player.heroes.is_empty() {
        let heroes = player.heroes.iter().map(|hero| format!("**{}** {}", hero.name, hero.level)).join("\n");
        embed = embed.field("Heroes", heroes, false);
    }
    embed
}

#[command]
async fn player(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let Some(tags) = player_tags(ctx, msg, &args).await? else { return Ok(()) };
    for tag in tags {
        match client.player(&tag).await {
            Ok(player) => { msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(player_embed(&player))).await?; }
            Err(e @ Error::NotFound(_)) => { msg.reply(ctx, e.to_string()).await?; }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[command]
async fn army(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let Some(tags) = player_tags(ctx, msg, &args).await? else { return Ok(()) };
    for tag in tags {
        let player = match client.player(&tag).await {
            Ok(player) => player,
            Err(e @ Error::NotFound(_)) => {
                msg.reply(ctx, e.to_string()).await?;
                continue
            }
            Err(e) => return Err(e.into()),
        };
        let mut army: BTreeMap<Category, Vec<String>> = BTreeMap::default();
        let mut seen_baby_dragon = false;
        for unit in player.troops.iter().chain(&player.spells).chain(&player.heroes) {
            let Some(mut unit_category) = category(&unit.name) else { continue };
            if unit.name.eq_ignore_ascii_case("baby dragon") {
                if seen_baby_dragon {
                    unit_category = Category::Builder;
                } else {
                    seen_baby_dragon = true;
                }
            }
            army.entry(unit_category).or_default().push(format!("**{}** `{}/{}`", unit.name, unit.level, unit.max_level));
        }
        let mut embed = CreateEmbed::new()
            .author(CreateEmbedAuthor::new(format!("Troop levels for {}", player.name)).url(link_url("OpenPlayerProfile", &player.tag)));
        for unit_category in Category::ALL {
            if let Some(units) = army.get(&unit_category) {
                embed = embed.field(unit_category.heading(), units.iter().join(" "), false);
            }
        }
        msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    }
    Ok(())
}

#[command]
async fn clan(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let Some(tag) = clan_tag(ctx, msg, &args).await? else { return Ok(()) };
    let clan = match client.clan(&tag).await {
        Ok(clan) => clan,
        Err(e @ Error::NotFound(_)) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
        Err(e) => return Err(e.into()),
    };
    let labels = clan.labels.iter().map(|label| format!("- {}", label.name)).join("\n");
    let leader = clan.member_list.iter().find(|member| member.role == "leader");
    let leader = leader.map_or_else(|| format!("unknown"), |leader| format!("[{} ({})]({})", leader.name, leader.tag, link_url("OpenPlayerProfile", &leader.tag)));
    let location = clan.location.as_ref().map_or("unknown", |location| location.name.as_str());
    let townhall_requirement = clan.required_townhall_level.map_or_else(String::default, |level| format!("\nTownhall {level} required"));
    let war_log = if clan.is_war_log_public { "Public" } else { "Private" };
    let mut ties_losses = String::default();
    if clan.is_war_log_public {
        ties_losses = format!(", {} lost, {} ties", clan.war_losses.unwrap_or_default(), clan.war_ties.unwrap_or_default());
    }
    let war_league = clan.war_league.as_ref().map_or("None", |league| league.name.as_str());
    let embed = CreateEmbed::new()
        .description(format!("**Level {}, Members {}, {} Trophies, {} versus trophies**\n\n{}", clan.clan_level, clan.members, clan.clan_points, clan.clan_versus_points, clan.description))
        .author(CreateEmbedAuthor::new(format!("{} ({})", clan.name, clan.tag)).url(link_url("OpenClanProfile", &clan.tag)).icon_url(&clan.badge_urls.small))
        .thumbnail(&clan.badge_urls.large)
        .field("Clan Info", format!(
            "**Tags**\n{labels}\n\n**Clan Leader**\n{leader}\n\n**Location**\n{location}\n\n**Requirements**\n{}\n{} trophies required{townhall_requirement}\n\n**War Log**\n{war_log}",
            if clan.join_type == "inviteOnly" { "Invite Only" } else { "Open" }, clan.required_trophies,
        ), false)
        .field("War and League", format!(
            "**War League**\n{war_league}\n**War Stats**\n{} won{ties_losses}\n**Win Streak**\n{}",
            clan.war_wins, clan.war_win_streak,
        ), false);
    msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

#[command]
async fn clanmembers(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let Some(tag) = clan_tag(ctx, msg, &args).await? else { return Ok(()) };
    let clan = match client.clan(&tag).await {
        Ok(clan) => clan,
        Err(e @ Error::NotFound(_)) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
        Err(e) => return Err(e.into()),
    };
    let members = clan.member_list.iter().map(|member| format!("`{}` {}", member.tag, member.name)).join("\n");
    let embed = CreateEmbed::new()
        .title("Tag             Name")
        .description(members)
        .author(CreateEmbedAuthor::new(format!("Members of {} ({})", clan.name, clan.tag)).url(link_url("OpenClanProfile", &clan.tag)));
    msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

#[command]
async fn clanwar(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let Some(tag) = clan_tag(ctx, msg, &args).await? else { return Ok(()) };
    let war = match client.current_war(&tag).await {
        Ok(war) => war,
        Err(e @ Error::NotFound(_)) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
        Err(e) => return Err(e.into()),
    };
    if war.state == "notInWar" {
        msg.reply(ctx, "This clan is not currently in a war.").await?;
        return Ok(())
    }
    let ally = war.clan.clone().unwrap_or_default();
    let opponent = war.opponent.clone().unwrap_or_default();
    let deadline = if war.state == "preparation" { war.start_time.as_deref() } else { war.end_time.as_deref() };
    let deadline = deadline.and_then(war_timestamp).map_or_else(String::default, |ts| format!(
        "\nTime until {}: <t:{ts}:R>",
        if war.state == "preparation" { "battle day" } else { "end of war" },
    ));
    let embed = CreateEmbed::new()
        .author(CreateEmbedAuthor::new(format!("Current war of {}", ally.name)).url(link_url("OpenClanProfile", &ally.tag)))
        .field("Opponent", format!("[{} ({})]({})", opponent.name, opponent.tag, link_url("OpenClanProfile", &opponent.tag)), false)
        .field("War Info", format!(
            "**Team Size:** {}\n**Attacks per Member:** {}\n\n**War State**\n{}{deadline}",
            war.team_size.unwrap_or_default(), war.attacks_per_member.unwrap_or_default(), war.state,
        ), false)
        .field("War Stats", format!(
            "**Ally**\n{} Attacks\n{} Stars\n{}% Destruction\n\n**Opponent**\n{} Attacks\n{} Stars\n{}% Destruction",
            ally.attacks, ally.stars, ally.destruction_percentage, opponent.attacks, opponent.stars, opponent.destruction_percentage,
        ), false);
    msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

#[command]
async fn link(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let tag = match args.message().trim().parse::<Tag>() {
        Ok(tag) => tag,
        Err(e) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
    };
    let player = match client.player(&tag).await {
        Ok(player) => player,
        Err(e @ Error::NotFound(_)) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
        Err(e) => return Err(e.into()),
    };
    let reply = {
        let mut data = ctx.data.write().await;
        let links = data.get_mut::<Links>().expect("missing clash account links");
        let accounts = &mut links.0.entry(msg.author.id).or_default().accounts;
        if accounts.contains(&tag) {
            format!("Your Discord account is already linked with **{}**.", player.name)
        } else {
            accounts.push(tag);
            format!("Your Discord account has been linked with **{}**.", player.name)
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command]
async fn unlink(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let tag = match args.message().trim().parse::<Tag>() {
        Ok(tag) => tag,
        Err(e) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
    };
    let reply = {
        let mut data = ctx.data.write().await;
        let links = data.get_mut::<Links>().expect("missing clash account links");
        let accounts = &mut links.0.entry(msg.author.id).or_default().accounts;
        if let Some(idx) = accounts.iter().position(|linked| *linked == tag) {
            accounts.remove(idx);
            format!("Your Discord account has been unlinked from **#{tag}**.")
        } else {
            format!("You are not currently linked with this account.")
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command]
async fn linkclan(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let Some(client) = client(ctx).await else { return reply_disabled(ctx, msg).await };
    let tag = match args.message().trim().parse::<Tag>() {
        Ok(tag) => tag,
        Err(e) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
    };
    let account = {
        let data = ctx.data.read().await;
        let links = data.get::<Links>().expect("missing clash account links");
        links.0.get(&msg.author.id).and_then(|links| links.accounts.first().cloned())
    };
    let Some(account) = account else {
        msg.reply(ctx, "You don't have an account linked.").await?;
        return Ok(())
    };
    let player = match client.player(&account).await {
        Ok(player) => player,
        Err(e @ Error::NotFound(_)) => {
            msg.reply(ctx, e.to_string()).await?;
            return Ok(())
        }
        Err(e) => return Err(e.into()),
    };
    let Some(clan) = player.clan else {
        msg.reply(ctx, "You are not in a clan.").await?;
        return Ok(())
    };
    if clan.tag.parse::<Tag>().ok() != Some(tag.clone()) {
        msg.reply(ctx, "You are not in this clan.").await?;
        return Ok(())
    }
    {
        let mut data = ctx.data.write().await;
        let links = data.get_mut::<Links>().expect("missing clash account links");
        links.0.entry(msg.author.id).or_default().clan = Some(tag);
    }
    msg.reply(ctx, format!("Your Discord account has been linked to **{}**.", clan.name)).await?;
    Ok(())
}

#[command]
async fn unlinkclan(ctx: &Context, msg: &Message) -> CommandResult {
    let reply = {
        let mut data = ctx.data.write().await;
        let links = data.get_mut::<Links>().expect("missing clash account links");
        match links.0.entry(msg.author.id).or_default().clan.take() {
            Some(tag) => format!("Your Discord account has been unlinked from **#{tag}**."),
            None => format!("You are not currently linked with a clan."),
        }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_parsing_normalizes_input() {
        assert_eq!("#2pp".parse::<Tag>().unwrap(), Tag(format!("2PP")));
        assert_eq!("%232PP".parse::<Tag>().unwrap(), Tag(format!("2PP")));
        assert_eq!("2pp".parse::<Tag>().unwrap().to_string(), "2PP");
        // the letter O is read as a zero
        assert_eq!("#oO".parse::<Tag>().unwrap().to_string(), "00");
    }

    #[test]
    fn tag_parsing_rejects_invalid_input() {
        assert!("".parse::<Tag>().is_err());
        assert!("#".parse::<Tag>().is_err());
        assert!("#2PP1".parse::<Tag>().is_err()); // 1 is not in the tag alphabet
        assert!("hello world".parse::<Tag>().is_err());
    }

    #[test]
    fn millify_abbreviates_magnitudes() {
        assert_eq!(millify(0), "0.00");
        assert_eq!(millify(999), "999.00");
        assert_eq!(millify(1_234), "1.23K");
        assert_eq!(millify(2_500_000), "2.50M");
        assert_eq!(millify(3_000_000_000), "3.00B");
        assert_eq!(millify(2_000_000_000_000), "2000.00B");
    }

    #[test]
    fn categories_cover_the_unit_table() {
        assert_eq!(category("Barbarian"), Some(Category::Elixir));
        assert_eq!(category("baby dragon"), Some(Category::Elixir));
        assert_eq!(category("hog rider"), Some(Category::Dark));
        assert_eq!(category("log launcher"), Some(Category::Siege));
        assert_eq!(category("mighty yak"), Some(Category::Pet));
        assert_eq!(category("night witch"), Some(Category::Builder));
        assert_eq!(category("Archer Queen"), Some(Category::Hero));
        assert_eq!(category("rage spell"), Some(Category::ElixirSpell));
        assert_eq!(category("bat spell"), Some(Category::DarkSpell));
        assert_eq!(category("wall"), None);
    }

    #[test]
    fn loot_totals_come_from_achievements() {
        let achievements = vec![
            Achievement { name: format!("Gold Grab"), value: 2_000_000_000 },
            Achievement { name: format!("Elixir Escapade"), value: 1_500_000_000 },
            Achievement { name: format!("Heroic Heist"), value: 10_000_000 },
            Achievement { name: format!("Nice and Tidy"), value: 4_000 },
        ];
        assert_eq!(total_loot(&achievements), Loot { gold: 2_000_000_000, elixir: 1_500_000_000, dark_elixir: 10_000_000 });
        assert_eq!(total_loot(&[]), Loot::default());
    }

    #[test]
    fn war_timestamps_parse() {
        assert_eq!(war_timestamp("20200728T191244.000Z"), Some(1595963564));
        assert_eq!(war_timestamp("not a timestamp"), None);
    }

    #[test]
    fn player_records_deserialize() {
        let player = serde_json::from_str::<Player>(r##"{
            "tag": "#2PP",
            "name": "Chief",
            "townHallLevel": 11,
            "expLevel": 150,
            "trophies": 4100,
            "bestTrophies": 4600,
            "donations": 120,
            "donationsReceived": 45,
            "attackWins": 10,
            "defenseWins": 3,
            "role": "coLeader",
            "clan": {"tag": "#8QU8J9LP", "name": "Example Clan", "clanLevel": 19},
            "heroes": [{"name": "Barbarian King", "level": 45, "maxLevel": 75, "village": "home"}],
            "troops": [{"name": "Barbarian", "level": 8, "maxLevel": 10, "village": "home"}],
            "spells": [],
            "achievements": [{"name": "Gold Grab", "stars": 3, "value": 1000000, "target": 100000}]
        }"##).unwrap();
        assert_eq!(player.town_hall_level, 11);
        assert_eq!(player.clan.unwrap().name, "Example Clan");
        assert_eq!(player.heroes[0].level, 45);
        assert_eq!(total_loot(&player.achievements).gold, 1_000_000);
    }
}
