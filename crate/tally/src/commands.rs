//! Command groups and the generic bot commands.

use {
    rand::prelude::*,
    serenity::{
        framework::standard::{
            CommandResult,
            macros::{
                command,
                group,
            },
        },
        model::prelude::*,
        prelude::*,
    },
    crate::{
        ShardManagerContainer,
        clash::{
            ARMY_COMMAND,
            CLANMEMBERS_COMMAND,
            CLANWAR_COMMAND,
            CLAN_COMMAND,
            LINKCLAN_COMMAND,
            LINK_COMMAND,
            PLAYER_COMMAND,
            UNLINKCLAN_COMMAND,
            UNLINK_COMMAND,
        },
        counting::{
            CHANNEL_COMMAND,
            IGNOREFAILED_COMMAND,
            MULTICOUNT_COMMAND,
            RESETCOUNT_COMMAND,
            SETCOUNT_COMMAND,
            SETTINGS_COMMAND,
        },
        status_roles::{
            SR_ADD_COMMAND,
            SR_LIST_COMMAND,
            SR_REMOVE_COMMAND,
        },
    },
};

#[command]
pub async fn ping(ctx: &Context, msg: &Message) -> CommandResult {
    let reply = {
        let mut rng = thread_rng();
        let pingception = format!("BWO{}{}G", "R".repeat(rng.gen_range(3..20)), "N".repeat(rng.gen_range(1..5)));
        if rng.gen_bool(0.01) { pingception } else { format!("pong") }
    };
    msg.reply(ctx, reply).await?;
    Ok(())
}

#[command]
#[owners_only]
pub async fn quit(ctx: &Context, msg: &Message) -> CommandResult {
    msg.react(ctx, '👋').await?;
    let data = ctx.data.read().await;
    let shard_manager = data.get::<ShardManagerContainer>().expect("missing shard manager");
    shard_manager.shutdown_all().await;
    Ok(())
}

#[group]
#[commands(ping, quit)]
struct Main;

#[group]
#[prefixes("count", "wc")]
#[commands(settings, channel, ignorefailed, multicount, setcount, resetcount)]
struct Counting;

#[group]
#[prefixes("statusrole", "sr")]
#[commands(sr_add, sr_remove, sr_list)]
struct StatusRoles;

#[group]
#[prefixes("clash", "coc")]
#[commands(player, army, clan, clanmembers, clanwar, link, unlink, linkclan, unlinkclan)]
struct Clash;

pub use self::{
    CLASH_GROUP as CLASH,
    COUNTING_GROUP as COUNTING,
    MAIN_GROUP as MAIN,
    STATUSROLES_GROUP as STATUS_ROLES,
};
