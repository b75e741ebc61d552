#![deny(rust_2018_idioms, unused_import_braces, unused_lifetimes, unused_qualifications)]
#![forbid(unsafe_code)]

use {
    std::{
        collections::HashSet,
        env,
        sync::Arc,
    },
    serenity::{
        async_trait,
        framework::standard::{
            CommandResult,
            Configuration,
            StandardFramework,
            macros::hook,
        },
        http::Http,
        model::prelude::*,
        prelude::*,
    },
    tracing::{
        error,
        info,
    },
    tracing_subscriber::{
        EnvFilter,
        layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    },
    tally::{
        ShardManagerContainer,
        clash,
        commands,
        config::Config,
        counting,
        status_roles,
    },
};

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("connected as {}", ready.user.name);
        if ready.guilds.is_empty() {
            info!("no guilds found, use the following URL to invite the bot:");
            match serenity::builder::CreateBotAuthParameters::new()
                .permissions(Permissions::empty())
                .auto_client_id(&ctx.http).await
                .map(|builder| builder.scopes(&[Scope::Bot]).build())
            {
                Ok(url) => info!("{url}"),
                Err(e) => error!("failed to generate invite URL: {e}"),
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot { return } // ignore bots to prevent message loops
        // commands posted in the counting channel are handled by the framework, not counted
        let prefix = {
            let data = ctx.data.read().await;
            data.get::<Config>().map(|config| config.tally.prefix.clone())
        };
        if prefix.is_some_and(|prefix| msg.content.starts_with(&prefix)) { return }
        if let Err(e) = counting::handle_message(&ctx, &msg).await {
            error!(channel_id = %msg.channel_id, "failed to handle counting message: {e}");
        }
    }

    async fn presence_update(&self, ctx: Context, new_data: Presence) {
        if let Err(e) = status_roles::handle_presence(&ctx, &new_data).await {
            error!("failed to handle presence update: {e}");
        }
    }
}

#[hook]
async fn after(_: &Context, _: &Message, command_name: &str, result: CommandResult) {
    if let Err(why) = result {
        error!("command '{command_name}' returned error: {why:?}");
    }
}

#[tokio::main]
async fn main() -> Result<(), tally::Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config_path = env::args().nth(1).unwrap_or_else(|| format!("config.json"));
    let config = Config::load(&config_path).await?;
    let http = Http::new(&config.tally.bot_token);
    let app_info = http.get_current_application_info().await?;
    let owners = app_info.owner.iter().map(|owner| owner.id).collect::<HashSet<_>>();
    let framework = StandardFramework::new()
        .after(after)
        .group(&commands::MAIN)
        .group(&commands::COUNTING)
        .group(&commands::STATUS_ROLES)
        .group(&commands::CLASH);
    framework.configure(Configuration::new()
        .with_whitespace(true) // allow ! command
        .case_insensitivity(true) // allow !Command
        .no_dm_prefix(true) // allow commands without a prefix in DMs
        .owners(owners)
        .prefix(config.tally.prefix.as_str())
    );
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_PRESENCES
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = Client::builder(&config.tally.bot_token, intents)
        .event_handler(Handler)
        .framework(framework)
        .await?;
    {
        let mut data = client.data.write().await;
        data.insert::<ShardManagerContainer>(Arc::clone(&client.shard_manager));
        data.insert::<counting::MemoryStore>(counting::MemoryStore::new(config.counting.clone()));
        data.insert::<status_roles::Store>(status_roles::Store::new(config.status_roles.clone()));
        if let Some(clash_config) = &config.clash {
            data.insert::<clash::Client>(clash::Client::new(clash_config)?);
        }
        data.insert::<clash::Links>(clash::Links::default());
        data.insert::<Config>(config);
    }
    client.start_autosharded().await?;
    Ok(())
}
