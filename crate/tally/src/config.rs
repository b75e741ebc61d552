use {
    std::{
        collections::BTreeMap,
        path::Path,
    },
    serde::Deserialize,
    serenity::{
        model::prelude::*,
        prelude::*,
    },
    crate::{
        clash,
        counting,
        status_roles,
    },
};

/// The bot's config file. Also serves as `typemap` key for itself.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub tally: ConfigTally,
    #[serde(default)]
    pub clash: Option<clash::Config>,
    /// Counting sessions to seed the store with on startup, by guild.
    #[serde(default)]
    pub counting: BTreeMap<GuildId, counting::Session>,
    /// Status-role rules to seed the store with on startup, by guild.
    #[serde(default)]
    pub status_roles: BTreeMap<GuildId, status_roles::Rules>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigTally {
    pub bot_token: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    format!("!")
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Config, crate::Error> {
        let buf = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&buf)?)
    }
}

impl TypeMapKey for Config {
    type Value = Config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = serde_json::from_str::<Config>(r#"{"tally": {"botToken": "xyz"}}"#).unwrap();
        assert_eq!(config.tally.prefix, "!");
        assert!(config.clash.is_none());
        assert!(config.counting.is_empty());
        assert!(config.status_roles.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = serde_json::from_str::<Config>(r#"{
            "tally": {"botToken": "xyz", "prefix": "?"},
            "clash": {"token": "api-token"},
            "counting": {"365998850625058868": {"channel": "864572285766336512", "nextNumber": 5}},
            "statusRoles": {"365998850625058868": {"gaming": "668684989006948352"}}
        }"#).unwrap();
        assert_eq!(config.tally.prefix, "?");
        assert_eq!(config.clash.unwrap().token, "api-token");
        assert_eq!(config.counting[&GuildId::new(365998850625058868)].next_number, 5);
        assert_eq!(config.status_roles[&GuildId::new(365998850625058868)].matches("gaming"), vec![RoleId::new(668684989006948352)]);
    }
}
