//! Utilities for parsing mentions out of command arguments.

use serenity::model::prelude::*;

/// Consumes a leading mention of the form `<{prefix}{id}>` plus trailing
/// whitespace, returning the id. Leaves the input untouched on failure.
fn eat_mention(cmd: &mut &str, prefix: &str) -> Option<u64> {
    let rest = cmd.strip_prefix(prefix)?;
    let end = rest.find('>')?;
    let id = rest[..end].parse::<u64>().ok().filter(|&id| id != 0)?;
    *cmd = &rest[end + 1..];
    eat_whitespace(cmd);
    Some(id)
}

/// Returns a channel given its mention at the start of the command.
pub fn eat_channel_mention(cmd: &mut &str) -> Option<ChannelId> {
    eat_mention(cmd, "<#").map(ChannelId::new)
}

/// Returns a role given its mention at the start of the command.
pub fn eat_role_mention(cmd: &mut &str) -> Option<RoleId> {
    eat_mention(cmd, "<@&").map(RoleId::new)
}

pub fn eat_whitespace(subj: &mut &str) {
    *subj = subj.trim_start();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eats_channel_mentions() {
        let mut cmd = "<#123456> the rest";
        assert_eq!(eat_channel_mention(&mut cmd), Some(ChannelId::new(123456)));
        assert_eq!(cmd, "the rest");
    }

    #[test]
    fn eats_role_mentions() {
        let mut cmd = "<@&98765>";
        assert_eq!(eat_role_mention(&mut cmd), Some(RoleId::new(98765)));
        assert_eq!(cmd, "");
    }

    #[test]
    fn leaves_non_mentions_untouched() {
        for text in ["general", "<#nonsense>", "<@&0>", "<@123> user mention", "<#123"] {
            let mut cmd = text;
            assert_eq!(eat_channel_mention(&mut cmd), None);
            assert_eq!(cmd, text);
        }
    }
}
