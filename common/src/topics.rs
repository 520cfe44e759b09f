pub const TOPIC_PREFIX: &str = "irclimate";

pub const CMD_MODE: &str = "mode";
pub const CMD_FAN: &str = "fan";
pub const CMD_TARGET: &str = "target";

pub fn state_topic(climate: &str) -> String {
    format!("{TOPIC_PREFIX}/{climate}/state")
}

pub fn command_topic(climate: &str, command: &str) -> String {
    format!("{TOPIC_PREFIX}/{climate}/cmnd/{command}")
}

/// Splits `irclimate/<climate>/cmnd/<command>` into its climate and command.
pub fn parse_command_topic(topic: &str) -> Option<(&str, &str)> {
    let rest = topic.strip_prefix(TOPIC_PREFIX)?.strip_prefix('/')?;
    let (climate, rest) = rest.split_once('/')?;
    let command = rest.strip_prefix("cmnd/")?;
    if climate.is_empty() || command.is_empty() || command.contains('/') {
        return None;
    }
    Some((climate, command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_topics_round_trip() {
        let topic = command_topic("bedroom", CMD_FAN);
        assert_eq!(topic, "irclimate/bedroom/cmnd/fan");
        assert_eq!(parse_command_topic(&topic), Some(("bedroom", CMD_FAN)));
    }

    #[test]
    fn rejects_foreign_topics() {
        assert_eq!(parse_command_topic("irclimate/bedroom/state"), None);
        assert_eq!(parse_command_topic("other/bedroom/cmnd/mode"), None);
        assert_eq!(parse_command_topic("irclimate//cmnd/mode"), None);
        assert_eq!(parse_command_topic("irclimate/bedroom/cmnd/mode/extra"), None);
    }
}
