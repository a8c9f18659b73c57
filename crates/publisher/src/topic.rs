use crate::PublishError;

/// Validates a topic name against the broker naming rules: only ASCII
/// alphanumerics, `.`, `_` and `-` are allowed, and because metric names
/// fold `.` and `_` together, a name may not mix `-` with `.`.
pub fn validate_topic_name(topic: &str) -> Result<(), PublishError> {
    if topic.is_empty() {
        return Err(PublishError::InvalidTopic("topic name is empty".into()));
    }
    if !topic
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(PublishError::InvalidTopic(format!(
            "invalid characters in topic name {topic:?}"
        )));
    }
    if topic.contains('-') && topic.contains('.') {
        return Err(PublishError::InvalidTopic(format!(
            "topic name {topic:?} mixes '-' and '.'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_topic_name;

    #[test]
    fn test_accepts_plain_names() {
        for topic in ["blocks", "avax.blocks", "avax_blocks-v2", "Blocks_1.2"] {
            assert!(validate_topic_name(topic).is_ok(), "{topic}");
        }
    }

    #[test]
    fn test_rejects_invalid_names() {
        for topic in ["", "blocks!", "blocks topic", "avax.blocks-v2", "événements"] {
            assert!(validate_topic_name(topic).is_err(), "{topic}");
        }
    }
}
