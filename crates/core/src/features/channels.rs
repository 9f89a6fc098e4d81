//! Channel directory kept as one line per channel in strategic memory.

use crate::error::StudioError;
use crate::studio::Studio;
use crate::types::{MemoryBlob, MemoryKind};

pub async fn register_channel(
    studio: &Studio,
    name: &str,
    description: &str,
) -> Result<MemoryBlob, StudioError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StudioError::InvalidInput("channel name is empty".into()));
    }
    let line = match description.trim() {
        "" => name.to_owned(),
        d => format!("{name}: {d}"),
    };
    Ok(studio.store.append(MemoryKind::ChannelDirectory, &line).await?)
}

/// Channel names currently in the directory, oldest first. Lines cut by
/// retention are still returned as they stand.
pub async fn list_channels(studio: &Studio) -> Result<Vec<String>, StudioError> {
    let blob = studio.store.read(MemoryKind::ChannelDirectory).await?;
    Ok(blob
        .content
        .lines()
        .filter_map(|l| l.split(':').next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::testing::studio_replying;

    #[tokio::test]
    async fn registered_channels_are_listed() {
        let (studio, _) = studio_replying("");
        register_channel(&studio, "Shorts", "vertical clips").await.unwrap();
        register_channel(&studio, " Newsletter ", "").await.unwrap();

        let blob = studio.store.read(MemoryKind::ChannelDirectory).await.unwrap();
        assert_eq!(blob.content, "Shorts: vertical clips\nNewsletter");
        assert_eq!(list_channels(&studio).await.unwrap(), ["Shorts", "Newsletter"]);
    }

    #[tokio::test]
    async fn blank_name_rejected() {
        let (studio, _) = studio_replying("");
        let err = register_channel(&studio, "  ", "x").await.unwrap_err();
        assert!(matches!(err, StudioError::InvalidInput(_)));
    }
}
