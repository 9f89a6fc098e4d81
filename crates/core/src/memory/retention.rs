use crate::config::StudioCfg;
use crate::types::MemoryKind;

/// Per-kind retention windows, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub execution_learning: usize,
    pub market_dna: usize,
    pub channel_directory: usize,
}

impl Retention {
    pub fn from_cfg(cfg: &StudioCfg) -> Self {
        Self {
            execution_learning: cfg.retention_execution_learning,
            market_dna: cfg.retention_market_dna,
            channel_directory: cfg.retention_channel_directory,
        }
    }

    pub fn cap(&self, kind: MemoryKind) -> usize {
        match kind {
            MemoryKind::ExecutionLearning => self.execution_learning,
            MemoryKind::MarketDna => self.market_dna,
            MemoryKind::ChannelDirectory => self.channel_directory,
        }
    }

    /// Truncate `text` to the window for `kind`, keeping the suffix.
    pub fn apply(&self, kind: MemoryKind, text: &str) -> String {
        keep_tail(text, self.cap(kind))
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self::from_cfg(&StudioCfg::default())
    }
}

/// Last `cap` characters of `text`. Counts chars, not bytes, so multi-byte
/// text is never split mid-character.
pub fn keep_tail(text: &str, cap: usize) -> String {
    let total = text.chars().count();
    if total <= cap {
        return text.to_owned();
    }
    let skip = total - cap;
    match text.char_indices().nth(skip) {
        Some((byte_idx, _)) => text[byte_idx..].to_owned(),
        None => String::new(),
    }
}

/// Join an existing blob with a new entry, newline separated.
pub fn join_entry(previous: &str, entry: &str) -> String {
    if previous.is_empty() {
        entry.to_owned()
    } else {
        format!("{previous}\n{entry}")
    }
}
