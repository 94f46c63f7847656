//! Set metadata record

/// Metadata of one set: the member count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMeta {
    key: Vec<u8>,
    pub(crate) card: u64,
}

impl SetMeta {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key, card: 0 }
    }

    pub(crate) fn with_card(key: Vec<u8>, card: u64) -> Self {
        Self { key, card }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn card(&self) -> u64 {
        self.card
    }
}
