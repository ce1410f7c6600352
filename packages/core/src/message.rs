//! Caller input normalised to bytes

/// Where a [`Message`] came from; only affects how results are handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Binary,
    Text,
}

/// Immutable plaintext fed to every suite in one canonical binary form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
    kind: MessageKind,
}

impl Message {
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            kind: MessageKind::Binary,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: text.into().into_bytes(),
            kind: MessageKind::Text,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The message in its original form; `None` for binary input or text
    /// that no longer decodes as UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.data).ok(),
            MessageKind::Binary => None,
        }
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::binary(data)
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Self::binary(data.to_vec())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let msg = Message::from("hello");
        assert_eq!(msg.kind(), MessageKind::Text);
        assert_eq!(msg.as_bytes(), b"hello");
        assert_eq!(msg.as_text(), Some("hello"));
    }

    #[test]
    fn test_binary_message() {
        let msg = Message::from(vec![0u8, 1, 2]);
        assert_eq!(msg.kind(), MessageKind::Binary);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.as_text(), None);
    }
}
