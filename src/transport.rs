//! What the SASL layer needs to know about the underlying connection.

/// Channel binding types the server knows how to obtain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelBindingType {
    /// RFC5929 `tls-unique`: the first Finished message of the TLS handshake.
    TlsUnique,
}

impl ChannelBindingType {
    pub fn name(self) -> &'static str {
        match self {
            ChannelBindingType::TlsUnique => "tls-unique",
        }
    }

    /// Resolves a channel binding type announced in a GS2 header.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tls-unique" => Some(ChannelBindingType::TlsUnique),
            _ => None,
        }
    }
}

/// The connection a stream runs over.
pub trait Transport: Send + Sync {
    /// Returns the channel binding data of the given type, or `None` when the transport can't
    /// provide it (for instance, before TLS is negotiated).
    fn channel_binding_bytes(&self, binding: ChannelBindingType) -> Option<Vec<u8>>;
}

/// A transport without TLS. It never yields channel binding data.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTransport;

impl Transport for PlainTransport {
    fn channel_binding_bytes(&self, _: ChannelBindingType) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelBindingType;

    #[test]
    fn test_channel_binding_names() {
        assert_eq!(
            ChannelBindingType::from_name("tls-unique"),
            Some(ChannelBindingType::TlsUnique)
        );
        assert_eq!(ChannelBindingType::from_name("tls-exporter"), None);
        assert_eq!(ChannelBindingType::TlsUnique.name(), "tls-unique");
    }
}
