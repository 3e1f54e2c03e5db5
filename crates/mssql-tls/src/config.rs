//! TLS settings.

/// Settings controlling certificate validation and SNI.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// Skip certificate verification entirely. Development only; enables a
    /// verifier that accepts any chain.
    pub trust_server_certificate: bool,

    /// Override the SNI / validation name. Defaults to the dialed host.
    pub server_name: Option<String>,
}

impl TlsSettings {
    /// Settings with full verification against the Mozilla root store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable certificate verification.
    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Use a fixed name for SNI and certificate validation.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}
