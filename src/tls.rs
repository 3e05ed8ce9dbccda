use std::sync::OnceLock;

/// Select the process-wide rustls crypto provider before the first `wss://` connect.
///
/// rustls 0.23 panics on first use when more than one provider feature is enabled in the
/// dependency graph and none was installed. Pins `ring`; a provider installed earlier by the
/// host process wins.
pub fn install_rustls_crypto_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
