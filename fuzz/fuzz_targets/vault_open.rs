#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use spirit_vault::{CredentialVault, SealedSecret};

fn vault() -> Option<&'static CredentialVault> {
    static VAULT: OnceLock<Option<CredentialVault>> = OnceLock::new();
    VAULT
        .get_or_init(|| CredentialVault::new("fuzz-vault-base-secret").ok())
        .as_ref()
}

fuzz_target!(|data: &[u8]| {
    let Some(vault) = vault() else {
        return;
    };
    let envelope = String::from_utf8_lossy(data);
    // Arbitrary envelopes must fail closed, never panic.
    let _ = vault.open(&SealedSecret::from_envelope(envelope.into_owned()));

    if let Ok(plaintext) = std::str::from_utf8(data) {
        if let Ok(sealed) = vault.seal(plaintext) {
            let opened = vault.open(&sealed).map(|secret| secret.expose() == plaintext);
            assert_eq!(opened, Ok(true));
        }
    }
});
