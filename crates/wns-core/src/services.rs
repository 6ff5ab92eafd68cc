//! Built-in service handlers
//!
//! `ResolveWallet` is a placeholder: it fabricates a fresh wallet-style
//! address instead of looking one up. Nothing about it should be read as a
//! resolution algorithm.

use tracing::debug;

use crate::error::WnsResult;
use crate::identity::Identity;
use crate::protocol::{Request, Response};
use crate::registry::ServiceHandler;

/// Service name of the placeholder wallet resolver
pub const RESOLVE_WALLET: &str = "ResolveWallet";

/// Bytes of the hashed public key kept for the wallet address
const WALLET_ADDRESS_LEN: usize = 20;

/// Placeholder handler returning a freshly generated `0x`-prefixed address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveWallet;

impl ServiceHandler for ResolveWallet {
    fn handle(&self, request: &Request) -> WnsResult<Response> {
        let address = fabricate_wallet_address()?;
        debug!(request_id = %request.request_id, %address, "Fabricated wallet address");
        Ok(Response::ok(&request.request_id, address))
    }
}

/// `0x` + hex of the last 20 bytes of BLAKE3(fresh public key)
fn fabricate_wallet_address() -> WnsResult<String> {
    let identity = Identity::generate()?;
    let hash = blake3::hash(identity.public_key().as_bytes());
    let bytes = hash.as_bytes();
    Ok(format!(
        "0x{}",
        hex::encode(&bytes[bytes.len() - WALLET_ADDRESS_LEN..])
    ))
}

/// Registry with every built-in service
pub fn default_registry() -> crate::registry::ServiceRegistry {
    crate::registry::ServiceRegistry::new().with(RESOLVE_WALLET, ResolveWallet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::STATUS_OK;

    #[test]
    fn test_resolve_wallet_shape() {
        let request = Request::new("1234", "ab", RESOLVE_WALLET, "");
        let response = ResolveWallet.handle(&request).unwrap();

        assert_eq!(response.request_id, "1234");
        assert_eq!(response.status_code, STATUS_OK);
        assert_eq!(response.message, "OK");

        let hex_part = response.output.strip_prefix("0x").expect("0x prefix");
        assert_eq!(hex_part.len(), 40);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_registry_has_resolve_wallet() {
        let registry = default_registry();
        assert!(registry.contains(RESOLVE_WALLET));
        assert_eq!(registry.len(), 1);
    }
}
