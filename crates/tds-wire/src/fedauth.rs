//! Federated authentication wire pieces.
//!
//! Two artifacts: the FEDAUTH feature-extension block inside LOGIN7 that
//! announces the workflow, and the type-0x08 token message the client sends
//! after the server's FEDAUTHINFO response.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::utf16_len;

/// Feature id of the FEDAUTH extension block.
pub const FEATURE_ID_FEDAUTH: u8 = 0x02;

/// FEDAUTH library: Security Token (bearer token supplied out of band).
const LIBRARY_SECURITY_TOKEN: u8 = 0x01;

/// Builder for the LOGIN7 FEDAUTH feature-extension payload.
#[derive(Debug, Clone, Copy)]
pub struct FedAuthExt {
    /// Echo back the server's FEDAUTHREQUIRED answer from PRELOGIN.
    pub echo: bool,
}

impl FedAuthExt {
    /// Feature-extension payload announcing the security-token workflow.
    ///
    /// Layout: one options byte (library in bits 1-7, echo in bit 0). The
    /// token itself is NOT carried here; it follows in the 0x08 message
    /// after FEDAUTHINFO.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let options = (LIBRARY_SECURITY_TOKEN << 1) | u8::from(self.echo);
        Bytes::copy_from_slice(&[options])
    }
}

/// Encode the FEDAUTH token message payload (packet type 0x08).
///
/// Layout: u32 total data length, u32 token byte length, token as
/// UTF-16LE, then the optional 32-byte nonce.
#[must_use]
pub fn encode_fedauth_token(token: &str, nonce: Option<&[u8; 32]>) -> Bytes {
    let token_len = utf16_len(token);
    let nonce_len = nonce.map_or(0, |n| n.len());
    let data_len = 4 + token_len + nonce_len;

    let mut buf = BytesMut::with_capacity(4 + data_len);
    buf.put_u32_le(data_len as u32);
    buf.put_u32_le(token_len as u32);
    for unit in token.encode_utf16() {
        buf.put_u16_le(unit);
    }
    if let Some(nonce) = nonce {
        buf.put_slice(nonce);
    }
    buf.freeze()
}
