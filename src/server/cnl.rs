//! Click'n'Load v2 browser-helper endpoint.
//!
//! Browser extensions post two form fields to `/flash/addcrypted2`: `jk`,
//! a JavaScript snippet defining a function `f()` that returns a hex
//! AES-128 key, and `crypted`, the base64 of an AES-CBC ciphertext whose
//! IV equals the key. Decrypting yields a whitespace-separated URL list.
//! The key script must be evaluated faithfully, so a real JS engine runs
//! it; the 32-character hex output is the only invariant.

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use axum::Form;
use axum::extract::State;
use axum::http::StatusCode;
use base64::Engine;
use boa_engine::{Context, Source};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::ServerState;

/// Permissive Flash cross-domain policy served at `/crossdomain.xml`.
pub(crate) const CROSS_DOMAIN: &str = r#"<?xml version="1.0"?>
<!DOCTYPE cross-domain-policy SYSTEM "http://www.macromedia.com/xml/dtds/cross-domain-policy.dtd">
<cross-domain-policy>
<allow-access-from domain="*" />
</cross-domain-policy>
"#;

/// Form body of a Click'n'Load v2 request. Extra fields (`pw`, `source`,
/// `package`...) are accepted and ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct CnlForm {
    jk: String,
    crypted: String,
}

/// `POST /flash/addcrypted2`
pub(crate) async fn add_crypted2(
    State(state): State<ServerState>,
    Form(form): Form<CnlForm>,
) -> Result<&'static str, (StatusCode, &'static str)> {
    let key = eval_key_script(&form.jk)
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;
    let plain = decrypt_links(&key, &form.crypted)
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;

    let urls: Vec<Url> = plain
        .split_whitespace()
        .filter_map(|link| match Url::parse(link) {
            Ok(url) => Some(url),
            Err(parse_error) => {
                warn!(link, error = %parse_error, "discarding undecryptable link");
                None
            }
        })
        .collect();
    debug!(count = urls.len(), "Click'n'Load container received");
    state.client.add_urls(urls);
    Ok("success\r\n")
}

/// Runs the `jk` snippet and `f()` in a fresh JS context, returning the
/// decoded 16-byte AES key.
fn eval_key_script(jk: &str) -> Result<Vec<u8>, &'static str> {
    let mut context = Context::default();
    context
        .eval(Source::from_bytes(jk.as_bytes()))
        .map_err(|_| "invalid JavaScript in form field 'jk'")?;
    let value = context
        .eval(Source::from_bytes(b"f()".as_slice()))
        .map_err(|_| "invalid JavaScript in form field 'jk'")?;
    let hex_key = value
        .to_string(&mut context)
        .map_err(|_| "key script did not return a string")?
        .to_std_string_escaped();
    let key = hex::decode(hex_key.trim())
        .map_err(|_| "key script did not return valid hex")?;
    if key.len() != 16 {
        return Err("key script did not return an AES-128 key");
    }
    Ok(key)
}

/// Base64-decodes `crypted` and performs the AES-128-CBC decryption with
/// IV = key, returning the contained text.
fn decrypt_links(key: &[u8], crypted: &str) -> Result<String, &'static str> {
    let mut data = base64::engine::general_purpose::STANDARD
        .decode(crypted.trim())
        .map_err(|_| "invalid base64 in form field 'crypted'")?;
    if data.is_empty() || data.len() % 16 != 0 {
        return Err("ciphertext length is not a multiple of the AES block size");
    }
    let decryptor = cbc::Decryptor::<Aes128>::new_from_slices(key, key)
        .map_err(|_| "invalid AES key")?;
    let plain = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut data)
        .map_err(|_| "AES decryption failed")?;
    // The protocol pads with NUL/whitespace rather than PKCS#7.
    Ok(String::from_utf8_lossy(plain)
        .trim_matches('\0')
        .to_string())
}
