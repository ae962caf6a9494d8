//! HTTP Message Signatures: signing and verification of HTTP requests and responses.
//!
//! This crate implements the HTTP Message Signatures mechanism: a client or server selects a
//! list of *covered components* (derived values such as the method or authority, plus named
//! headers), canonicalizes them into a byte-exact *signature base*, signs that base, and
//! transmits the result in the `Signature-Input` and `Signature` headers. The peer rebuilds
//! the identical base from the message it received and verifies the signature, enforcing a
//! policy on the signature parameters (key id, algorithm, creation time, expiry) as it does
//! so.
//!
//! The crate deliberately ends at header values: it consumes [`http`] request and response
//! parts and produces [`http::HeaderValue`]s. Issuing requests, intercepting them in
//! middleware, key distribution, and replay caches are the caller's business.
//!
//! Supported algorithms: `hmac-sha256`, `rsa-v1_5-sha256`, `rsa-pss-sha512`, and
//! `ecdsa-p256-sha256` (with signatures as the raw concatenation of `r` and `s`, not
//! ASN.1/DER).
//!
//! # Workflow
//!
//! Construct a [Signer] or [Verifier] once per key and reuse it across messages; both are
//! immutable and freely shareable across threads.
//!
//! ```rust
//! use http::Request;
//! use httpsign::{attach_signature, Fields, SignConfig, Signer, VerifyConfig, Verifier};
//!
//! # fn main() -> Result<(), httpsign::SignatureError> {
//! let key = [1u8; 64];
//! let fields = Fields::from_names(&["@method", "@authority"])?;
//!
//! // Sign an outgoing request.
//! let signer = Signer::new_hmac_sha256("test-shared-secret", &key, SignConfig::default(), fields.clone())?;
//! let (mut parts, _body) = Request::get("https://example.com/data").body(()).unwrap().into_parts();
//! let (signature_input, signature) = signer.sign_request("sig1", &parts)?;
//! attach_signature(&mut parts.headers, signature_input, signature)?;
//!
//! // Verify it on the receiving side, under the default policy.
//! let verifier = Verifier::new_hmac_sha256("test-shared-secret", &key, VerifyConfig::default(), fields)?;
//! verifier.verify_request(Some("sig1"), &parts)?;
//! # Ok(())
//! # }
//! ```
//!
//! Responses are signed and verified with [Signer::sign_response] and
//! [Verifier::verify_response], which take the request being answered so that
//! `req`-parameterized components and `@request-response` resolve against it.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::missing_crate_level_docs)]

mod chronoutil;
mod crypto;
mod error;
mod signer;
mod signing_key;
mod verifier;

pub mod canonical;
pub mod header;
pub mod sfv;

pub use {error::*, signer::*, signing_key::Algorithm, verifier::*};

#[doc(inline)]
pub use canonical::{ComponentIdentifier, Fields, Message};
#[doc(inline)]
pub use header::{attach_signature, SignatureHeader, SignatureInput, SIGNATURE, SIGNATURE_INPUT};

#[cfg(test)]
mod unittest;
