//! Utility functions for unit tests.

use http::{request::Parts, Request, Response};

/// A 64-byte shared key for HMAC-SHA256 tests.
pub(crate) const TEST_HMAC_KEY: [u8; 64] = [1u8; 64];

/// A bare GET request for the given URI.
pub(crate) fn get_request(uri: &str) -> Parts {
    Request::get(uri).body(()).unwrap().into_parts().0
}

/// A POST request with a spread of header shapes: untrimmed values, a repeated list header,
/// a dictionary-valued header, and one that is not a structured field at all.
pub(crate) fn post_request() -> Parts {
    let (mut parts, _) = Request::post("https://example.com/data?x=1")
        .header("Date", "Tue, 20 Apr 2021 02:07:55 GMT")
        .header("Content-Type", "  application/json  ")
        .header("X-Dict", "a=1,   b=2;x;y=:NDQ=:")
        .header("X-Unstructured", "=broken=")
        .body(())
        .unwrap()
        .into_parts();
    parts.headers.append("x-list", "one".parse().unwrap());
    parts.headers.append("x-list", " two\t".parse().unwrap());
    parts.headers.append("x-list", "three".parse().unwrap());
    parts
}

/// Bare response parts with the given status code.
pub(crate) fn response_parts(status: u16) -> http::response::Parts {
    Response::builder().status(status).body(()).unwrap().into_parts().0
}
