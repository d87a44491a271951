//! Fuzz testing for request input handling.
//!
//! Checks that input validation and HTML escaping never panic, and that
//! escaped output never contains a raw markup character.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `validate_author`: Search query validation
//! - `validate_credentials`: Login parameter validation
//! - `escape_html`: Echo page escaping

#![no_main]

use book_search::utils::escape_html;
use book_search::validation::{validate_author, validate_credentials};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(author) = validate_author(Some(s)) {
        assert!(!author.is_empty());
    }

    // Split the input to exercise both halves of the credential pair
    let (user, pass) = s.split_once('\0').unwrap_or((s, ""));
    let _ = validate_credentials(Some(user), Some(pass));

    let escaped = escape_html(s);
    assert!(!escaped.contains(['<', '>', '"', '\'']));
});
